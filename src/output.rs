use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::Local;
use log::{info, warn};
use serde_json::json;

use crate::config::Config;
use crate::searcher::{RankedResult, Ranking};

/// 写入结果文件时相似度保留的小数位数
const SIMILARITY_PRECISION: i32 = 6;

/// 将搜索结果保存到以时间命名的目录中
///
/// 每次搜索生成 `<时间>/<名称>.json`、`<时间>/<名称>.jpg` 和 `<时间>/<名称>.jsonl`
pub struct ResultWriter {
    base: PathBuf,
}

impl ResultWriter {
    pub fn new<P: Into<PathBuf>>(base: P) -> Self {
        Self { base: base.into() }
    }

    /// 保存一次搜索的结果，返回新建的目录
    pub fn write(&self, name: &str, ranking: &Ranking, config: &Config) -> Result<PathBuf> {
        let dir = self.create_output_dir()?;

        let snapshot = dir.join(format!("{}.json", name));
        fs::write(&snapshot, serde_json::to_vec_pretty(&config.snapshot())?)
            .with_context(|| format!("无法写入文件: {}", snapshot.display()))?;

        let top = ranking.top();
        let image = dir.join(format!("{}.jpg", name));
        match fs::copy(&top.file_path, &image) {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!("最相似的图片已不存在，跳过复制: {}", top.file_path);
            }
            Err(e) => {
                return Err(e).with_context(|| format!("无法复制图片: {}", top.file_path));
            }
        }

        let results = dir.join(format!("{}.jsonl", name));
        write_results(&results, ranking.results())
            .with_context(|| format!("无法写入文件: {}", results.display()))?;

        info!("搜索结果已保存到: {}", dir.display());
        Ok(dir)
    }

    /// 创建以当前时间命名的目录，同名目录已存在时依次添加 `-1`、`-2` 后缀
    fn create_output_dir(&self) -> Result<PathBuf> {
        fs::create_dir_all(&self.base)
            .with_context(|| format!("无法创建目录: {}", self.base.display()))?;
        let stamp = Local::now().format("%Y%m%d-%H%M%S").to_string();
        claim_dir(&self.base, &stamp)
    }
}

fn claim_dir(base: &Path, stamp: &str) -> Result<PathBuf> {
    let mut path = base.join(stamp);
    for i in 1.. {
        match fs::create_dir(&path) {
            Ok(()) => break,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                path = base.join(format!("{}-{}", stamp, i));
            }
            Err(e) => return Err(e).with_context(|| format!("无法创建目录: {}", path.display())),
        }
    }
    Ok(path)
}

fn round(value: f32) -> f64 {
    let scale = 10f64.powi(SIMILARITY_PRECISION);
    (value as f64 * scale).round() / scale
}

fn write_results(path: &Path, results: &[RankedResult]) -> io::Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for result in results {
        let line = json!({
            "rank": result.rank,
            "similarity": round(result.similarity),
            "file_name": result.file_name,
            "file_path": result.file_path,
        });
        serde_json::to_writer(&mut writer, &line)?;
        writer.write_all(b"\n")?;
    }
    writer.flush()
}

/// 读取 `.jsonl` 结果文件
pub fn read_results<P: AsRef<Path>>(path: P) -> Result<Vec<RankedResult>> {
    let path = path.as_ref();
    let file = File::open(path).with_context(|| format!("无法打开文件: {}", path.display()))?;
    let mut results = vec![];
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let result = serde_json::from_str(&line)
            .with_context(|| format!("{} 第 {} 行格式错误", path.display(), i + 1))?;
        results.push(result);
    }
    Ok(results)
}
