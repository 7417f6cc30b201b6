use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use indicatif::ProgressBar;
use log::{info, warn};
use regex::Regex;
use tokio::task::block_in_place;

use crate::config::Config;
use crate::db::{EmbeddingStore, InsertOutcome, NewImageRecord};
use crate::embedder::Embedder;
use crate::preprocess::{Preprocessor, scan_images, suffix_regex};
use crate::shutdown::Shutdown;
use crate::utils::pb_style;

/// 一次导入的统计结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// 实际处理过的文件数，等于下面三项之和
    pub processed: usize,
    pub inserted: usize,
    pub skipped_duplicate: usize,
    pub failed: usize,
    /// 是否因收到信号而提前结束
    pub interrupted: bool,
}

enum FileOutcome {
    Inserted(i64),
    Duplicate,
}

/// 将参考图片目录导入向量数据库
pub struct IngestionPipeline<'a> {
    store: &'a EmbeddingStore,
    embedder: &'a dyn Embedder,
    preprocessor: Preprocessor,
    source_directory: PathBuf,
    processed_directory: PathBuf,
    re_suf: Regex,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(
        config: &Config,
        store: &'a EmbeddingStore,
        embedder: &'a dyn Embedder,
    ) -> Result<Self> {
        Ok(Self {
            store,
            embedder,
            preprocessor: Preprocessor::new(config.resize_width, config.resize_height),
            source_directory: config.source_directory.clone(),
            processed_directory: config.processed_directory.clone(),
            re_suf: suffix_regex(&config.extensions)?,
        })
    }

    /// 依次处理目录中的所有图片
    ///
    /// 单个文件失败只会计数，不会中断整个导入；收到信号后不再处理新的文件
    pub async fn run(&self, shutdown: &Shutdown) -> Result<IngestStats> {
        let entries = scan_images(&self.source_directory, &self.re_suf)?;
        fs::create_dir_all(&self.processed_directory).with_context(|| {
            format!("无法创建目录: {}", self.processed_directory.display())
        })?;

        let mut stats = IngestStats::default();
        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());

        for entry in &entries {
            if shutdown.is_triggered() {
                stats.interrupted = true;
                pb.abandon_with_message("导入已中断");
                break;
            }

            stats.processed += 1;
            match self.ingest_file(entry).await {
                Ok(FileOutcome::Inserted(id)) => {
                    stats.inserted += 1;
                    pb.set_message(format!("添加图片 #{}: {}", id, entry.display()));
                }
                Ok(FileOutcome::Duplicate) => {
                    stats.skipped_duplicate += 1;
                    pb.set_message(format!("跳过图片: {}", entry.display()));
                }
                Err(e) => {
                    stats.failed += 1;
                    pb.println(format!("处理失败 {}: {:#}", entry.display(), e));
                    warn!("处理失败 {}: {:#}", entry.display(), e);
                }
            }
            pb.inc(1);
        }

        if !stats.interrupted {
            pb.finish_with_message("图片导入完成");
        }
        info!(
            "导入结束: 处理 {}，新增 {}，重复 {}，失败 {}",
            stats.processed, stats.inserted, stats.skipped_duplicate, stats.failed
        );
        Ok(stats)
    }

    async fn ingest_file(&self, path: &Path) -> Result<FileOutcome> {
        let image = block_in_place(|| self.preprocessor.load(path))?;
        let hash = image.hash.to_hex();

        // 已知内容不再计算向量
        if self.store.contains_hash(&hash).await? {
            return Ok(FileOutcome::Duplicate);
        }

        let embedding = block_in_place(|| self.embedder.embed(&image.image))?;
        if embedding.len() != self.store.dimension() {
            bail!("模型输出维度为 {}，期望 {}", embedding.len(), self.store.dimension());
        }

        let saved = block_in_place(|| self.preprocessor.save(&image, &self.processed_directory))?;
        let record = NewImageRecord {
            file_path: saved.to_string_lossy().into_owned(),
            file_name: image.file_name(),
            file_hash: hash,
            embedding,
        };
        match self.store.insert(&record).await {
            Ok(InsertOutcome::Inserted(id)) => Ok(FileOutcome::Inserted(id)),
            Ok(InsertOutcome::DuplicateHash) => Ok(FileOutcome::Duplicate),
            Err(e) => {
                // 未写入数据库的图片不保留
                if let Err(err) = fs::remove_file(&saved) {
                    warn!("无法删除文件 {}: {}", saved.display(), err);
                }
                Err(e).context("写入数据库失败")
            }
        }
    }
}
