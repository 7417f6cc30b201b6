use std::path::{Path, PathBuf};

use anyhow::{Result, bail};
use log::info;
use tokio::task::block_in_place;

use crate::cli::RunModeExtend;
use crate::cli::process::ingest;
use crate::output::ResultWriter;
use crate::searcher::Ranking;
use crate::session::SearchSession;
use crate::shutdown::Shutdown;
use crate::utils::file_stem;

/// 终端中显示的结果数量
const DISPLAY_COUNT: usize = 5;

/// 搜索一张图片后退出
pub struct SearchCommand {
    /// 被搜索的图片路径
    pub image: PathBuf,
    /// 不导入参考图片
    pub skip_ingest: bool,
}

impl RunModeExtend for SearchCommand {
    async fn run(&self, session: &SearchSession, shutdown: &Shutdown) -> Result<()> {
        if !self.image.is_file() {
            bail!("图片不存在: {}", self.image.display());
        }
        if !self.skip_ingest {
            ingest(session, shutdown).await?;
        }
        if shutdown.is_triggered() {
            info!("已中断，跳过搜索");
            return Ok(());
        }
        search_and_save(session, &self.image).await?;
        Ok(())
    }
}

/// 搜索图片，在终端显示结果并保存到输出目录
pub async fn search_and_save(session: &SearchSession, image: &Path) -> Result<PathBuf> {
    info!("搜索图片: {}", image.display());
    let ranking = session.search(image).await?;
    print_result(&ranking);

    let config = session.config();
    let writer = ResultWriter::new(&config.output_directory);
    block_in_place(|| writer.write(&file_stem(image), &ranking, config))
}

fn print_result(ranking: &Ranking) {
    println!("{:>4}  {:>10}  {}", "rank", "similarity", "file_name");
    for result in ranking.results().iter().take(DISPLAY_COUNT) {
        println!("{:>4}  {:>10.6}  {}", result.rank, result.similarity, result.file_name);
    }
    if ranking.len() > DISPLAY_COUNT {
        println!("……共 {} 条结果", ranking.len());
    }
}
