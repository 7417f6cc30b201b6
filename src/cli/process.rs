use anyhow::Result;
use log::{info, warn};

use crate::cli::RunModeExtend;
use crate::ingest::IngestStats;
use crate::session::SearchSession;
use crate::shutdown::Shutdown;

/// 只导入参考图片
pub struct ProcessCommand;

impl RunModeExtend for ProcessCommand {
    async fn run(&self, session: &SearchSession, shutdown: &Shutdown) -> Result<()> {
        ingest(session, shutdown).await?;
        Ok(())
    }
}

/// 导入参考图片并输出统计
pub(crate) async fn ingest(session: &SearchSession, shutdown: &Shutdown) -> Result<IngestStats> {
    let stats = session.ingest(shutdown).await?;
    if stats.interrupted {
        warn!("导入被中断，已处理 {} 张图片", stats.processed);
    }
    if stats.failed > 0 {
        warn!("{} 张图片处理失败", stats.failed);
    }
    info!("数据库中共有 {} 张图片", session.store().count().await?);
    Ok(stats)
}
