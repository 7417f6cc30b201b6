use std::io::Write;

use anyhow::Result;
use log::{error, info};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::cli::RunModeExtend;
use crate::cli::process::ingest;
use crate::cli::search::search_and_save;
use crate::session::SearchSession;
use crate::shutdown::Shutdown;
use crate::utils::clean_input_path;

/// 交互式连续搜索，模型与数据库连接在多次搜索间复用
pub struct InteractiveCommand {
    pub skip_ingest: bool,
}

impl RunModeExtend for InteractiveCommand {
    async fn run(&self, session: &SearchSession, shutdown: &Shutdown) -> Result<()> {
        if !self.skip_ingest {
            ingest(session, shutdown).await?;
        }
        if shutdown.is_triggered() {
            return Ok(());
        }

        println!("输入图片路径开始搜索，输入 quit 退出");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            print!("> ");
            std::io::stdout().flush()?;

            let line = tokio::select! {
                _ = shutdown.wait() => break,
                line = lines.next_line() => line?,
            };
            // EOF
            let Some(line) = line else {
                println!();
                break;
            };
            let input = line.trim();
            if matches!(input, "quit" | "exit" | "q") {
                break;
            }
            let Some(path) = clean_input_path(input) else {
                continue;
            };
            if !path.is_file() {
                println!("文件不存在: {}", path.display());
                continue;
            }
            if let Err(e) = search_and_save(session, &path).await {
                error!("搜索失败: {:#}", e);
            }
        }

        info!("退出交互模式");
        Ok(())
    }
}
