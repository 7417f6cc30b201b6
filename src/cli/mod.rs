mod interactive;
mod process;
mod search;

pub use interactive::*;
pub use process::*;
pub use search::*;

use crate::config::{Mode, Opts};
use crate::session::SearchSession;
use crate::shutdown::Shutdown;

pub trait RunModeExtend {
    fn run(
        &self,
        session: &SearchSession,
        shutdown: &Shutdown,
    ) -> impl std::future::Future<Output = anyhow::Result<()>>;
}

/// 按命令行参数选择运行模式
pub async fn run(opts: &Opts, session: &SearchSession, shutdown: &Shutdown) -> anyhow::Result<()> {
    match opts.mode() {
        Mode::ProcessOnly => ProcessCommand.run(session, shutdown).await,
        Mode::Search(image) => {
            SearchCommand { image, skip_ingest: opts.skip_ingest }.run(session, shutdown).await
        }
        Mode::Interactive => {
            InteractiveCommand { skip_ingest: opts.skip_ingest }.run(session, shutdown).await
        }
    }
}
