use std::panic::AssertUnwindSafe;

use clap::Parser;
use futures::FutureExt;
use log::{error, warn};

use embsearch::error::SearchError;
use embsearch::shutdown::{Shutdown, listen_signals};
use embsearch::{Config, Opts, SearchSession, cli};

/// 搜索时数据库为空
const EXIT_EMPTY_STORE: i32 = 2;
const EXIT_PANIC: i32 = 101;

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = Opts::parse();
    let code = run(opts).await;
    // 不等待阻塞在标准输入上的读取任务
    std::process::exit(code);
}

async fn run(opts: Opts) -> i32 {
    let config = match Config::load(&opts.env) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return 1;
        }
    };

    let shutdown = Shutdown::new();
    if let Err(e) = listen_signals(shutdown.clone()) {
        error!("无法注册信号处理: {:#}", e);
        return 1;
    }

    let cleanup = config.cleanup_on_exit && !opts.no_cleanup;
    let session = match SearchSession::open(config, cleanup).await {
        Ok(session) => session,
        Err(e) => {
            error!("{:#}", e);
            return 1;
        }
    };

    let result = AssertUnwindSafe(cli::run(&opts, &session, &shutdown)).catch_unwind().await;
    session.close().await;

    match result {
        Ok(Ok(())) => {
            if shutdown.is_triggered() {
                warn!("程序被中断");
            }
            0
        }
        Ok(Err(e)) => match e.downcast_ref::<SearchError>() {
            Some(SearchError::EmptyStore) => {
                error!("{}", e);
                EXIT_EMPTY_STORE
            }
            _ => {
                error!("{:#}", e);
                1
            }
        },
        Err(_) => {
            error!("程序异常退出");
            EXIT_PANIC
        }
    }
}
