use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use log::warn;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

/// 进程级的退出标志
///
/// 信号处理只设置标志，主流程在安全点检查标志后自行退出
#[derive(Debug, Clone, Default)]
pub struct Shutdown {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置退出标志，返回是否为第一次设置
    pub fn trigger(&self) -> bool {
        let first = !self.inner.triggered.swap(true, Ordering::SeqCst);
        if first {
            self.inner.notify.notify_waiters();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.inner.triggered.load(Ordering::SeqCst)
    }

    /// 等待退出标志被设置
    pub async fn wait(&self) {
        let notified = self.inner.notify.notified();
        tokio::pin!(notified);
        // 先注册再检查标志，避免错过通知
        notified.as_mut().enable();
        if self.is_triggered() {
            return;
        }
        notified.await;
    }
}

/// 监听中断与终止信号，收到信号后设置退出标志
///
/// 信号处理在函数返回前就已注册
pub fn listen_signals(shutdown: Shutdown) -> Result<JoinHandle<()>> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;
        Ok(tokio::spawn(async move {
            loop {
                let name = tokio::select! {
                    _ = sigint.recv() => "SIGINT",
                    _ = sigterm.recv() => "SIGTERM",
                };
                on_signal(&shutdown, name);
            }
        }))
    }

    #[cfg(not(unix))]
    {
        Ok(tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                on_signal(&shutdown, "Ctrl-C");
            }
        }))
    }
}

fn on_signal(shutdown: &Shutdown, name: &str) {
    if shutdown.trigger() {
        warn!("收到 {}，正在停止……", name);
    } else {
        warn!("收到 {}，程序已在退出中", name);
    }
}
