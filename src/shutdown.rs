//! 优雅退出协调
//!
//! `ShutdownManager` 监听 SIGINT/SIGTERM（Windows 下为 Ctrl+C），
//! 触发后向所有 `ShutdownHandle` 广播退出原因。尾随任务、清理任务与
//! HTTP 服务都在各自的等待点上观察同一个管理器。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Notify, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// SIGINT / Ctrl+C
    Interrupt,
    /// SIGTERM
    Terminate,
    /// 程序内部主动触发（测试、致命错误等）
    Application,
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    #[error("信号设置失败: {0}")]
    SignalSetup(String),

    #[error("等待后台任务退出超时（{0:?}）")]
    Timeout(Duration),
}

#[derive(Debug)]
struct Shared {
    notify: Notify,
    reason_tx: broadcast::Sender<ShutdownReason>,
    reason: std::sync::Mutex<Option<ShutdownReason>>,
    triggered: AtomicBool,
}

/// 退出管理器，可廉价克隆
#[derive(Debug, Clone)]
pub struct ShutdownManager {
    shared: Arc<Shared>,
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ShutdownManager {
    pub fn new() -> Self {
        let (reason_tx, _) = broadcast::channel(4);
        Self {
            shared: Arc::new(Shared {
                notify: Notify::new(),
                reason_tx,
                reason: std::sync::Mutex::new(None),
                triggered: AtomicBool::new(false),
            }),
        }
    }

    /// 为后台任务创建一个退出句柄
    pub fn handle(&self) -> ShutdownHandle {
        ShutdownHandle::new(self)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.triggered.load(Ordering::SeqCst)
    }

    fn reason(&self) -> Option<ShutdownReason> {
        self.shared.reason.lock().ok().and_then(|g| *g)
    }

    /// 触发退出；只有第一次调用生效
    pub fn trigger_shutdown(&self, reason: ShutdownReason) {
        if self
            .shared
            .triggered
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("忽略重复的退出信号: {:?}", reason);
            return;
        }
        info!("触发优雅退出: {:?}", reason);
        if let Ok(mut g) = self.shared.reason.lock() {
            *g = Some(reason);
        }
        // 没有订阅者时发送会失败，属正常情况
        let _ = self.shared.reason_tx.send(reason);
        self.shared.notify.notify_waiters();
    }

    /// 等待退出信号；已经触发过则立即返回
    pub async fn wait_for_shutdown(&self) -> ShutdownReason {
        let notified = self.shared.notify.notified();
        if let Some(reason) = self.reason() {
            return reason;
        }
        notified.await;
        self.reason().unwrap_or(ShutdownReason::Application)
    }

    /// 安装系统信号监听
    pub async fn start_signal_handler(&self) -> Result<(), ShutdownError> {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};

            let mut sigint = signal(SignalKind::interrupt())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let mut sigterm = signal(SignalKind::terminate())
                .map_err(|e| ShutdownError::SignalSetup(e.to_string()))?;
            let manager = self.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigint.recv() => manager.trigger_shutdown(ShutdownReason::Interrupt),
                    _ = sigterm.recv() => manager.trigger_shutdown(ShutdownReason::Terminate),
                }
            });
        }

        #[cfg(windows)]
        {
            let manager = self.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => manager.trigger_shutdown(ShutdownReason::Interrupt),
                    Err(e) => warn!("监听 Ctrl+C 失败: {}", e),
                }
            });
        }

        info!("信号处理器已启动");
        Ok(())
    }
}

/// 后台任务持有的退出句柄
#[derive(Debug)]
pub struct ShutdownHandle {
    reason_rx: broadcast::Receiver<ShutdownReason>,
    manager: ShutdownManager,
}

impl ShutdownHandle {
    pub fn new(manager: &ShutdownManager) -> Self {
        Self {
            reason_rx: manager.shared.reason_tx.subscribe(),
            manager: manager.clone(),
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.manager.is_shutting_down()
    }

    /// 等待退出信号；句柄创建前已经触发的信号也能观察到
    pub async fn wait(&mut self) -> ShutdownReason {
        if let Some(reason) = self.manager.reason() {
            return reason;
        }
        match self.reason_rx.recv().await {
            Ok(reason) => reason,
            Err(_) => self
                .manager
                .reason()
                .unwrap_or(ShutdownReason::Application),
        }
    }
}

impl Clone for ShutdownHandle {
    fn clone(&self) -> Self {
        Self::new(&self.manager)
    }
}

/// 在给定时间内等待后台任务全部结束，超时后放弃等待
pub async fn join_with_timeout(
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    limit: Duration,
) -> Result<(), ShutdownError> {
    let wait_all = async {
        for (name, task) in tasks {
            match task.await {
                Ok(()) => debug!("后台任务 {} 已退出", name),
                Err(e) => warn!("后台任务 {} 异常结束: {}", name, e),
            }
        }
    };
    tokio::time::timeout(limit, wait_all)
        .await
        .map_err(|_| ShutdownError::Timeout(limit))
}
