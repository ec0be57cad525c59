//! 优雅关闭处理
//!
//! Ctrl+C / SIGTERM 时先 Stop 再 Quit，并通过 CancellationToken 通知控制台等外围任务退出。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::core::ControlHandle;

/// 关闭原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// 用户发起的退出 (Ctrl+C 或 /quit)
    UserInitiated,
    /// SIGTERM 信号
    Signal,
}

/// 关闭信号管理器
#[derive(Clone, Default)]
pub struct ShutdownManager {
    shutdown_token: CancellationToken,
}

impl ShutdownManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// 获取关闭 token（外围任务监听）
    pub fn token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    pub async fn wait_for_shutdown(&self) {
        self.shutdown_token.cancelled().await;
    }

    /// 停止会话、结束编排循环，然后取消 token
    pub async fn shutdown(&self, control: &ControlHandle, reason: ShutdownReason) {
        if self.is_shutdown() {
            return;
        }
        tracing::info!(?reason, "Shutting down");
        if let Err(e) = control.stop().await {
            tracing::debug!(error = %e, "Stop during shutdown");
        }
        if let Err(e) = control.quit().await {
            tracing::debug!(error = %e, "Quit during shutdown");
        }
        self.shutdown_token.cancel();
    }

    /// 安装系统信号处理器 (Ctrl+C, SIGTERM)
    pub fn install_signal_handlers(self: &Arc<Self>, control: ControlHandle) {
        let manager = Arc::clone(self);
        let ctrl_c_control = control.clone();
        tokio::spawn(async move {
            if let Ok(()) = tokio::signal::ctrl_c().await {
                tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
                manager
                    .shutdown(&ctrl_c_control, ShutdownReason::UserInitiated)
                    .await;
            }
        });

        #[cfg(unix)]
        {
            let manager = Arc::clone(self);
            tokio::spawn(async move {
                use tokio::signal::unix::{signal, SignalKind};
                if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                    sigterm.recv().await;
                    tracing::info!("Received SIGTERM, initiating graceful shutdown...");
                    manager.shutdown(&control, ShutdownReason::Signal).await;
                }
            });
        }
    }
}
