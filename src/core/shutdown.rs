//! 优雅关闭
//!
//! HTTP 服务收到 Ctrl+C / SIGTERM 后停止接收新请求，进行中的分析跑完后再退出；
//! 子进程由执行器在超时或 drop 时清理。

use tokio_util::sync::CancellationToken;

/// 触发关闭的信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Ctrl+C / SIGINT
    Interrupt,
    /// SIGTERM（容器编排常用）
    Terminate,
}

/// 等待第一个关闭信号
#[cfg(unix)]
pub async fn wait_for_signal() -> ShutdownReason {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => tokio::select! {
            res = tokio::signal::ctrl_c() => {
                if let Err(e) = res {
                    tracing::warn!(error = %e, "ctrl_c listener failed");
                }
                ShutdownReason::Interrupt
            }
            _ = term.recv() => ShutdownReason::Terminate,
        },
        Err(e) => {
            tracing::warn!(error = %e, "SIGTERM handler unavailable, listening for Ctrl+C only");
            wait_for_ctrl_c().await
        }
    }
}

#[cfg(not(unix))]
pub async fn wait_for_signal() -> ShutdownReason {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> ShutdownReason {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl_c listener failed");
        std::future::pending::<()>().await;
    }
    ShutdownReason::Interrupt
}

/// 安装信号处理器，返回在收到信号时取消的 token（传给 axum graceful shutdown）
pub fn install_signal_handlers() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        let reason = wait_for_signal().await;
        tracing::info!(?reason, "shutdown signal received, draining in-flight requests");
        trigger.cancel();
    });
    token
}
