//! 系统信号 → 停止当前运行
//!
//! Ctrl+C / SIGTERM 只设置取消令牌；运行在下一个等待点退出并照常输出汇总。

use crate::core::RunController;

/// 安装信号处理器 (Ctrl+C, SIGTERM)；需在 tokio 运行时内调用
pub fn install_signal_handlers(controller: &RunController) {
    let ctl = controller.clone();
    tokio::spawn(async move {
        if let Ok(()) = tokio::signal::ctrl_c().await {
            tracing::info!("Received Ctrl+C, stopping current run...");
            ctl.stop();
        }
    });

    #[cfg(unix)]
    {
        let ctl = controller.clone();
        tokio::spawn(async move {
            use tokio::signal::unix::{signal, SignalKind};
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                tracing::info!("Received SIGTERM, stopping current run...");
                ctl.stop();
            }
        });
    }
}
