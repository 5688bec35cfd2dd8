//! 可观测性：tracing 初始化与运行日志流

pub mod events;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub use events::{log_channel, EventSink, LogLevel, RunLog};

/// 安装 tracing 订阅者；RUST_LOG 未设置时默认 info
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .try_init();
}
