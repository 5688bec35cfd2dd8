//! 运行日志流：编排器 → 展示层的单向行流
//!
//! 每一行同时写入 tracing；接收端关闭或不存在时只记 tracing，不影响运行。

use std::fmt;

use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
    /// 短限流等待
    Rate,
    /// 账号冻结
    Freeze,
    /// 单个任务 / 目标成功
    Ok,
    /// 运行结束汇总
    Done,
}

impl LogLevel {
    pub fn tag(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Rate => "RATE",
            LogLevel::Freeze => "FREEZE",
            LogLevel::Ok => "OK",
            LogLevel::Done => "DONE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunLog {
    pub level: LogLevel,
    pub message: String,
}

impl fmt::Display for RunLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.level.tag(), self.message)
    }
}

/// 日志行发送端；Clone 后共享同一接收端
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<RunLog>>,
}

/// 创建日志流
pub fn log_channel() -> (EventSink, mpsc::UnboundedReceiver<RunLog>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSink { tx: Some(tx) }, rx)
}

impl EventSink {
    /// 只写 tracing 的发送端
    pub fn tracing_only() -> Self {
        Self::default()
    }

    pub fn emit(&self, level: LogLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            LogLevel::Error => tracing::error!(tag = level.tag(), "{}", message),
            LogLevel::Warn | LogLevel::Rate | LogLevel::Freeze => {
                tracing::warn!(tag = level.tag(), "{}", message)
            }
            LogLevel::Info | LogLevel::Ok | LogLevel::Done => {
                tracing::info!(tag = level.tag(), "{}", message)
            }
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(RunLog { level, message });
        }
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(LogLevel::Info, message);
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(LogLevel::Warn, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(LogLevel::Error, message);
    }

    pub fn rate(&self, message: impl Into<String>) {
        self.emit(LogLevel::Rate, message);
    }

    pub fn freeze(&self, message: impl Into<String>) {
        self.emit(LogLevel::Freeze, message);
    }

    pub fn ok(&self, message: impl Into<String>) {
        self.emit(LogLevel::Ok, message);
    }

    pub fn done(&self, message: impl Into<String>) {
        self.emit(LogLevel::Done, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lines_arrive_in_order() {
        let (sink, mut rx) = log_channel();
        sink.info("start");
        sink.freeze("+1 frozen");
        drop(sink);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.to_string(), "[INFO] start");
        let second = rx.recv().await.unwrap();
        assert_eq!(second.level, LogLevel::Freeze);
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_closed_receiver_is_ignored() {
        let (sink, rx) = log_channel();
        drop(rx);
        sink.error("nobody listens");
        EventSink::tracing_only().done("fine");
    }
}
