//! 错误恢复引擎
//!
//! 根据 FactoryError 类型返回 RecoveryAction，供编排器在任务边界决定冻结、拉黑、回队还是终止。

use crate::core::{FactoryError, RecoveryAction, TransportError};

/// 将错误映射为可执行动作；冻结阈值以上的等待会转为账号冻结
#[derive(Debug, Clone)]
pub struct RecoveryEngine {
    freeze_threshold_secs: u64,
}

impl RecoveryEngine {
    pub fn new(freeze_threshold_secs: u64) -> Self {
        Self {
            freeze_threshold_secs,
        }
    }

    pub fn handle(&self, err: &FactoryError) -> RecoveryAction {
        match err {
            FactoryError::RateLimited(secs) => RecoveryAction::FreezeIdentity(*secs),
            FactoryError::Transport(TransportError::FloodWait { seconds })
                if *seconds > self.freeze_threshold_secs =>
            {
                RecoveryAction::FreezeIdentity(*seconds)
            }
            FactoryError::QuotaExceeded => RecoveryAction::BlockIdentity,
            FactoryError::Cancelled | FactoryError::Config(_) | FactoryError::Busy => {
                RecoveryAction::Abort
            }
            _ => RecoveryAction::Requeue,
        }
    }
}

impl Default for RecoveryEngine {
    fn default() -> Self {
        Self::new(350)
    }
}
