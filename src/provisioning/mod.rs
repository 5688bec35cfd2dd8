//! 机器人开通协议：命名、创建状态机、头像、删除 / 重置 Token

pub mod admin;
pub mod avatar;
pub mod create;
pub mod naming;

pub use admin::{delete_bot, parse_targets, revoke_token, AdminTarget};
pub use avatar::assign_avatar;
pub use create::{create_bot, CreatedBot};
pub use naming::{parse_task_names, sanitize_base, NamingOverride, NamingPolicy};

use crate::conversation::SessionDriver;
use crate::core::FactoryError;

/// 等待超时：被取消时归为 Cancelled，否则为该阶段无响应
pub(crate) fn no_reply(driver: &SessionDriver<'_>, stage: &'static str) -> FactoryError {
    if driver.is_cancelled() {
        FactoryError::Cancelled
    } else {
        FactoryError::NoResponse(stage)
    }
}

/// 合并多组短语，用于同时等待「期望回复」与「错误回复」
pub(crate) fn phrases(groups: &[&[&'static str]]) -> Vec<&'static str> {
    groups.iter().flat_map(|g| g.iter().copied()).collect()
}
