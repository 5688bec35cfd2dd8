//! 持久化表：冻结表、账号状态表、Token 账本、重置账本、命名覆盖表
//!
//! 单写者：所有修改都来自同一条顺序控制流，整文件覆盖或追加写即可，无需事务。

pub mod freeze;
pub mod ledger;
pub mod overrides;
pub mod status;

use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use freeze::FreezeTable;
pub use ledger::{LedgerStats, ProvisionedRecord, RevokedLedger, RevokedRecord, TokenLedger};
pub use overrides::OverrideTable;
pub use status::{AccountState, AccountStatus, StatusTable};

/// 读取 JSON 表；文件不存在或损坏时返回默认值（损坏时告警）
pub(crate) fn load_json<T: DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match std::fs::read_to_string(path)
        .map_err(anyhow::Error::from)
        .and_then(|data| serde_json::from_str(&data).map_err(anyhow::Error::from))
    {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(path = %path.display(), "unreadable table, starting empty: {}", e);
            T::default()
        }
    }
}

/// 整文件覆盖写入 JSON；父目录不存在时自动创建
pub(crate) fn save_json<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}
