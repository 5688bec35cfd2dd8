//! 账号状态表：账号 → {state, reason}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::storage::{load_json, save_json};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountState {
    Ok,
    Error,
    /// 机器人数量已达上限，本次运行不再使用
    #[serde(alias = "too_many")]
    Blocked,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountStatus {
    pub state: AccountState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl AccountStatus {
    pub fn new(state: AccountState, reason: Option<&str>) -> Self {
        Self {
            state,
            reason: reason.map(str::to_string),
        }
    }
}

#[derive(Debug)]
pub struct StatusTable {
    path: PathBuf,
    entries: BTreeMap<String, AccountStatus>,
}

impl StatusTable {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = load_json(&path);
        Self { path, entries }
    }

    pub fn get(&self, identity: &str) -> Option<&AccountStatus> {
        self.entries.get(identity)
    }

    pub fn state(&self, identity: &str) -> Option<AccountState> {
        self.get(identity).map(|s| s.state)
    }

    /// 更新并立即写盘
    pub fn set(&mut self, identity: &str, status: AccountStatus) -> anyhow::Result<()> {
        self.entries.insert(identity.to_string(), status);
        save_json(&self.path, &self.entries)
    }
}
