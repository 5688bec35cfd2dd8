//! 冻结表：账号 → 解冻时间（unix 秒）

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::storage::{load_json, save_json};

#[derive(Debug)]
pub struct FreezeTable {
    path: PathBuf,
    entries: BTreeMap<String, i64>,
}

impl FreezeTable {
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let entries = load_json(&path);
        Self { path, entries }
    }

    pub fn frozen_until(&self, identity: &str) -> Option<i64> {
        self.entries.get(identity).copied()
    }

    /// 记录冻结并立即写盘
    pub fn freeze(&mut self, identity: &str, until: i64) -> anyhow::Result<()> {
        self.entries.insert(identity.to_string(), until);
        save_json(&self.path, &self.entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_freeze_persists_across_loads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frozen.json");

        let mut table = FreezeTable::load(&path);
        assert_eq!(table.frozen_until("+1"), None);
        table.freeze("+1", 1_000).unwrap();

        let reloaded = FreezeTable::load(&path);
        assert_eq!(reloaded.frozen_until("+1"), Some(1_000));
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("frozen.json");
        std::fs::write(&path, "{not json").unwrap();
        let table = FreezeTable::load(&path);
        assert_eq!(table.frozen_until("+1"), None);
    }
}
