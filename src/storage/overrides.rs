//! 命名覆盖表：机器人基础名 → NamingOverride（JSON）

use std::collections::BTreeMap;
use std::path::Path;

use crate::provisioning::NamingOverride;
use crate::storage::{load_json, save_json};

#[derive(Debug, Clone, Default)]
pub struct OverrideTable {
    entries: BTreeMap<String, NamingOverride>,
}

impl OverrideTable {
    pub fn load(path: &Path) -> Self {
        Self {
            entries: load_json(path),
        }
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        save_json(path, &self.entries)
    }

    pub fn get(&self, base: &str) -> Option<&NamingOverride> {
        self.entries.get(base)
    }

    pub fn insert(&mut self, base: impl Into<String>, ov: NamingOverride) {
        self.entries.insert(base.into(), ov);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bot_overrides.json");
        let mut table = OverrideTable::default();
        table.insert(
            "Cat",
            NamingOverride {
                name_suffix: Some(" 🐱".into()),
                ..NamingOverride::default()
            },
        );
        table.save(&path).unwrap();

        let loaded = OverrideTable::load(&path);
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            loaded.get("Cat").and_then(|o| o.name_suffix.as_deref()),
            Some(" 🐱")
        );
        assert!(loaded.get("Dog").is_none());
    }
}
