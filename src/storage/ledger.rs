//! Token 账本与重置账本（只追加）
//!
//! - tokens.txt：每行一个 Token（仅非空 Token）
//! - tokens.csv：`username,token,label,account,ts`，每个成功创建恰好一行
//! - revoked.csv：`username,account,token`

use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{Local, TimeZone};
use serde::Serialize;

use crate::provisioning::AdminTarget;

const TOKENS_HEADER: &[&str] = &["username", "token", "label", "account", "ts"];
const REVOKED_HEADER: &[&str] = &["username", "account", "token"];

/// 一次成功创建的账本行
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProvisionedRecord {
    pub handle: String,
    /// 补查后仍未拿到时为空串
    pub token: String,
    pub label: String,
    pub identity: String,
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevokedRecord {
    pub handle: String,
    pub identity: String,
    pub token: String,
}

fn append(path: &Path, header: &[&str], fields: &[&str]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let needs_header = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer.write_record(header)?;
    }
    writer.write_record(fields)?;
    writer.flush()
}

/// 读取 CSV 的数据行，按表头映射为 map；列数不齐的旧行照读
fn read_rows(path: &Path) -> anyhow::Result<Vec<BTreeMap<String, String>>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let header = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            header
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

#[derive(Debug, Clone)]
pub struct TokenLedger {
    txt_path: PathBuf,
    csv_path: PathBuf,
}

impl TokenLedger {
    pub fn new(txt_path: impl Into<PathBuf>, csv_path: impl Into<PathBuf>) -> Self {
        Self {
            txt_path: txt_path.into(),
            csv_path: csv_path.into(),
        }
    }

    /// 追加一条创建记录；只应在确认创建成功后调用一次
    pub fn append(&self, record: &ProvisionedRecord) -> std::io::Result<()> {
        if !record.token.is_empty() {
            if let Some(parent) = self.txt_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut f = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.txt_path)?;
            f.write_all(format!("{}\n", record.token).as_bytes())?;
        }
        let ts = record.timestamp.to_string();
        append(
            &self.csv_path,
            TOKENS_HEADER,
            &[
                record.handle.as_str(),
                record.token.as_str(),
                record.label.as_str(),
                record.identity.as_str(),
                ts.as_str(),
            ],
        )
    }

    pub fn load_rows(&self) -> anyhow::Result<Vec<ProvisionedRecord>> {
        Ok(read_rows(&self.csv_path)?
            .into_iter()
            .map(|row| {
                let get = |k: &str| row.get(k).map(|v| v.trim().to_string()).unwrap_or_default();
                // 旧文件可能使用 phone 列名
                let identity = Some(get("account"))
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| get("phone"));
                ProvisionedRecord {
                    handle: get("username"),
                    token: get("token"),
                    label: get("label"),
                    identity,
                    timestamp: get("ts").parse().unwrap_or(0),
                }
            })
            .collect())
    }

    /// 由账本生成删除 / 重置目标：每个被请求的用户名取其最近一条记录的账号
    pub fn targets_for(&self, handles: &[String]) -> anyhow::Result<Vec<AdminTarget>> {
        let rows = self.load_rows()?;
        let mut targets = Vec::new();
        for handle in handles {
            let wanted = handle.trim_start_matches('@');
            match rows.iter().rev().find(|r| r.handle.eq_ignore_ascii_case(wanted)) {
                Some(row) => targets.push(AdminTarget::new(&row.handle, &row.identity)),
                None => tracing::warn!(handle = %wanted, "handle not found in ledger"),
            }
        }
        Ok(targets)
    }

    pub fn stats(&self) -> anyhow::Result<LedgerStats> {
        Ok(LedgerStats::from_rows(&self.load_rows()?))
    }
}

/// 账本汇总：按本地日期分组、按标签计数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerStats {
    pub by_day: BTreeMap<String, Vec<String>>,
    pub by_label: BTreeMap<String, usize>,
    pub missing_tokens: usize,
}

impl LedgerStats {
    pub fn from_rows(rows: &[ProvisionedRecord]) -> Self {
        let mut stats = Self::default();
        for row in rows {
            let day = Local
                .timestamp_opt(row.timestamp, 0)
                .single()
                .map(|t| t.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "unknown".to_string());
            stats.by_day.entry(day).or_default().push(row.handle.clone());
            let label = if row.label.is_empty() { "None" } else { &row.label };
            *stats.by_label.entry(label.to_string()).or_default() += 1;
            if row.token.is_empty() {
                stats.missing_tokens += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone)]
pub struct RevokedLedger {
    path: PathBuf,
}

impl RevokedLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, record: &RevokedRecord) -> std::io::Result<()> {
        append(
            &self.path,
            REVOKED_HEADER,
            &[
                record.handle.as_str(),
                record.identity.as_str(),
                record.token.as_str(),
            ],
        )
    }

    pub fn load_rows(&self) -> anyhow::Result<Vec<RevokedRecord>> {
        Ok(read_rows(&self.path)?
            .into_iter()
            .map(|row| RevokedRecord {
                handle: row.get("username").cloned().unwrap_or_default(),
                identity: row.get("account").cloned().unwrap_or_default(),
                token: row.get("token").cloned().unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(handle: &str, token: &str, label: &str, ts: i64) -> ProvisionedRecord {
        ProvisionedRecord {
            handle: handle.to_string(),
            token: token.to_string(),
            label: label.to_string(),
            identity: "+1".to_string(),
            timestamp: ts,
        }
    }

    #[test]
    fn test_append_writes_header_once() {
        let dir = TempDir::new().unwrap();
        let ledger = TokenLedger::new(dir.path().join("tokens.txt"), dir.path().join("tokens.csv"));
        ledger.append(&record("cat_bot", "1234567:AAAAAAAAAAAAAAAAAAAAAAAA", "None", 1)).unwrap();
        ledger.append(&record("dog_bot", "", "team, a", 2)).unwrap();

        let csv = std::fs::read_to_string(dir.path().join("tokens.csv")).unwrap();
        assert_eq!(csv.matches("username,token").count(), 1);
        assert!(csv.contains("\"team, a\""));

        let txt = std::fs::read_to_string(dir.path().join("tokens.txt")).unwrap();
        assert_eq!(txt.lines().count(), 1);

        let rows = ledger.load_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].label, "team, a");
        assert_eq!(rows[1].token, "");
    }

    #[test]
    fn test_quoted_fields_survive_reload() {
        let dir = TempDir::new().unwrap();
        let ledger = TokenLedger::new(dir.path().join("t.txt"), dir.path().join("t.csv"));
        ledger.append(&record("cat_bot", "", "say \"hi\"\nteam", 1)).unwrap();
        ledger.append(&record("dog_bot", "", "plain", 2)).unwrap();

        let rows = ledger.load_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].label, "say \"hi\"\nteam");
        assert_eq!(rows[1].handle, "dog_bot");
    }

    #[test]
    fn test_legacy_phone_column_and_short_rows() {
        let dir = TempDir::new().unwrap();
        let csv_path = dir.path().join("t.csv");
        std::fs::write(&csv_path, "username,token,label,phone\ncat_bot,t1,None,+7\nold_bot,t2\n").unwrap();
        let ledger = TokenLedger::new(dir.path().join("t.txt"), csv_path.clone());

        let rows = ledger.load_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].identity, "+7");
        assert_eq!(rows[1].handle, "old_bot");
        assert_eq!(rows[1].identity, "");
    }

    #[test]
    fn test_targets_for_uses_latest_row() {
        let dir = TempDir::new().unwrap();
        let ledger = TokenLedger::new(dir.path().join("t.txt"), dir.path().join("t.csv"));
        ledger.append(&record("cat_bot", "", "None", 1)).unwrap();
        let mut moved = record("cat_bot", "", "None", 2);
        moved.identity = "+2".to_string();
        ledger.append(&moved).unwrap();

        let targets = ledger
            .targets_for(&["@cat_bot".to_string(), "ghost_bot".to_string()])
            .unwrap();
        assert_eq!(targets, vec![AdminTarget::new("cat_bot", "+2")]);
    }

    #[test]
    fn test_stats_group_by_label() {
        let rows = vec![
            record("a_bot", "t", "alpha", 0),
            record("b_bot", "", "alpha", 0),
            record("c_bot", "t", "", 0),
        ];
        let stats = LedgerStats::from_rows(&rows);
        assert_eq!(stats.by_label.get("alpha"), Some(&2));
        assert_eq!(stats.by_label.get("None"), Some(&1));
        assert_eq!(stats.missing_tokens, 1);
        assert_eq!(stats.by_day.values().map(Vec::len).sum::<usize>(), 3);
    }

    #[test]
    fn test_revoked_ledger_roundtrip() {
        let dir = TempDir::new().unwrap();
        let ledger = RevokedLedger::new(dir.path().join("revoked.csv"));
        ledger
            .append(&RevokedRecord {
                handle: "cat_bot".into(),
                identity: "+1".into(),
                token: "t1".into(),
            })
            .unwrap();
        let rows = ledger.load_rows().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].token, "t1");
    }
}
