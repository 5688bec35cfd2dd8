//! 运行报告：模式、结果与汇总
//!
//! 编排器在运行中累积 RunReport，结束时交给展示层；DONE 行即由 `summary()` 生成。

use serde::Serialize;
use uuid::Uuid;

use crate::storage::{ProvisionedRecord, RevokedRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Create,
    Delete,
    Revoke,
    Auth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Cancelled,
    /// 连续多轮零成功而放弃
    Stalled,
    /// 启动检查失败（无账号 / 无任务 / 无目标）
    Fatal,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub created: Vec<ProvisionedRecord>,
    pub revoked: Vec<RevokedRecord>,
    pub deleted: Vec<String>,
    pub failed_targets: Vec<String>,
    /// 中止时尚未完成的任务，保持原顺序
    pub remaining: Vec<String>,
    pub blocked_identities: Vec<String>,
    pub outcome: RunOutcome,
}

impl RunReport {
    pub fn new(mode: RunMode) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            mode,
            created: Vec::new(),
            revoked: Vec::new(),
            deleted: Vec::new(),
            failed_targets: Vec::new(),
            remaining: Vec::new(),
            blocked_identities: Vec::new(),
            outcome: RunOutcome::Completed,
        }
    }

    pub fn summary(&self) -> String {
        let mut parts = vec![format!("{:?} run {:?}", self.mode, self.outcome).to_lowercase()];
        match self.mode {
            RunMode::Create => parts.push(format!("created {}", self.created.len())),
            RunMode::Delete => parts.push(format!("deleted {}", self.deleted.len())),
            RunMode::Revoke => parts.push(format!("revoked {}", self.revoked.len())),
            RunMode::Auth => {}
        }
        if !self.failed_targets.is_empty() {
            parts.push(format!("failed: {}", self.failed_targets.join(", ")));
        }
        if !self.remaining.is_empty() {
            parts.push(format!("remaining: {}", self.remaining.join("/")));
        }
        if !self.blocked_identities.is_empty() {
            parts.push(format!("quota reached: {}", self.blocked_identities.join(", ")));
        }
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_lists_remaining_and_blocked() {
        let mut report = RunReport::new(RunMode::Create);
        report.outcome = RunOutcome::Stalled;
        report.remaining = vec!["cat".into(), "dog".into()];
        report.blocked_identities = vec!["+1".into()];
        assert_eq!(
            report.summary(),
            "create run stalled; created 0; remaining: cat/dog; quota reached: +1"
        );
    }

    #[test]
    fn test_report_serializes_snake_case() {
        let report = RunReport::new(RunMode::Revoke);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["mode"], "revoke");
        assert_eq!(json["outcome"], "completed");
    }
}
