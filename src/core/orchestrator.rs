//! 主控循环：开通 / 删除 / 重置 Token / 批量登录
//!
//! 单个后台 worker 顺序执行，所有表与账本只有这一个写入者。每个任务的错误都在任务边界被捕获，
//! 经 RecoveryEngine 映射为冻结、拉黑、回队或终止；只有启动检查失败与停滞判定会结束整个运行。

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::conversation::{AgentTransport, SessionDriver, TransportFactory};
use crate::core::scheduler::{Pick, RotationScheduler, SkipReason};
use crate::core::state::{RunMode, RunOutcome, RunReport};
use crate::core::supervisor::RunController;
use crate::core::{FactoryError, RecoveryAction, RecoveryEngine, TransportError};
use crate::identity::{ensure_authorized, Identity, PromptBridge};
use crate::observability::EventSink;
use crate::provisioning::{assign_avatar, create_bot, delete_bot, revoke_token, AdminTarget};
use crate::storage::{
    AccountState, AccountStatus, FreezeTable, OverrideTable, ProvisionedRecord, RevokedLedger,
    RevokedRecord, StatusTable, TokenLedger,
};

/// 冻结时长在限流秒数之上额外加的余量
const FREEZE_MARGIN_SECS: i64 = 2;

/// 一次运行的请求
#[derive(Debug, Clone)]
pub enum RunRequest {
    Create { names: Vec<String> },
    Delete { targets: Vec<AdminTarget> },
    Revoke { targets: Vec<AdminTarget> },
    /// 批量登录；only_errors 时跳过状态为 ok 的账号
    Auth { only_errors: bool },
}

pub struct Orchestrator {
    cfg: AppConfig,
    identities: Vec<Identity>,
    factory: Arc<dyn TransportFactory>,
    prompts: PromptBridge,
    events: EventSink,
    overrides: OverrideTable,
    controller: RunController,
    recovery: RecoveryEngine,
}

impl Orchestrator {
    pub fn new(
        cfg: AppConfig,
        identities: Vec<Identity>,
        factory: Arc<dyn TransportFactory>,
        prompts: PromptBridge,
        events: EventSink,
    ) -> Self {
        let recovery = RecoveryEngine::new(cfg.limits.freeze_threshold_secs);
        Self {
            cfg,
            identities,
            factory,
            prompts,
            events,
            overrides: OverrideTable::default(),
            controller: RunController::new(),
            recovery,
        }
    }

    pub fn with_overrides(mut self, overrides: OverrideTable) -> Self {
        self.overrides = overrides;
        self
    }

    pub fn controller(&self) -> RunController {
        self.controller.clone()
    }

    /// 在后台 worker 上启动；已有运行时返回 Busy
    pub fn launch(
        self: &Arc<Self>,
        request: RunRequest,
    ) -> Result<JoinHandle<RunReport>, FactoryError> {
        let guard = self.controller.try_acquire()?;
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move {
            let cancel = guard.token();
            let report = this.execute(request, &cancel).await;
            drop(guard);
            report
        }))
    }

    /// 在当前任务上运行到结束
    pub async fn run(&self, request: RunRequest) -> Result<RunReport, FactoryError> {
        let guard = self.controller.try_acquire()?;
        let cancel = guard.token();
        Ok(self.execute(request, &cancel).await)
    }

    async fn execute(&self, request: RunRequest, cancel: &CancellationToken) -> RunReport {
        match request {
            RunRequest::Create { names } => self.run_create(names, cancel).await,
            RunRequest::Delete { targets } => self.run_admin(RunMode::Delete, targets, cancel).await,
            RunRequest::Revoke { targets } => self.run_admin(RunMode::Revoke, targets, cancel).await,
            RunRequest::Auth { only_errors } => self.run_auth(only_errors, cancel).await,
        }
    }

    fn tokens_ledger(&self) -> TokenLedger {
        let p = &self.cfg.paths;
        TokenLedger::new(self.cfg.resolve(&p.tokens_txt), self.cfg.resolve(&p.tokens_csv))
    }

    fn finish(&self, report: RunReport) -> RunReport {
        self.events.done(report.summary());
        report
    }

    fn fatal(&self, mut report: RunReport, message: &str) -> RunReport {
        self.events.error(message);
        report.outcome = RunOutcome::Fatal;
        self.finish(report)
    }

    async fn pause(&self, duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn run_create(&self, names: Vec<String>, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::new(RunMode::Create);
        if self.identities.is_empty() {
            return self.fatal(report, "no identities loaded");
        }
        if names.is_empty() {
            return self.fatal(report, "no bot names given");
        }

        let p = &self.cfg.paths;
        let mut freeze = FreezeTable::load(self.cfg.resolve(&p.frozen));
        let mut status = StatusTable::load(self.cfg.resolve(&p.status));
        let ledger = self.tokens_ledger();
        let mut scheduler = RotationScheduler::new(
            &self.identities,
            &freeze,
            &status,
            self.cfg.limits.per_identity_limit,
            self.cfg.limits.stall_rotations,
        );
        let mut queue: VecDeque<String> = names.into();
        self.events.info(format!(
            "create run {}: {} names, {} identities",
            report.run_id,
            queue.len(),
            self.identities.len()
        ));

        while !queue.is_empty() {
            if cancel.is_cancelled() {
                report.outcome = RunOutcome::Cancelled;
                break;
            }
            let index = match scheduler.next(Utc::now().timestamp()) {
                Pick::Abort => {
                    report.outcome = RunOutcome::Stalled;
                    self.events.error(format!(
                        "no progress in {} rotations, stopping",
                        scheduler.stalled_rotations()
                    ));
                    break;
                }
                Pick::Skip { index, reason } => {
                    let id = scheduler.id(index);
                    match reason {
                        SkipReason::Frozen(until) => tracing::debug!(identity = %id, until, "skip: frozen"),
                        SkipReason::LimitReached => tracing::debug!(identity = %id, "skip: per-run limit reached"),
                        SkipReason::Blocked => tracing::debug!(identity = %id, "skip: blocked"),
                    }
                    continue;
                }
                Pick::Assign(index) => index,
            };
            let Some(base) = queue.pop_front() else {
                break;
            };
            let identity = &self.identities[index];
            self.events.info(format!("{}: creating '{}'", identity.id, base));

            match self.attempt_create(identity, &base, &ledger, cancel).await {
                Ok(record) => {
                    scheduler.record_success(index);
                    self.events.ok(format!(
                        "{}: @{} created ({} left)",
                        identity.id,
                        record.handle,
                        queue.len()
                    ));
                    report.created.push(record);
                }
                Err(err) => {
                    queue.push_front(base);
                    match self.recovery.handle(&err) {
                        RecoveryAction::FreezeIdentity(secs) => {
                            let until = Utc::now().timestamp() + secs as i64 + FREEZE_MARGIN_SECS;
                            scheduler.freeze(index, until);
                            if let Err(e) = freeze.freeze(&identity.id, until) {
                                self.events.warn(format!("freeze table write failed: {}", e));
                            }
                            self.events.freeze(format!(
                                "{}: rate limited {}s, frozen until {}",
                                identity.id, secs, until
                            ));
                        }
                        RecoveryAction::BlockIdentity => {
                            scheduler.block(index);
                            if let Err(e) = status.set(
                                &identity.id,
                                AccountStatus::new(AccountState::Blocked, Some("quota")),
                            ) {
                                self.events.warn(format!("status table write failed: {}", e));
                            }
                            if !report.blocked_identities.contains(&identity.id) {
                                report.blocked_identities.push(identity.id.clone());
                            }
                            self.events.warn(format!("{}: bot quota reached, identity blocked", identity.id));
                        }
                        RecoveryAction::Requeue => {
                            if let FactoryError::Transport(TransportError::FloodWait { seconds }) = &err {
                                self.events.rate(format!(
                                    "{}: flood wait {}s, waiting",
                                    identity.id,
                                    seconds + 1
                                ));
                                if !self.pause(Duration::from_secs(seconds + 1), cancel).await {
                                    report.outcome = RunOutcome::Cancelled;
                                    break;
                                }
                            } else {
                                self.events.warn(format!("{}: '{}' requeued: {}", identity.id, queue[0], err));
                            }
                        }
                        RecoveryAction::Abort => {
                            if matches!(err, FactoryError::Cancelled) {
                                report.outcome = RunOutcome::Cancelled;
                            } else {
                                report.outcome = RunOutcome::Fatal;
                                self.events.error(format!("run aborted: {}", err));
                            }
                            break;
                        }
                    }
                }
            }
        }

        if report.outcome != RunOutcome::Completed {
            report.remaining = queue.into_iter().collect();
        }
        self.finish(report)
    }

    /// 打开连接 → 登录 → 创建 → 写账本 → 头像；无论结果都断开
    async fn attempt_create(
        &self,
        identity: &Identity,
        base: &str,
        ledger: &TokenLedger,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedRecord, FactoryError> {
        let transport = self.factory.connect(identity).await?;
        let result = self
            .create_on(transport.as_ref(), identity, base, ledger, cancel)
            .await;
        transport.disconnect().await;
        result
    }

    async fn create_on(
        &self,
        transport: &dyn AgentTransport,
        identity: &Identity,
        base: &str,
        ledger: &TokenLedger,
        cancel: &CancellationToken,
    ) -> Result<ProvisionedRecord, FactoryError> {
        ensure_authorized(transport, identity, &self.prompts, cancel).await?;
        let driver = SessionDriver::new(
            transport,
            self.cfg.app.peer.as_str(),
            self.cfg.timeouts.poll_interval(),
            cancel.clone(),
        );

        let policy = self.cfg.naming.resolve(self.overrides.get(base));
        let created = create_bot(
            &driver,
            &self.cfg,
            &self.events,
            &identity.id,
            &policy.display_name(base),
            &policy.candidates(base),
        )
        .await?;

        let record = ProvisionedRecord {
            handle: created.handle.clone(),
            token: created.token,
            label: self.cfg.app.label.clone(),
            identity: identity.id.clone(),
            timestamp: Utc::now().timestamp(),
        };
        if let Err(e) = ledger.append(&record) {
            self.events.error(format!("ledger write failed for @{}: {}", record.handle, e));
        }

        let avatar = self.cfg.app.avatar_path.as_ref().map(|p| self.cfg.resolve(p));
        assign_avatar(
            &driver,
            &self.cfg,
            &self.events,
            &identity.id,
            &created.handle,
            avatar.as_deref(),
        )
        .await;
        Ok(record)
    }

    async fn run_admin(
        &self,
        mode: RunMode,
        targets: Vec<AdminTarget>,
        cancel: &CancellationToken,
    ) -> RunReport {
        let mut report = RunReport::new(mode);
        if targets.is_empty() {
            return self.fatal(report, "no targets given");
        }
        if self.identities.is_empty() {
            return self.fatal(report, "no identities loaded");
        }
        let revoked_ledger = RevokedLedger::new(self.cfg.resolve(&self.cfg.paths.revoked_csv));
        self.events.info(format!(
            "{:?} run {}: {} targets",
            mode,
            report.run_id,
            targets.len()
        ));

        'groups: for group in group_by_identity(&targets) {
            if cancel.is_cancelled() {
                report.outcome = RunOutcome::Cancelled;
                break;
            }
            let owner = &group[0].identity;
            let Some(identity) = self.identities.iter().find(|i| &i.id == owner) else {
                self.events.error(FactoryError::UnknownIdentity(owner.clone()).to_string());
                report
                    .failed_targets
                    .extend(group.iter().map(|t| t.handle.clone()));
                continue;
            };

            let transport = match self.factory.connect(identity).await {
                Ok(t) => t,
                Err(e) => {
                    self.events.error(format!("{}: connect failed: {}", identity.id, e));
                    report
                        .failed_targets
                        .extend(group.iter().map(|t| t.handle.clone()));
                    continue;
                }
            };
            if let Err(e) = ensure_authorized(transport.as_ref(), identity, &self.prompts, cancel).await {
                transport.disconnect().await;
                report
                    .failed_targets
                    .extend(group.iter().map(|t| t.handle.clone()));
                if matches!(e, FactoryError::Cancelled) {
                    report.outcome = RunOutcome::Cancelled;
                    break;
                }
                self.events.error(format!("{}: login failed: {}", identity.id, e));
                continue;
            }

            let driver = SessionDriver::new(
                transport.as_ref(),
                self.cfg.app.peer.as_str(),
                self.cfg.timeouts.poll_interval(),
                cancel.clone(),
            );
            for target in group {
                if cancel.is_cancelled() {
                    report.outcome = RunOutcome::Cancelled;
                    transport.disconnect().await;
                    break 'groups;
                }
                let result = match mode {
                    RunMode::Revoke => revoke_token(&driver, &self.cfg, &target.handle)
                        .await
                        .map(|token| {
                            let record = RevokedRecord {
                                handle: target.handle.clone(),
                                identity: identity.id.clone(),
                                token,
                            };
                            if let Err(e) = revoked_ledger.append(&record) {
                                self.events.error(format!(
                                    "revoked ledger write failed for @{}: {}",
                                    record.handle, e
                                ));
                            }
                            report.revoked.push(record);
                        }),
                    _ => delete_bot(&driver, &self.cfg, &target.handle)
                        .await
                        .map(|()| report.deleted.push(target.handle.clone())),
                };
                match result {
                    Ok(()) => self.events.ok(format!("{}: @{} done", identity.id, target.handle)),
                    Err(FactoryError::Cancelled) => {
                        report.failed_targets.push(target.handle.clone());
                        report.outcome = RunOutcome::Cancelled;
                        transport.disconnect().await;
                        break 'groups;
                    }
                    Err(e) => {
                        report.failed_targets.push(target.handle.clone());
                        self.events.error(format!("{}: @{} failed: {}", identity.id, target.handle, e));
                    }
                }
            }
            transport.disconnect().await;
        }

        self.finish(report)
    }

    async fn run_auth(&self, only_errors: bool, cancel: &CancellationToken) -> RunReport {
        let mut report = RunReport::new(RunMode::Auth);
        if self.identities.is_empty() {
            return self.fatal(report, "no identities loaded");
        }
        let mut status = StatusTable::load(self.cfg.resolve(&self.cfg.paths.status));

        for identity in &self.identities {
            if cancel.is_cancelled() {
                report.outcome = RunOutcome::Cancelled;
                break;
            }
            if only_errors && status.state(&identity.id) == Some(AccountState::Ok) {
                continue;
            }
            let result = self.check_identity(identity, cancel).await;
            let next = match &result {
                Ok(true) => AccountStatus::new(AccountState::Ok, None),
                Ok(false) => AccountStatus::new(AccountState::Error, Some("no_response")),
                Err(FactoryError::Cancelled) => {
                    report.outcome = RunOutcome::Cancelled;
                    break;
                }
                Err(e) => AccountStatus::new(AccountState::Error, Some(&e.to_string())),
            };
            if next.state == AccountState::Ok {
                self.events.ok(format!("{}: authorized", identity.id));
            } else {
                report.failed_targets.push(identity.id.clone());
                self.events.warn(format!(
                    "{}: {}",
                    identity.id,
                    next.reason.as_deref().unwrap_or("error")
                ));
            }
            if let Err(e) = status.set(&identity.id, next) {
                self.events.warn(format!("status table write failed: {}", e));
            }
        }

        self.finish(report)
    }

    /// 登录并发 /start；有回复返回 true
    async fn check_identity(
        &self,
        identity: &Identity,
        cancel: &CancellationToken,
    ) -> Result<bool, FactoryError> {
        let transport = self.factory.connect(identity).await?;
        let result = async {
            ensure_authorized(transport.as_ref(), identity, &self.prompts, cancel).await?;
            let driver = SessionDriver::new(
                transport.as_ref(),
                self.cfg.app.peer.as_str(),
                self.cfg.timeouts.poll_interval(),
                cancel.clone(),
            );
            let reply = driver
                .command("/start", Duration::from_secs(self.cfg.timeouts.reset_secs), None)
                .await?;
            if reply.is_none() && cancel.is_cancelled() {
                return Err(FactoryError::Cancelled);
            }
            Ok::<bool, FactoryError>(reply.is_some())
        }
        .await;
        transport.disconnect().await;
        result
    }
}

/// 相邻且属于同一账号的目标归为一组
fn group_by_identity(targets: &[AdminTarget]) -> Vec<&[AdminTarget]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..=targets.len() {
        if i == targets.len() || targets[i].identity != targets[start].identity {
            groups.push(&targets[start..i]);
            start = i;
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_by_identity_keeps_order() {
        let targets = vec![
            AdminTarget::new("a_bot", "+1"),
            AdminTarget::new("b_bot", "+1"),
            AdminTarget::new("c_bot", "+2"),
            AdminTarget::new("d_bot", "+1"),
        ];
        let groups = group_by_identity(&targets);
        let sizes: Vec<_> = groups.iter().map(|g| g.len()).collect();
        assert_eq!(sizes, vec![2, 1, 1]);
        assert_eq!(groups[2][0].handle, "d_bot");
        assert!(group_by_identity(&[]).is_empty());
    }
}
