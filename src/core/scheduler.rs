//! 账号轮转调度
//!
//! 游标在每次尝试后前进（不论成功与否）；一轮 = 对全部账号各尝试一次。
//! 连续 `stall_limit` 轮零成功则返回 Abort。冻结和拉黑都经由调度器写入，
//! 内存视图与持久化表保持一致。

use crate::identity::Identity;
use crate::storage::{AccountState, FreezeTable, StatusTable};

/// 单个账号在本次运行中的状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityRuntimeState {
    pub created_this_run: u32,
    pub frozen_until: Option<i64>,
    pub status: AccountState,
}

/// 不可用原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Frozen(i64),
    LimitReached,
    Blocked,
}

/// 一次调度的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pick {
    Assign(usize),
    Skip { index: usize, reason: SkipReason },
    Abort,
}

#[derive(Debug)]
pub struct RotationScheduler {
    ids: Vec<String>,
    states: Vec<IdentityRuntimeState>,
    cursor: usize,
    per_identity_limit: u32,
    stall_limit: u32,
    attempts_in_rotation: usize,
    successes_in_rotation: usize,
    stalled_rotations: u32,
}

impl RotationScheduler {
    pub fn new(
        identities: &[Identity],
        freeze: &FreezeTable,
        status: &StatusTable,
        per_identity_limit: u32,
        stall_limit: u32,
    ) -> Self {
        let ids: Vec<String> = identities.iter().map(|i| i.id.clone()).collect();
        let states = ids
            .iter()
            .map(|id| IdentityRuntimeState {
                created_this_run: 0,
                frozen_until: freeze.frozen_until(id),
                status: status.state(id).unwrap_or(AccountState::Ok),
            })
            .collect();
        Self {
            ids,
            states,
            cursor: 0,
            per_identity_limit,
            stall_limit,
            attempts_in_rotation: 0,
            successes_in_rotation: 0,
            stalled_rotations: 0,
        }
    }

    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    pub fn stalled_rotations(&self) -> u32 {
        self.stalled_rotations
    }

    /// 选出下一个账号；每次调用都计入本轮尝试并前进游标
    pub fn next(&mut self, now: i64) -> Pick {
        let n = self.ids.len();
        if n == 0 {
            return Pick::Abort;
        }
        if self.attempts_in_rotation >= n {
            self.close_rotation();
        }
        if self.stalled_rotations >= self.stall_limit {
            return Pick::Abort;
        }

        let index = self.cursor % n;
        self.cursor = (self.cursor + 1) % n;
        self.attempts_in_rotation += 1;

        match self.ineligible(index, now) {
            Some(reason) => Pick::Skip { index, reason },
            None => Pick::Assign(index),
        }
    }

    fn close_rotation(&mut self) {
        if self.successes_in_rotation == 0 {
            self.stalled_rotations += 1;
        } else {
            self.stalled_rotations = 0;
        }
        self.attempts_in_rotation = 0;
        self.successes_in_rotation = 0;
    }

    fn ineligible(&self, index: usize, now: i64) -> Option<SkipReason> {
        let state = &self.states[index];
        if state.status == AccountState::Blocked {
            return Some(SkipReason::Blocked);
        }
        if let Some(until) = state.frozen_until {
            if now < until {
                return Some(SkipReason::Frozen(until));
            }
        }
        if state.created_this_run >= self.per_identity_limit {
            return Some(SkipReason::LimitReached);
        }
        None
    }

    pub fn record_success(&mut self, index: usize) {
        self.states[index].created_this_run += 1;
        self.successes_in_rotation += 1;
    }

    pub fn freeze(&mut self, index: usize, until: i64) {
        self.states[index].frozen_until = Some(until);
    }

    pub fn block(&mut self, index: usize) {
        self.states[index].status = AccountState::Blocked;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _dir: TempDir,
        freeze: FreezeTable,
        status: StatusTable,
        ids: Vec<Identity>,
    }

    fn fixture(n: usize) -> Fixture {
        let dir = TempDir::new().unwrap();
        let freeze = FreezeTable::load(dir.path().join("frozen.json"));
        let status = StatusTable::load(dir.path().join("status.json"));
        let ids = (1..=n)
            .map(|i| Identity::new(format!("+{}", i), i as i64, "h"))
            .collect();
        Fixture {
            _dir: dir,
            freeze,
            status,
            ids,
        }
    }

    #[test]
    fn test_round_robin_advances_on_every_attempt() {
        let f = fixture(3);
        let mut s = RotationScheduler::new(&f.ids, &f.freeze, &f.status, 2, 3);
        assert_eq!(s.next(0), Pick::Assign(0));
        assert_eq!(s.next(0), Pick::Assign(1));
        assert_eq!(s.next(0), Pick::Assign(2));
        assert_eq!(s.next(0), Pick::Assign(0));
    }

    #[test]
    fn test_frozen_identity_is_skipped_until_deadline() {
        let mut f = fixture(2);
        f.freeze.freeze("+1", 100).unwrap();
        let mut s = RotationScheduler::new(&f.ids, &f.freeze, &f.status, 2, 3);
        assert_eq!(
            s.next(99),
            Pick::Skip {
                index: 0,
                reason: SkipReason::Frozen(100)
            }
        );
        assert_eq!(s.next(99), Pick::Assign(1));
        s.record_success(1);
        assert_eq!(s.next(100), Pick::Assign(0));
    }

    #[test]
    fn test_limit_and_block() {
        let f = fixture(2);
        let mut s = RotationScheduler::new(&f.ids, &f.freeze, &f.status, 1, 3);
        assert_eq!(s.next(0), Pick::Assign(0));
        s.record_success(0);
        s.block(1);
        assert_eq!(
            s.next(0),
            Pick::Skip {
                index: 1,
                reason: SkipReason::Blocked
            }
        );
        assert_eq!(
            s.next(0),
            Pick::Skip {
                index: 0,
                reason: SkipReason::LimitReached
            }
        );
    }

    #[test]
    fn test_three_stalled_rotations_abort_after_six_attempts() {
        let mut f = fixture(2);
        f.freeze.freeze("+1", i64::MAX).unwrap();
        f.freeze.freeze("+2", i64::MAX).unwrap();
        let mut s = RotationScheduler::new(&f.ids, &f.freeze, &f.status, 2, 3);
        let mut attempts = 0;
        while let Pick::Skip { .. } = s.next(0) {
            attempts += 1;
        }
        assert_eq!(attempts, 6);
        assert_eq!(s.stalled_rotations(), 3);
        assert_eq!(s.next(0), Pick::Abort);
    }

    #[test]
    fn test_success_resets_stall_counter() {
        let f = fixture(1);
        let mut s = RotationScheduler::new(&f.ids, &f.freeze, &f.status, 10, 2);
        assert_eq!(s.next(0), Pick::Assign(0));
        // 第一轮零成功
        assert_eq!(s.next(0), Pick::Assign(0));
        s.record_success(0);
        assert_eq!(s.next(0), Pick::Assign(0));
        assert_eq!(s.stalled_rotations(), 0);
    }

    #[test]
    fn test_persisted_blocked_status_is_honoured() {
        let mut f = fixture(1);
        f.status
            .set("+1", crate::storage::AccountStatus::new(AccountState::Blocked, Some("quota")))
            .unwrap();
        let mut s = RotationScheduler::new(&f.ids, &f.freeze, &f.status, 2, 1);
        assert!(matches!(s.next(0), Pick::Skip { reason: SkipReason::Blocked, .. }));
        assert_eq!(s.next(0), Pick::Abort);
    }
}
