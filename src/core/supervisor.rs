//! 运行互斥与取消
//!
//! 同一时刻只允许一个后台运行（开通 / 删除 / 重置 / 批量登录）。启动时检查忙标志，
//! 取得的 RunGuard 在运行结束（包括 panic 展开）时释放。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio_util::sync::CancellationToken;

use crate::core::FactoryError;

#[derive(Debug, Clone, Default)]
pub struct RunController {
    busy: Arc<AtomicBool>,
    current: Arc<Mutex<Option<CancellationToken>>>,
}

/// 占用期间持有；Drop 时释放忙标志
#[derive(Debug)]
pub struct RunGuard {
    busy: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl RunGuard {
    /// 本次运行的取消令牌
    pub fn token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::SeqCst);
    }
}

impl RunController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 取得运行权；已有运行时返回 Busy
    pub fn try_acquire(&self) -> Result<RunGuard, FactoryError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(FactoryError::Busy);
        }
        let cancel = CancellationToken::new();
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(cancel.clone());
        Ok(RunGuard {
            busy: Arc::clone(&self.busy),
            cancel,
        })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    /// 请求停止当前运行；在下一个等待点生效
    pub fn stop(&self) {
        if let Some(token) = self
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
        {
            tracing::info!("stop requested");
            token.cancel();
        }
    }
}
