//! 核心编排层：错误与恢复、账号轮转、运行互斥、运行报告、主控循环

pub mod error;
pub mod orchestrator;
pub mod recovery;
pub mod scheduler;
pub mod shutdown;
pub mod state;
pub mod supervisor;

pub use error::{FactoryError, RecoveryAction, TransportError};
pub use orchestrator::{Orchestrator, RunRequest};
pub use recovery::RecoveryEngine;
pub use scheduler::{IdentityRuntimeState, Pick, RotationScheduler, SkipReason};
pub use shutdown::install_signal_handlers;
pub use state::{RunMode, RunOutcome, RunReport};
pub use supervisor::{RunController, RunGuard};
