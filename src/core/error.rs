//! 运行错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据 FactoryError 决定冻结账号 / 拉黑账号 / 任务回队 / 终止运行。

use thiserror::Error;

/// 传输层错误（连接、认证、收发）；由外部传输实现返回
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    /// 服务端要求等待（传输层的 flood wait）
    #[error("Flood wait: {seconds}s")]
    FloodWait { seconds: u64 },

    /// 登录需要二次验证密码
    #[error("Second factor password required")]
    PasswordRequired,

    #[error("Request failed: {0}")]
    Request(String),
}

/// 单个任务 / 目标在执行中可能出现的错误
#[derive(Error, Debug)]
pub enum FactoryError {
    /// 限流秒数超过冻结阈值，需要冻结当前账号
    #[error("Rate limited for {0}s")]
    RateLimited(u64),

    /// 短限流重试次数耗尽
    #[error("Rate limit retries exhausted on {0}")]
    RateRetriesExhausted(String),

    /// 账号已达到对方的机器人数量上限
    #[error("Bot quota exceeded for this account")]
    QuotaExceeded,

    /// 在某阶段等待回复超时
    #[error("No response while waiting for {0}")]
    NoResponse(&'static str),

    #[error("All {0} handle candidates rejected")]
    CandidatesExhausted(usize),

    #[error("Invalid bot selected: @{0}")]
    InvalidSelection(String),

    #[error("No token in reply for @{0}")]
    MissingToken(String),

    #[error("Unknown identity: {0}")]
    UnknownIdentity(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("Another run is already active")]
    Busy,

    /// 启动前的配置检查失败（无账号 / 无任务 / 无目标）
    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// 恢复引擎根据错误类型给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 冻结账号 N 秒，任务回到队首
    FreezeIdentity(u64),
    /// 本次运行内不再使用该账号，任务回到队首
    BlockIdentity,
    /// 任务回到队首，换下一个账号
    Requeue,
    /// 终止整个运行
    Abort,
}
