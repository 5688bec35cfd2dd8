//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BOTFACTORY__*` 覆盖（双下划线表示嵌套，如 `BOTFACTORY__LIMITS__PER_IDENTITY_LIMIT=3`）。

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::provisioning::NamingPolicy;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    #[serde(default)]
    pub app: AppSection,
    #[serde(default)]
    pub naming: NamingPolicy,
    #[serde(default)]
    pub limits: LimitsSection,
    #[serde(default)]
    pub timeouts: TimeoutsSection,
    #[serde(default)]
    pub paths: PathsSection,
}

/// [app] 段：对话对象、分组标签、头像、数据目录
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    /// 对话对象（机器人管理账号），默认 BotFather
    #[serde(default = "default_peer")]
    pub peer: String,
    /// 写入账本的分组标签
    #[serde(default = "default_label")]
    pub label: String,
    /// 创建成功后设置的头像图片；未设置则跳过头像
    pub avatar_path: Option<PathBuf>,
    /// 相对路径的根目录，未设置时用当前目录
    pub data_dir: Option<PathBuf>,
}

fn default_peer() -> String {
    "BotFather".to_string()
}

fn default_label() -> String {
    "None".to_string()
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            peer: default_peer(),
            label: default_label(),
            avatar_path: None,
            data_dir: None,
        }
    }
}

/// [limits] 段：每账号配额、冻结阈值、停滞判定
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsSection {
    /// 单次运行中每个账号最多创建的数量
    #[serde(default = "default_per_identity_limit")]
    pub per_identity_limit: u32,
    /// 限流秒数超过该值则冻结账号而非原地等待
    #[serde(default = "default_freeze_threshold_secs")]
    pub freeze_threshold_secs: u64,
    /// 连续多少轮零成功后放弃
    #[serde(default = "default_stall_rotations")]
    pub stall_rotations: u32,
    /// 同一候选用户名上短限流重试的上限
    #[serde(default = "default_max_rate_retries")]
    pub max_rate_retries: u32,
}

fn default_per_identity_limit() -> u32 {
    2
}

fn default_freeze_threshold_secs() -> u64 {
    350
}

fn default_stall_rotations() -> u32 {
    3
}

fn default_max_rate_retries() -> u32 {
    10
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            per_identity_limit: default_per_identity_limit(),
            freeze_threshold_secs: default_freeze_threshold_secs(),
            stall_rotations: default_stall_rotations(),
            max_rate_retries: default_max_rate_retries(),
        }
    }
}

/// [timeouts] 段：轮询间隔与各协议阶段的等待上限
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsSection {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// /cancel 之后丢弃回复的等待
    #[serde(default = "default_reset_secs")]
    pub reset_secs: u64,
    /// 等待「起名」「选用户名」提示
    #[serde(default = "default_prompt_secs")]
    pub prompt_secs: u64,
    #[serde(default = "default_handle_reply_secs")]
    pub handle_reply_secs: u64,
    /// 等待「Choose a bot」
    #[serde(default = "default_choose_bot_secs")]
    pub choose_bot_secs: u64,
    /// 选择 @handle 之后的确认
    #[serde(default = "default_confirm_secs")]
    pub confirm_secs: u64,
    #[serde(default = "default_photo_done_secs")]
    pub photo_done_secs: u64,
    /// 成功但回复里没有 Token 时的补查次数
    #[serde(default = "default_token_repoll_attempts")]
    pub token_repoll_attempts: u32,
    #[serde(default = "default_token_repoll_interval_ms")]
    pub token_repoll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    600
}

fn default_reset_secs() -> u64 {
    8
}

fn default_prompt_secs() -> u64 {
    25
}

fn default_handle_reply_secs() -> u64 {
    25
}

fn default_choose_bot_secs() -> u64 {
    20
}

fn default_confirm_secs() -> u64 {
    20
}

fn default_photo_done_secs() -> u64 {
    25
}

fn default_token_repoll_attempts() -> u32 {
    12
}

fn default_token_repoll_interval_ms() -> u64 {
    700
}

impl Default for TimeoutsSection {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            reset_secs: default_reset_secs(),
            prompt_secs: default_prompt_secs(),
            handle_reply_secs: default_handle_reply_secs(),
            choose_bot_secs: default_choose_bot_secs(),
            confirm_secs: default_confirm_secs(),
            photo_done_secs: default_photo_done_secs(),
            token_repoll_attempts: default_token_repoll_attempts(),
            token_repoll_interval_ms: default_token_repoll_interval_ms(),
        }
    }
}

impl TimeoutsSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn token_repoll_interval(&self) -> Duration {
        Duration::from_millis(self.token_repoll_interval_ms)
    }
}

/// [paths] 段：账号列表与各持久化表；相对路径基于 app.data_dir
#[derive(Debug, Clone, Deserialize)]
pub struct PathsSection {
    #[serde(default = "default_accounts")]
    pub accounts: PathBuf,
    #[serde(default = "default_frozen")]
    pub frozen: PathBuf,
    #[serde(default = "default_status")]
    pub status: PathBuf,
    #[serde(default = "default_tokens_txt")]
    pub tokens_txt: PathBuf,
    #[serde(default = "default_tokens_csv")]
    pub tokens_csv: PathBuf,
    #[serde(default = "default_revoked_csv")]
    pub revoked_csv: PathBuf,
    /// 单个机器人的命名覆盖表（JSON）
    #[serde(default = "default_overrides")]
    pub overrides: PathBuf,
}

fn default_accounts() -> PathBuf {
    "accounts_tg.txt".into()
}

fn default_frozen() -> PathBuf {
    "frozen.json".into()
}

fn default_status() -> PathBuf {
    "accounts_status.json".into()
}

fn default_tokens_txt() -> PathBuf {
    "tokens.txt".into()
}

fn default_tokens_csv() -> PathBuf {
    "tokens.csv".into()
}

fn default_revoked_csv() -> PathBuf {
    "revoked.csv".into()
}

fn default_overrides() -> PathBuf {
    "bot_overrides.json".into()
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            accounts: default_accounts(),
            frozen: default_frozen(),
            status: default_status(),
            tokens_txt: default_tokens_txt(),
            tokens_csv: default_tokens_csv(),
            revoked_csv: default_revoked_csv(),
            overrides: default_overrides(),
        }
    }
}

impl AppConfig {
    /// 数据目录：配置 > 当前目录
    pub fn data_dir(&self) -> PathBuf {
        self.app
            .data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// 将相对路径解析到数据目录下，绝对路径原样返回
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir().join(path)
        }
    }

    /// 以 `dir` 为数据目录的默认配置（测试与临时运行用）
    pub fn with_data_dir(dir: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::default();
        cfg.app.data_dir = Some(dir.into());
        cfg
    }
}

/// 从 config 目录加载配置，环境变量 BOTFACTORY__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BOTFACTORY__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BOTFACTORY")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 加载失败时回退默认配置（二进制入口用）
pub fn load_config_or_default(config_path: Option<PathBuf>) -> AppConfig {
    load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_values() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.app.peer, "BotFather");
        assert_eq!(cfg.limits.per_identity_limit, 2);
        assert_eq!(cfg.limits.freeze_threshold_secs, 350);
        assert_eq!(cfg.limits.stall_rotations, 3);
        assert_eq!(cfg.timeouts.poll_interval(), Duration::from_millis(600));
        assert_eq!(cfg.naming.handle_suffix, "_bot");
    }

    #[test]
    fn test_resolve_relative_against_data_dir() {
        let cfg = AppConfig::with_data_dir("/tmp/factory");
        assert_eq!(
            cfg.resolve(&cfg.paths.frozen),
            PathBuf::from("/tmp/factory/frozen.json")
        );
        assert_eq!(
            cfg.resolve(Path::new("/abs/tokens.csv")),
            PathBuf::from("/abs/tokens.csv")
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let c = config::Config::builder()
            .add_source(config::File::from_str(
                "[limits]\nper_identity_limit = 5\n[naming]\nname_prefix = \"X \"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: AppConfig = c.try_deserialize().unwrap();
        assert_eq!(cfg.limits.per_identity_limit, 5);
        assert_eq!(cfg.limits.freeze_threshold_secs, 350);
        assert_eq!(cfg.naming.name_prefix, "X ");
        assert_eq!(cfg.naming.max_numbered_attempts, 5);
    }
}
