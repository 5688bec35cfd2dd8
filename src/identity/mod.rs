//! 账号来源：解析账号列表文件，登录握手与密码提示信箱

pub mod auth;
pub mod prompt;

use std::path::Path;

use anyhow::Context;

pub use auth::ensure_authorized;
pub use prompt::{prompt_channel, PromptBridge, SecretKind, SecretRequest};

/// 密码未知、需要交互输入时的占位值
pub const UNKNOWN_SECRET: &str = "UNKNOWN";

/// 一个代理账号；单次运行内不可变
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// 账号标识（手机号）
    pub id: String,
    /// 二次验证密码；None 表示需要交互输入
    pub secret: Option<String>,
    pub api_key: i64,
    pub api_secret: String,
}

impl Identity {
    pub fn new(id: impl Into<String>, api_key: i64, api_secret: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            secret: None,
            api_key,
            api_secret: api_secret.into(),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

/// 解析账号列表：每行 `identity:secret:key:keysecret`
///
/// 空行与 `#` 注释忽略；字段不足或 key 不是整数的行跳过并告警。
pub fn parse_accounts(content: &str) -> Vec<Identity> {
    let mut out = Vec::new();
    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let parts: Vec<&str> = line.split(':').collect();
        if parts.len() < 4 {
            tracing::warn!(line = lineno + 1, "account line has fewer than 4 fields, skipped");
            continue;
        }
        let api_key = match parts[2].trim().parse::<i64>() {
            Ok(v) => v,
            Err(_) => {
                tracing::warn!(line = lineno + 1, "account api key is not an integer, skipped");
                continue;
            }
        };
        let secret = parts[1].trim();
        out.push(Identity {
            id: parts[0].trim().to_string(),
            secret: if secret.eq_ignore_ascii_case(UNKNOWN_SECRET) || secret.is_empty() {
                None
            } else {
                Some(secret.to_string())
            },
            api_key,
            api_secret: parts[3].trim().to_string(),
        });
    }
    out
}

/// 读取账号列表文件；文件不存在时返回空列表
pub fn load_accounts(path: &Path) -> anyhow::Result<Vec<Identity>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read accounts file {}", path.display()))?;
    Ok(parse_accounts(&content))
}
