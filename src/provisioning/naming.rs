//! 命名策略：显示名与用户名候选
//!
//! 全局策略不可变；单个机器人的覆盖项按字段优先（覆盖 > 全局），在使用处解析，不修改全局策略。

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// 清洗后为空时使用的用户名基础
const FALLBACK_BASE: &str = "bot";

/// [naming] 段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingPolicy {
    pub name_prefix: String,
    pub name_suffix: String,
    /// 第一个候选：base + handle_suffix
    pub handle_suffix: String,
    /// 编号候选：base + number_separator + n + number_suffix
    pub number_separator: String,
    pub number_suffix: String,
    pub max_numbered_attempts: u32,
    pub sanitize: bool,
}

impl Default for NamingPolicy {
    fn default() -> Self {
        Self {
            name_prefix: String::new(),
            name_suffix: String::new(),
            handle_suffix: "_bot".to_string(),
            number_separator: "_".to_string(),
            number_suffix: "bot".to_string(),
            max_numbered_attempts: 5,
            sanitize: true,
        }
    }
}

/// 单个机器人的覆盖项；未设置的字段沿用全局策略
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamingOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_prefix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "username_suffix")]
    pub handle_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "numbered_separator")]
    pub number_separator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "numbered_suffix")]
    pub number_suffix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "max_number_attempts")]
    pub max_numbered_attempts: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "sanitize_username")]
    pub sanitize: Option<bool>,
}

impl NamingPolicy {
    /// 按字段合并覆盖项，得到本任务使用的策略
    pub fn resolve(&self, ov: Option<&NamingOverride>) -> NamingPolicy {
        let Some(ov) = ov else {
            return self.clone();
        };
        NamingPolicy {
            name_prefix: ov.name_prefix.clone().unwrap_or_else(|| self.name_prefix.clone()),
            name_suffix: ov.name_suffix.clone().unwrap_or_else(|| self.name_suffix.clone()),
            handle_suffix: ov
                .handle_suffix
                .clone()
                .unwrap_or_else(|| self.handle_suffix.clone()),
            number_separator: ov
                .number_separator
                .clone()
                .unwrap_or_else(|| self.number_separator.clone()),
            number_suffix: ov
                .number_suffix
                .clone()
                .unwrap_or_else(|| self.number_suffix.clone()),
            max_numbered_attempts: ov.max_numbered_attempts.unwrap_or(self.max_numbered_attempts),
            sanitize: ov.sanitize.unwrap_or(self.sanitize),
        }
    }

    pub fn display_name(&self, base: &str) -> String {
        format!("{}{}{}", self.name_prefix, base, self.name_suffix)
    }

    /// 用户名候选，长度为 max_numbered_attempts + 1
    pub fn candidates(&self, base: &str) -> Vec<String> {
        let b = if self.sanitize {
            sanitize_base(base)
        } else {
            base.to_string()
        };
        let mut out = Vec::with_capacity(self.max_numbered_attempts as usize + 1);
        out.push(format!("{}{}", b, self.handle_suffix));
        for n in 1..=self.max_numbered_attempts {
            out.push(format!(
                "{}{}{}{}",
                b, self.number_separator, n, self.number_suffix
            ));
        }
        out
    }
}

fn disallowed_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9_]").expect("valid regex"))
}

fn underscores_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"_+").expect("valid regex"))
}

/// 小写 → 去掉 [a-z0-9_] 以外字符 → 合并连续下划线 → 去首尾下划线；为空时回退 `bot`
pub fn sanitize_base(base: &str) -> String {
    let lower = base.to_lowercase();
    let stripped = disallowed_re().replace_all(&lower, "");
    let collapsed = underscores_re().replace_all(&stripped, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_BASE.to_string()
    } else {
        trimmed.to_string()
    }
}

/// 任务输入：以 `/` 分隔的名称列表
pub fn parse_task_names(raw: &str) -> Vec<String> {
    raw.split('/')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
