//! 回复分类：从对话代理的自由文本回复中提取结构化信号
//!
//! 纯函数，无副作用；匹配不到时返回 None / false，而不是报错。

use std::sync::OnceLock;

use regex::Regex;

/// 账号机器人数量已达上限（小写匹配）
pub const QUOTA_PHRASE: &str = "can't add more than 20 bots";

/// /newbot 之后的起名提示
pub const NAME_PROMPT_PHRASES: &[&str] = &["choose a name", "how are we going to call it"];

/// 起名之后的用户名提示
pub const HANDLE_PROMPT_PHRASES: &[&str] = &["choose a username", "username for your bot"];

/// /setuserpic、/deletebot、/revoke 之后的选择提示
pub const CHOOSE_BOT_PHRASES: &[&str] = &["choose a bot"];

pub const INVALID_SELECTION_PHRASES: &[&str] = &["invalid bot selected"];

pub const SEND_PHOTO_PHRASES: &[&str] = &["send me the new profile photo"];

pub const PHOTO_DONE_PHRASES: &[&str] = &["photo updated"];

/// 删除前要求输入确认句
pub const DELETE_CONFIRM_PHRASES: &[&str] = &["totally sure"];

pub const DELETE_DONE_PHRASES: &[&str] = &["the bot is gone"];

/// /revoke 选中机器人后的回复
pub const REVOKE_DONE_PHRASES: &[&str] = &["token was replaced", "new token"];

/// 删除确认句（原样发送）
pub const DELETE_CONFIRM_TEXT: &str = "Yes, I am totally sure.";

const SUCCESS_PHRASES: &[&str] = &["done!", "congratulations", "you will find it at"];

fn rate_limit_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)try again in (\d+) seconds").expect("valid regex"))
}

fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{6,12}:[A-Za-z0-9_-]{20,}\b").expect("valid regex"))
}

/// 「try again in N seconds」中的 N
pub fn rate_limit_seconds(text: &str) -> Option<u64> {
    rate_limit_re()
        .captures(text)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn is_quota_exceeded(text: &str) -> bool {
    text.to_lowercase().contains(QUOTA_PHRASE)
}

/// 形如 `123456789:AA...` 的访问 Token
pub fn extract_token(text: &str) -> Option<String> {
    token_re().find(text).map(|m| m.as_str().to_string())
}

pub fn is_success(text: &str) -> bool {
    contains_any(text, SUCCESS_PHRASES)
}

pub fn is_invalid(text: &str) -> bool {
    text.to_lowercase().contains("invalid")
}

pub fn is_taken(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("already taken") || lower.contains("is taken")
}

/// 大小写不敏感的子串匹配
pub fn contains_any(text: &str, phrases: &[&str]) -> bool {
    let lower = text.to_lowercase();
    phrases.iter().any(|p| lower.contains(&p.to_lowercase()))
}

/// 候选用户名的回复归类
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplySignal {
    RateLimited(u64),
    QuotaExceeded,
    Invalid,
    Taken,
    Created { token: Option<String> },
    Other,
}

/// 按优先级归类：限流 > 配额 > 非法 > 已占用 > 成功 > 其它
pub fn classify(text: &str) -> ReplySignal {
    if let Some(secs) = rate_limit_seconds(text) {
        return ReplySignal::RateLimited(secs);
    }
    if is_quota_exceeded(text) {
        return ReplySignal::QuotaExceeded;
    }
    if is_invalid(text) {
        return ReplySignal::Invalid;
    }
    if is_taken(text) {
        return ReplySignal::Taken;
    }
    if is_success(text) {
        return ReplySignal::Created {
            token: extract_token(text),
        };
    }
    ReplySignal::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_seconds() {
        assert_eq!(
            rate_limit_seconds("Too many attempts. Please try again in 45 seconds."),
            Some(45)
        );
        assert_eq!(rate_limit_seconds("TRY AGAIN IN 500 SECONDS"), Some(500));
        assert_eq!(rate_limit_seconds("try again later"), None);
    }

    #[test]
    fn test_quota_phrase_case_insensitive() {
        assert!(is_quota_exceeded("Sorry, you CAN'T ADD MORE THAN 20 BOTS."));
        assert!(!is_quota_exceeded("You have 19 bots."));
    }

    #[test]
    fn test_extract_token() {
        let text = "Use this token to access the HTTP API:\n123456789:AAExampleToken0000000000000\nKeep it secure";
        assert_eq!(
            extract_token(text).as_deref(),
            Some("123456789:AAExampleToken0000000000000")
        );
        // 数字过短、后缀过短都不算
        assert_eq!(extract_token("12345:AAExampleToken0000000000000"), None);
        assert_eq!(extract_token("123456789:short"), None);
        assert_eq!(extract_token(""), None);
    }

    #[test]
    fn test_invalid_and_taken() {
        assert!(is_invalid("Sorry, this username is invalid."));
        assert!(is_taken("Sorry, this username is already taken."));
        assert!(!is_taken("Sorry, this username is invalid."));
    }

    #[test]
    fn test_classify_success_with_token() {
        let text = "Done! Congratulations on your new bot. You will find it at @catbot.\n123456789:AAExampleToken0000000000000";
        assert_eq!(
            classify(text),
            ReplySignal::Created {
                token: Some("123456789:AAExampleToken0000000000000".to_string())
            }
        );
    }

    #[test]
    fn test_classify_priority() {
        assert_eq!(
            classify("Please try again in 45 seconds"),
            ReplySignal::RateLimited(45)
        );
        assert_eq!(
            classify("That I cannot do. You can't add more than 20 bots."),
            ReplySignal::QuotaExceeded
        );
        assert_eq!(classify("Done! You will find it at t.me/x"), ReplySignal::Created { token: None });
        assert_eq!(classify("Hmm?"), ReplySignal::Other);
    }

    #[test]
    fn test_contains_any() {
        assert!(contains_any(
            "Alright, a new bot. How are we going to call it?",
            NAME_PROMPT_PHRASES
        ));
        assert!(!contains_any("hello", NAME_PROMPT_PHRASES));
    }
}
