//! 删除机器人与重置 Token
//!
//! 两个流程共用「选中机器人」部分：RESET → 命令 → Choose a bot → @handle。

use std::time::Duration;

use crate::config::AppConfig;
use crate::conversation::classifier::{
    contains_any, CHOOSE_BOT_PHRASES, DELETE_CONFIRM_PHRASES, DELETE_CONFIRM_TEXT,
    DELETE_DONE_PHRASES, INVALID_SELECTION_PHRASES, REVOKE_DONE_PHRASES,
};
use crate::conversation::{extract_token, SessionDriver};
use crate::core::FactoryError;
use crate::provisioning::{no_reply, phrases};

const DELETE_COMMAND: &str = "/deletebot";
const REVOKE_COMMAND: &str = "/revoke";

/// 删除 / 重置目标：机器人用户名 + 创建它的账号
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminTarget {
    /// 不带 @
    pub handle: String,
    pub identity: String,
}

impl AdminTarget {
    pub fn new(handle: &str, identity: &str) -> Self {
        Self {
            handle: handle.trim().trim_start_matches('@').to_string(),
            identity: identity.trim().to_string(),
        }
    }
}

/// 解析目标列表：每行 `handle:identity`，空行与 `#` 注释忽略
pub fn parse_targets(content: &str) -> Vec<AdminTarget> {
    let mut out = Vec::new();
    for (lineno, raw) in content.lines().enumerate() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match line.split_once(':') {
            Some((handle, identity)) if !handle.trim().is_empty() && !identity.trim().is_empty() => {
                out.push(AdminTarget::new(handle, identity));
            }
            _ => tracing::warn!(line = lineno + 1, "target line is not handle:identity, skipped"),
        }
    }
    out
}

/// 选中机器人，返回选中后的回复
async fn select_bot(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    command: &str,
    handle: &str,
    expected: &[&'static str],
) -> Result<String, FactoryError> {
    let t = &cfg.timeouts;
    driver.reset(Duration::from_secs(t.reset_secs)).await?;

    driver
        .command(
            command,
            Duration::from_secs(t.choose_bot_secs),
            Some(CHOOSE_BOT_PHRASES),
        )
        .await?
        .ok_or_else(|| no_reply(driver, "bot selection prompt"))?;

    let wanted = phrases(&[expected, INVALID_SELECTION_PHRASES]);
    let reply = driver
        .command(
            &format!("@{}", handle),
            Duration::from_secs(t.confirm_secs),
            Some(wanted.as_slice()),
        )
        .await?
        .ok_or_else(|| no_reply(driver, "selection confirmation"))?;

    if contains_any(&reply, INVALID_SELECTION_PHRASES) {
        return Err(FactoryError::InvalidSelection(handle.to_string()));
    }
    Ok(reply)
}

pub async fn delete_bot(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    handle: &str,
) -> Result<(), FactoryError> {
    let expected = phrases(&[DELETE_CONFIRM_PHRASES, DELETE_DONE_PHRASES]);
    let reply = select_bot(driver, cfg, DELETE_COMMAND, handle, &expected).await?;
    if contains_any(&reply, DELETE_DONE_PHRASES) {
        return Ok(());
    }

    driver
        .command(
            DELETE_CONFIRM_TEXT,
            Duration::from_secs(cfg.timeouts.confirm_secs),
            Some(DELETE_DONE_PHRASES),
        )
        .await?
        .ok_or_else(|| no_reply(driver, "deletion confirmation"))?;
    Ok(())
}

/// 返回新 Token
pub async fn revoke_token(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    handle: &str,
) -> Result<String, FactoryError> {
    let t = &cfg.timeouts;
    let hwm = driver.high_water_mark().await?;
    let reply = select_bot(driver, cfg, REVOKE_COMMAND, handle, REVOKE_DONE_PHRASES).await?;
    if let Some(token) = extract_token(&reply) {
        return Ok(token);
    }
    driver
        .repoll_token(hwm, t.token_repoll_attempts, t.token_repoll_interval())
        .await
        .ok_or_else(|| FactoryError::MissingToken(handle.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ScriptedAgent;
    use tokio_util::sync::CancellationToken;

    fn driver(agent: &ScriptedAgent) -> SessionDriver<'_> {
        SessionDriver::new(
            agent,
            "BotFather",
            Duration::from_millis(600),
            CancellationToken::new(),
        )
    }

    #[test]
    fn test_parse_targets() {
        let targets = parse_targets("# header\n@cat_bot:+1\n\nbroken\ndog_bot : +2\n:+3\n");
        assert_eq!(
            targets,
            vec![AdminTarget::new("cat_bot", "+1"), AdminTarget::new("dog_bot", "+2")]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_sends_confirmation() {
        let agent = ScriptedAgent::new();
        agent.add_bot("cat_bot");
        delete_bot(&driver(&agent), &AppConfig::default(), "cat_bot")
            .await
            .unwrap();
        assert!(agent.bots().is_empty());
        assert!(agent.sent().contains(&DELETE_CONFIRM_TEXT.to_string()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_unknown_bot_is_invalid_selection() {
        let agent = ScriptedAgent::new();
        agent.add_bot("cat_bot");
        let err = delete_bot(&driver(&agent), &AppConfig::default(), "ghost_bot")
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::InvalidSelection(ref h) if h == "ghost_bot"));
        assert_eq!(agent.bots(), vec!["cat_bot".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_returns_new_token() {
        let agent = ScriptedAgent::new();
        agent.add_bot("cat_bot");
        let token = revoke_token(&driver(&agent), &AppConfig::default(), "cat_bot")
            .await
            .unwrap();
        assert!(token.starts_with("700000001:"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_revoke_without_token_fails() {
        let agent = ScriptedAgent::new();
        agent.add_bot("cat_bot");
        agent.script_command_reply("@cat_bot", "Your token was replaced with a new one.");
        let err = revoke_token(&driver(&agent), &AppConfig::default(), "cat_bot")
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::MissingToken(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_bots_times_out_at_selection_prompt() {
        let agent = ScriptedAgent::new();
        let err = delete_bot(&driver(&agent), &AppConfig::default(), "cat_bot")
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::NoResponse("bot selection prompt")));
    }
}
