//! 创建状态机：RESET → 等起名提示 → 发显示名 → 逐个尝试用户名 → 成功 / 失败
//!
//! 失败以 FactoryError 返回，由编排器经 RecoveryEngine 决定冻结、拉黑还是回队。
//! 当前账号作为参数传入，状态机本身不持有任何跨调用状态。

use std::time::Duration;

use crate::config::AppConfig;
use crate::conversation::classifier::{
    is_quota_exceeded, HANDLE_PROMPT_PHRASES, NAME_PROMPT_PHRASES, QUOTA_PHRASE,
};
use crate::conversation::{classify, rate_limit_seconds, ReplySignal, SessionDriver};
use crate::core::FactoryError;
use crate::observability::EventSink;
use crate::provisioning::{no_reply, phrases};

const CREATE_COMMAND: &str = "/newbot";
const RATE_LIMIT_PHRASE: &str = "try again in";

/// 一次成功创建的结果；补查后仍无 Token 时 token 为空串
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedBot {
    pub handle: String,
    pub token: String,
}

pub async fn create_bot(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    events: &EventSink,
    identity: &str,
    display_name: &str,
    candidates: &[String],
) -> Result<CreatedBot, FactoryError> {
    let t = &cfg.timeouts;
    driver.reset(Duration::from_secs(t.reset_secs)).await?;
    if driver.is_cancelled() {
        return Err(FactoryError::Cancelled);
    }

    let name_prompt = phrases(&[NAME_PROMPT_PHRASES, &[QUOTA_PHRASE, RATE_LIMIT_PHRASE]]);
    send_step(driver, cfg, events, identity, CREATE_COMMAND, &name_prompt, "name prompt").await?;

    let handle_prompt = phrases(&[HANDLE_PROMPT_PHRASES, &[QUOTA_PHRASE, RATE_LIMIT_PHRASE]]);
    send_step(driver, cfg, events, identity, display_name, &handle_prompt, "handle prompt").await?;

    try_candidates(driver, cfg, events, identity, candidates).await
}

/// 发送一步并等下一个提示；配额、长限流直接失败，短限流等待后重发一次
async fn send_step(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    events: &EventSink,
    identity: &str,
    text: &str,
    expected: &[&'static str],
    stage: &'static str,
) -> Result<(), FactoryError> {
    let timeout = Duration::from_secs(cfg.timeouts.prompt_secs);
    let mut resent = false;
    loop {
        let reply = driver
            .command(text, timeout, Some(expected))
            .await?
            .ok_or_else(|| no_reply(driver, stage))?;

        if is_quota_exceeded(&reply) {
            return Err(FactoryError::QuotaExceeded);
        }
        match rate_limit_seconds(&reply) {
            None => return Ok(()),
            Some(secs) if secs > cfg.limits.freeze_threshold_secs => {
                return Err(FactoryError::RateLimited(secs));
            }
            Some(_) if resent => {
                return Err(FactoryError::RateRetriesExhausted(text.to_string()));
            }
            Some(secs) => {
                events.rate(format!(
                    "{}: {} rate limited, waiting {}s",
                    identity,
                    text,
                    secs + 1
                ));
                if !driver.pause(Duration::from_secs(secs + 1)).await {
                    return Err(FactoryError::Cancelled);
                }
                resent = true;
            }
        }
    }
}

async fn try_candidates(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    events: &EventSink,
    identity: &str,
    candidates: &[String],
) -> Result<CreatedBot, FactoryError> {
    let t = &cfg.timeouts;
    let reply_timeout = Duration::from_secs(t.handle_reply_secs);

    for candidate in candidates {
        let mut rate_retries = 0u32;
        loop {
            if driver.is_cancelled() {
                return Err(FactoryError::Cancelled);
            }
            let hwm = driver.high_water_mark().await?;
            driver.send(candidate).await?;
            let Some(reply) = driver.await_reply(hwm, reply_timeout, None).await? else {
                if driver.is_cancelled() {
                    return Err(FactoryError::Cancelled);
                }
                events.warn(format!("{}: no reply for @{}, next candidate", identity, candidate));
                break;
            };

            match classify(&reply) {
                ReplySignal::RateLimited(secs) => {
                    if secs > cfg.limits.freeze_threshold_secs {
                        return Err(FactoryError::RateLimited(secs));
                    }
                    rate_retries += 1;
                    if rate_retries > cfg.limits.max_rate_retries {
                        return Err(FactoryError::RateRetriesExhausted(candidate.clone()));
                    }
                    events.rate(format!(
                        "{}: rate limited on @{}, waiting {}s",
                        identity,
                        candidate,
                        secs + 1
                    ));
                    if !driver.pause(Duration::from_secs(secs + 1)).await {
                        return Err(FactoryError::Cancelled);
                    }
                }
                ReplySignal::QuotaExceeded => return Err(FactoryError::QuotaExceeded),
                ReplySignal::Invalid | ReplySignal::Taken => {
                    events.info(format!("{}: @{} rejected, next candidate", identity, candidate));
                    break;
                }
                ReplySignal::Created { token } => {
                    let token = match token {
                        Some(token) => token,
                        None => driver
                            .repoll_token(hwm, t.token_repoll_attempts, t.token_repoll_interval())
                            .await
                            .unwrap_or_default(),
                    };
                    if token.is_empty() {
                        events.warn(format!("{}: @{} created but no token found", identity, candidate));
                    }
                    return Ok(CreatedBot {
                        handle: candidate.clone(),
                        token,
                    });
                }
                ReplySignal::Other => {
                    events.warn(format!(
                        "{}: unrecognised reply for @{}, next candidate",
                        identity, candidate
                    ));
                    break;
                }
            }
        }
    }

    Err(FactoryError::CandidatesExhausted(candidates.len()))
}
