//! 头像设置：创建成功后的附加流程，任何一步失败只记告警
//!
//! /setuserpic → Choose a bot → @handle（选择被拒时重试一次）→ 发送图片 → 等待完成

use std::path::Path;
use std::time::Duration;

use crate::config::AppConfig;
use crate::conversation::classifier::{
    contains_any, CHOOSE_BOT_PHRASES, INVALID_SELECTION_PHRASES, PHOTO_DONE_PHRASES,
    SEND_PHOTO_PHRASES,
};
use crate::conversation::SessionDriver;
use crate::core::TransportError;
use crate::observability::EventSink;
use crate::provisioning::phrases;

const AVATAR_COMMAND: &str = "/setuserpic";

/// 返回头像是否设置成功；失败不影响创建结果
pub async fn assign_avatar(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    events: &EventSink,
    identity: &str,
    handle: &str,
    image: Option<&Path>,
) -> bool {
    let Some(image) = image else {
        tracing::debug!(handle = %handle, "no avatar configured");
        return false;
    };
    if !image.exists() {
        events.warn(format!("avatar {} not found, skipped", image.display()));
        return false;
    }

    match run(driver, cfg, events, identity, handle, image).await {
        Ok(done) => done,
        Err(e) => {
            events.warn(format!("{}: avatar for @{} failed: {}", identity, handle, e));
            false
        }
    }
}

async fn run(
    driver: &SessionDriver<'_>,
    cfg: &AppConfig,
    events: &EventSink,
    identity: &str,
    handle: &str,
    image: &Path,
) -> Result<bool, TransportError> {
    let t = &cfg.timeouts;
    driver.reset(Duration::from_secs(t.reset_secs)).await?;

    let prompt = driver
        .command(
            AVATAR_COMMAND,
            Duration::from_secs(t.choose_bot_secs),
            Some(CHOOSE_BOT_PHRASES),
        )
        .await?;
    if prompt.is_none() {
        events.warn(format!("{}: no bot selection prompt for avatar", identity));
        return Ok(false);
    }

    let expected = phrases(&[SEND_PHOTO_PHRASES, INVALID_SELECTION_PHRASES]);
    let selection = format!("@{}", handle);
    let mut accepted = false;
    for attempt in 0..2 {
        let Some(reply) = driver
            .command(
                &selection,
                Duration::from_secs(t.confirm_secs),
                Some(expected.as_slice()),
            )
            .await?
        else {
            events.warn(format!("{}: no photo prompt for @{}", identity, handle));
            return Ok(false);
        };
        if contains_any(&reply, SEND_PHOTO_PHRASES) {
            accepted = true;
            break;
        }
        if attempt == 0 {
            tracing::info!(handle = %handle, "avatar selection rejected, retrying once");
        }
    }
    if !accepted {
        events.warn(format!("{}: @{} rejected for avatar", identity, handle));
        return Ok(false);
    }

    let hwm = driver.high_water_mark().await?;
    driver.send_photo(image).await?;
    let done = driver
        .await_reply(hwm, Duration::from_secs(t.photo_done_secs), Some(PHOTO_DONE_PHRASES))
        .await?;
    if done.is_none() {
        events.warn(format!("{}: avatar for @{} not confirmed", identity, handle));
        return Ok(false);
    }
    events.ok(format!("{}: avatar set for @{}", identity, handle));
    Ok(true)
}
