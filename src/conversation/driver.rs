//! 会话驱动：在已连接的传输上「发命令 → 等回复」
//!
//! 超时不是错误：await_reply 超时或被取消时返回 Ok(None)，由调用方决定回队还是继续；
//! 只有传输层失败才以 Err 向上传播。

use std::path::Path;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::conversation::classifier::{contains_any, extract_token};
use crate::conversation::AgentTransport;
use crate::core::TransportError;

/// 每次轮询拉取的最近消息条数
const POLL_WINDOW: usize = 8;

/// 绑定到单个对话对象（peer）的协议助手
pub struct SessionDriver<'a> {
    transport: &'a dyn AgentTransport,
    peer: String,
    poll_interval: Duration,
    cancel: CancellationToken,
}

impl<'a> SessionDriver<'a> {
    pub fn new(
        transport: &'a dyn AgentTransport,
        peer: impl Into<String>,
        poll_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            transport,
            peer: peer.into(),
            poll_interval,
            cancel,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 当前最新消息的 id（无消息时为 0）
    pub async fn high_water_mark(&self) -> Result<i64, TransportError> {
        let last = self.transport.recent_messages(&self.peer, 1).await?;
        Ok(last.iter().map(|m| m.id).max().unwrap_or(0))
    }

    pub async fn send(&self, text: &str) -> Result<(), TransportError> {
        tracing::debug!(peer = %self.peer, text = %text, "send");
        self.transport.send_text(&self.peer, text).await
    }

    pub async fn send_photo(&self, image: &Path) -> Result<(), TransportError> {
        tracing::debug!(peer = %self.peer, image = %image.display(), "send photo");
        self.transport.send_photo(&self.peer, image).await
    }

    /// 等待 id 大于 `high_water_mark` 的新回复
    ///
    /// 给定 `match_phrases` 时，只有新消息中出现任一短语（大小写不敏感）才返回；
    /// 否则返回第一批新消息。多条新消息按时间顺序用换行拼接。
    pub async fn await_reply(
        &self,
        high_water_mark: i64,
        timeout: Duration,
        match_phrases: Option<&[&str]>,
    ) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let mut fresh: Vec<_> = self
                .transport
                .recent_messages(&self.peer, POLL_WINDOW)
                .await?
                .into_iter()
                .filter(|m| m.id > high_water_mark && !m.outgoing && !m.text.is_empty())
                .collect();

            if !fresh.is_empty() {
                fresh.sort_by_key(|m| m.id);
                let qualifies = match match_phrases {
                    None => true,
                    Some(phrases) => fresh.iter().any(|m| contains_any(&m.text, phrases)),
                };
                if qualifies {
                    let joined = fresh
                        .iter()
                        .map(|m| m.text.as_str())
                        .collect::<Vec<_>>()
                        .join("\n");
                    return Ok(Some(joined));
                }
            }

            if Instant::now() >= deadline {
                return Ok(None);
            }
            if !self.pause(self.poll_interval).await {
                return Ok(None);
            }
        }
    }

    /// 记下水位 → 发送 → 等回复
    pub async fn command(
        &self,
        text: &str,
        timeout: Duration,
        match_phrases: Option<&[&str]>,
    ) -> Result<Option<String>, TransportError> {
        let hwm = self.high_water_mark().await?;
        self.send(text).await?;
        self.await_reply(hwm, timeout, match_phrases).await
    }

    /// 发送 /cancel 并丢弃回复，避免接着上一个账号 / 上一次的流程
    pub async fn reset(&self, timeout: Duration) -> Result<(), TransportError> {
        let _ = self.command("/cancel", timeout, None).await?;
        Ok(())
    }

    /// 在 `high_water_mark` 之后的消息中补查 Token（Token 有时单独成条或延迟到达）
    pub async fn repoll_token(
        &self,
        high_water_mark: i64,
        attempts: u32,
        interval: Duration,
    ) -> Option<String> {
        for _ in 0..attempts {
            match self.transport.recent_messages(&self.peer, POLL_WINDOW).await {
                Ok(recent) => {
                    if let Some(token) = recent
                        .iter()
                        .filter(|m| m.id > high_water_mark && !m.outgoing)
                        .find_map(|m| extract_token(&m.text))
                    {
                        return Some(token);
                    }
                }
                Err(e) => tracing::debug!("token re-poll failed: {}", e),
            }
            if !self.pause(interval).await {
                return None;
            }
        }
        None
    }

    /// 可取消的等待；被取消时返回 false
    pub async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
