//! 密码 / 验证码提示信箱
//!
//! 容量为 1 的请求通道 + 每个请求自带 oneshot 回信：编排器发出请求后阻塞等待，
//! 展示层收到请求、回填一个值即解除阻塞。编排器内部不涉及任何 UI 回调。

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// 需要用户提供的秘密类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretKind {
    /// 登录验证码
    LoginCode,
    /// 二次验证密码
    Password,
}

/// 一次提示请求；展示层调用 `answer` 回填
#[derive(Debug)]
pub struct SecretRequest {
    pub identity: String,
    pub kind: SecretKind,
    reply: oneshot::Sender<String>,
}

impl SecretRequest {
    pub fn answer(self, value: impl Into<String>) {
        let _ = self.reply.send(value.into());
    }
}

/// 编排器一侧的提示句柄
#[derive(Debug, Clone)]
pub struct PromptBridge {
    tx: mpsc::Sender<SecretRequest>,
}

/// 创建信箱：返回编排器句柄与展示层接收端
pub fn prompt_channel() -> (PromptBridge, mpsc::Receiver<SecretRequest>) {
    let (tx, rx) = mpsc::channel(1);
    (PromptBridge { tx }, rx)
}

impl PromptBridge {
    /// 请求一个值并等待；展示层已关闭、请求被丢弃或运行被取消时返回 None
    pub async fn ask(
        &self,
        identity: &str,
        kind: SecretKind,
        cancel: &CancellationToken,
    ) -> Option<String> {
        let (reply, answer) = oneshot::channel();
        let request = SecretRequest {
            identity: identity.to_string(),
            kind,
            reply,
        };
        tracing::info!(identity = %identity, kind = ?kind, "waiting for secret input");

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            sent = self.tx.send(request) => sent.ok()?,
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            value = answer => value.ok().map(|v| v.trim().to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ask_is_unblocked_by_answer() {
        let (bridge, mut rx) = prompt_channel();
        let responder = tokio::spawn(async move {
            let req = rx.recv().await.unwrap();
            assert_eq!(req.identity, "+1");
            assert_eq!(req.kind, SecretKind::LoginCode);
            req.answer(" 12345 \n");
        });
        let value = bridge
            .ask("+1", SecretKind::LoginCode, &CancellationToken::new())
            .await;
        responder.await.unwrap();
        assert_eq!(value.as_deref(), Some("12345"));
    }

    #[tokio::test]
    async fn test_ask_returns_none_when_request_dropped() {
        let (bridge, mut rx) = prompt_channel();
        tokio::spawn(async move {
            let req = rx.recv().await.unwrap();
            drop(req);
        });
        let value = bridge
            .ask("+1", SecretKind::Password, &CancellationToken::new())
            .await;
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_ask_cancelled_while_waiting() {
        let (bridge, _rx) = prompt_channel();
        let cancel = CancellationToken::new();
        let c = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            c.cancel();
        });
        let value = bridge.ask("+1", SecretKind::Password, &cancel).await;
        assert!(value.is_none());
    }
}
