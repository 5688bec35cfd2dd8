//! 对话传输抽象
//!
//! 所有后端（真实客户端 / ScriptedAgent）实现 AgentTransport：认证、发文本、发图片、拉取最近消息。
//! TransportFactory 为每个账号打开一条已连接的传输。

use std::path::Path;

use async_trait::async_trait;

use crate::core::TransportError;
use crate::identity::Identity;

/// 对话中的一条消息；outgoing 为本账号自己发出的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentMessage {
    pub id: i64,
    pub text: String,
    pub outgoing: bool,
}

/// 与对话代理之间的已连接通道
#[async_trait]
pub trait AgentTransport: Send + Sync {
    async fn is_authorized(&self) -> Result<bool, TransportError>;

    /// 请求下发登录验证码
    async fn request_login_code(&self) -> Result<(), TransportError>;

    /// 用验证码登录；需要二次验证时返回 `TransportError::PasswordRequired`
    async fn sign_in(&self, code: &str) -> Result<(), TransportError>;

    async fn sign_in_password(&self, password: &str) -> Result<(), TransportError>;

    async fn send_text(&self, peer: &str, text: &str) -> Result<(), TransportError>;

    /// 发送图片（头像）；调用期间不可中断
    async fn send_photo(&self, peer: &str, image: &Path) -> Result<(), TransportError>;

    /// 最近的消息，新消息在前
    async fn recent_messages(
        &self,
        peer: &str,
        limit: usize,
    ) -> Result<Vec<AgentMessage>, TransportError>;

    /// 断开连接；失败不影响调用方
    async fn disconnect(&self) {}
}

/// 为账号打开传输
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn connect(&self, identity: &Identity) -> Result<Box<dyn AgentTransport>, TransportError>;
}
