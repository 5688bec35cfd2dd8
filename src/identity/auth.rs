//! 登录握手：验证码 + 可选二次密码
//!
//! 已登录直接返回；否则请求验证码并通过 PromptBridge 向展示层索取。
//! 需要二次密码时先用账号里保存的密码，被拒或未知时再交互索取。

use tokio_util::sync::CancellationToken;

use crate::conversation::AgentTransport;
use crate::core::{FactoryError, TransportError};
use crate::identity::{Identity, PromptBridge, SecretKind};

pub async fn ensure_authorized(
    transport: &dyn AgentTransport,
    identity: &Identity,
    prompts: &PromptBridge,
    cancel: &CancellationToken,
) -> Result<(), FactoryError> {
    if transport.is_authorized().await? {
        return Ok(());
    }

    tracing::info!(identity = %identity.id, "login required");
    transport.request_login_code().await?;
    let code = prompts
        .ask(&identity.id, SecretKind::LoginCode, cancel)
        .await
        .ok_or_else(|| missing_input(cancel, "login code"))?;

    match transport.sign_in(&code).await {
        Ok(()) => Ok(()),
        Err(TransportError::PasswordRequired) => {
            if let Some(stored) = identity.secret.as_deref() {
                match transport.sign_in_password(stored).await {
                    Ok(()) => return Ok(()),
                    Err(TransportError::Auth(reason)) => {
                        tracing::warn!(identity = %identity.id, "stored password rejected: {}", reason);
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            let password = prompts
                .ask(&identity.id, SecretKind::Password, cancel)
                .await
                .filter(|p| !p.is_empty())
                .ok_or_else(|| missing_input(cancel, "password"))?;
            transport.sign_in_password(&password).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn missing_input(cancel: &CancellationToken, what: &str) -> FactoryError {
    if cancel.is_cancelled() {
        FactoryError::Cancelled
    } else {
        TransportError::Auth(format!("no {} provided", what)).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::ScriptedAgent;
    use crate::identity::prompt_channel;

    #[tokio::test]
    async fn test_already_authorized_skips_prompt() {
        let agent = ScriptedAgent::new();
        let (bridge, _rx) = prompt_channel();
        let id = Identity::new("+1", 1, "h");
        ensure_authorized(&agent, &id, &bridge, &CancellationToken::new())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_code_and_stored_password() {
        let agent = ScriptedAgent::new();
        agent.require_login("777", Some("secret"));
        let (bridge, mut rx) = prompt_channel();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                assert_eq!(req.kind, SecretKind::LoginCode);
                req.answer("777");
            }
        });
        let id = Identity::new("+1", 1, "h").with_secret("secret");
        ensure_authorized(&agent, &id, &bridge, &CancellationToken::new())
            .await
            .unwrap();
        assert!(agent.authorized());
    }

    #[tokio::test]
    async fn test_wrong_stored_password_falls_back_to_prompt() {
        let agent = ScriptedAgent::new();
        agent.require_login("777", Some("right"));
        let (bridge, mut rx) = prompt_channel();
        tokio::spawn(async move {
            while let Some(req) = rx.recv().await {
                match req.kind {
                    SecretKind::LoginCode => req.answer("777"),
                    SecretKind::Password => req.answer("right"),
                }
            }
        });
        let id = Identity::new("+1", 1, "h").with_secret("wrong");
        ensure_authorized(&agent, &id, &bridge, &CancellationToken::new())
            .await
            .unwrap();
        assert!(agent.authorized());
    }

    #[tokio::test]
    async fn test_no_answer_is_auth_error() {
        let agent = ScriptedAgent::new();
        agent.require_login("777", None);
        let (bridge, rx) = prompt_channel();
        drop(rx);
        let id = Identity::new("+1", 1, "h");
        let err = ensure_authorized(&agent, &id, &bridge, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FactoryError::Transport(TransportError::Auth(_))));
    }
}
