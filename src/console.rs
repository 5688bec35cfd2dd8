//! 命令行展示层：打印运行日志、从 stdin 回答验证码 / 密码提示
//!
//! 三个二进制共用：加载配置与账号、组装 Orchestrator、安装 Ctrl+C。

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{load_config_or_default, AppConfig};
use crate::conversation::{ScriptedAgentFactory, TransportFactory};
use crate::core::{install_signal_handlers, Orchestrator, RunReport};
use crate::identity::{load_accounts, prompt_channel, SecretKind, SecretRequest};
use crate::observability::{log_channel, RunLog};
use crate::storage::OverrideTable;

pub fn spawn_log_printer(mut rx: mpsc::UnboundedReceiver<RunLog>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            let _ = stdout.write_all(format!("{}\n", line).as_bytes()).await;
            let _ = stdout.flush().await;
        }
    })
}

/// 在独立线程上逐行读取 stdin；tokio 的 stdin 读取无法取消，放在线程里不会拖住运行时退出
fn spawn_stdin_lines() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

/// 逐个回答提示请求；输入关闭后丢弃后续请求（编排器侧得到 None）
pub async fn answer_prompts(
    mut requests: mpsc::Receiver<SecretRequest>,
    mut lines: mpsc::UnboundedReceiver<String>,
) {
    while let Some(request) = requests.recv().await {
        let what = match request.kind {
            SecretKind::LoginCode => "login code",
            SecretKind::Password => "password",
        };
        eprint!("Enter {} for {}: ", what, request.identity);
        let _ = std::io::stderr().flush();
        match lines.recv().await {
            Some(value) => request.answer(value),
            None => {
                tracing::warn!("stdin closed, cannot answer prompts");
                break;
            }
        }
    }
}

pub fn spawn_prompt_responder(rx: mpsc::Receiver<SecretRequest>) -> JoinHandle<()> {
    tokio::spawn(answer_prompts(rx, spawn_stdin_lines()))
}

/// 一个命令行会话：编排器 + 日志打印 + 提示应答
pub struct ConsoleSession {
    pub orchestrator: Arc<Orchestrator>,
    printer: JoinHandle<()>,
    responder: JoinHandle<()>,
}

impl ConsoleSession {
    pub fn start(config_path: Option<PathBuf>) -> anyhow::Result<Self> {
        let cfg = load_config_or_default(config_path);
        Self::with_config(cfg)
    }

    pub fn with_config(cfg: AppConfig) -> anyhow::Result<Self> {
        let accounts_path = cfg.resolve(&cfg.paths.accounts);
        let identities = load_accounts(&accounts_path)
            .with_context(|| format!("Failed to load accounts from {}", accounts_path.display()))?;
        let overrides = OverrideTable::load(&cfg.resolve(&cfg.paths.overrides));
        tracing::info!(
            identities = identities.len(),
            overrides = overrides.len(),
            data_dir = %cfg.data_dir().display(),
            "configuration loaded"
        );

        // 未链接真实传输时使用 Scripted 代理演练
        tracing::warn!("no live transport linked, running against the scripted agent");
        let factory: Arc<dyn TransportFactory> = Arc::new(ScriptedAgentFactory::new());

        let (events, log_rx) = log_channel();
        let (prompts, prompt_rx) = prompt_channel();
        let orchestrator = Orchestrator::new(cfg, identities, factory, prompts, events)
            .with_overrides(overrides);
        install_signal_handlers(&orchestrator.controller());

        Ok(Self {
            orchestrator: Arc::new(orchestrator),
            printer: spawn_log_printer(log_rx),
            responder: spawn_prompt_responder(prompt_rx),
        })
    }

    /// 等待日志全部打印后返回报告
    pub async fn finish(self, report: RunReport) -> RunReport {
        self.responder.abort();
        drop(self.orchestrator);
        let _ = self.printer.await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_prompt_is_answered_from_input_lines() {
        let (bridge, requests) = prompt_channel();
        let (lines_tx, lines) = mpsc::unbounded_channel();
        let responder = tokio::spawn(answer_prompts(requests, lines));
        lines_tx.send("12345".to_string()).unwrap();

        let value = bridge
            .ask("+1", SecretKind::LoginCode, &CancellationToken::new())
            .await;
        assert_eq!(value.as_deref(), Some("12345"));
        responder.abort();
    }

    #[tokio::test]
    async fn test_responder_waiting_for_input_can_be_aborted() {
        let (bridge, requests) = prompt_channel();
        let (_lines_tx, lines) = mpsc::unbounded_channel::<String>();
        let responder = tokio::spawn(answer_prompts(requests, lines));

        let asking = tokio::spawn(async move {
            bridge
                .ask("+1", SecretKind::Password, &CancellationToken::new())
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        responder.abort();
        let joined = tokio::time::timeout(std::time::Duration::from_secs(1), responder)
            .await
            .expect("responder did not stop");
        assert!(joined.unwrap_err().is_cancelled());
        assert_eq!(asking.await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_closed_input_drops_request() {
        let (bridge, requests) = prompt_channel();
        let (lines_tx, lines) = mpsc::unbounded_channel::<String>();
        drop(lines_tx);
        let responder = tokio::spawn(answer_prompts(requests, lines));

        let value = bridge
            .ask("+1", SecretKind::LoginCode, &CancellationToken::new())
            .await;
        assert!(value.is_none());
        responder.await.unwrap();
    }
}
