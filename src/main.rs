//! BotFactory 开通入口
//!
//! 用法：botfactory [--config PATH] [--label LABEL] NAME[/NAME...]

use std::path::PathBuf;

use anyhow::Context;
use botfactory::console::ConsoleSession;
use botfactory::core::RunOutcome;
use botfactory::provisioning::parse_task_names;
use botfactory::RunRequest;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "botfactory", version, about = "多账号轮转批量创建机器人")]
struct Cli {
    /// 配置文件路径（默认查找 config/default.toml）
    #[arg(long)]
    config: Option<PathBuf>,

    /// 写入账本的批次标签
    #[arg(long)]
    label: Option<String>,

    /// 基础名，可用空格或 `/` 分隔
    #[arg(required = true)]
    names: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    botfactory::observability::init();

    let cli = Cli::parse();
    let names = parse_task_names(&cli.names.join("/"));

    let mut cfg = botfactory::config::load_config_or_default(cli.config);
    if let Some(label) = cli.label {
        cfg.app.label = label;
    }

    let session = ConsoleSession::with_config(cfg)?;
    let report = session
        .orchestrator
        .run(RunRequest::Create { names })
        .await
        .context("Failed to start create run")?;
    let report = session.finish(report).await;

    if report.outcome == RunOutcome::Fatal {
        anyhow::bail!("create run failed to start");
    }
    Ok(())
}
