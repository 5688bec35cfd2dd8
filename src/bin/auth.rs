//! BotFactory 批量登录
//!
//! 逐个账号登录并向对话对象发 /start，结果写入状态表。
//!
//! 用法：botfactory-auth [--config PATH] [--only-errors]

use std::path::PathBuf;

use anyhow::Context;
use botfactory::console::ConsoleSession;
use botfactory::RunRequest;
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "botfactory-auth", version, about = "批量登录账号并记录状态")]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    /// 只处理状态表中不是 ok 的账号
    #[arg(long)]
    only_errors: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    botfactory::observability::init();

    let cli = Cli::parse();
    let session = ConsoleSession::start(cli.config)?;
    let report = session
        .orchestrator
        .run(RunRequest::Auth {
            only_errors: cli.only_errors,
        })
        .await
        .context("Failed to start auth run")?;
    let report = session.finish(report).await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
