//! BotFactory 管理入口：删除机器人、重置 Token、账本统计
//!
//! 用法：
//! - botfactory-admin delete [--config PATH] (--targets FILE | HANDLE...)
//! - botfactory-admin revoke [--config PATH] (--targets FILE | HANDLE...)
//! - botfactory-admin stats [--config PATH]
//!
//! `--targets` 文件每行 `handle:identity`；直接给用户名时从 Token 账本查找创建它的账号。

use std::path::PathBuf;

use anyhow::Context;
use botfactory::config::{load_config_or_default, AppConfig};
use botfactory::console::ConsoleSession;
use botfactory::provisioning::{parse_targets, AdminTarget};
use botfactory::storage::TokenLedger;
use botfactory::RunRequest;
use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "botfactory-admin", version, about = "删除机器人、重置 Token、账本统计")]
struct Cli {
    /// 配置文件路径（默认查找 config/default.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 删除机器人
    Delete(TargetArgs),
    /// 重置 Token 并写入 revoked 账本
    Revoke(TargetArgs),
    /// 按日期、标签统计 Token 账本
    Stats,
}

#[derive(Args, Debug)]
struct TargetArgs {
    /// 目标文件，每行 `handle:identity`
    #[arg(long, conflicts_with = "handles")]
    targets: Option<PathBuf>,

    /// 用户名；从 Token 账本查找创建它的账号
    #[arg(required_unless_present = "targets")]
    handles: Vec<String>,
}

fn ledger(cfg: &AppConfig) -> TokenLedger {
    TokenLedger::new(
        cfg.resolve(&cfg.paths.tokens_txt),
        cfg.resolve(&cfg.paths.tokens_csv),
    )
}

fn load_targets(cfg: &AppConfig, args: &TargetArgs) -> anyhow::Result<Vec<AdminTarget>> {
    match &args.targets {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read targets file {}", path.display()))?;
            Ok(parse_targets(&content))
        }
        None => ledger(cfg).targets_for(&args.handles),
    }
}

fn print_stats(cfg: &AppConfig) -> anyhow::Result<()> {
    let stats = ledger(cfg).stats().context("Failed to read token ledger")?;
    for (day, handles) in &stats.by_day {
        println!("{} ({}): {}", day, handles.len(), handles.join(", "));
    }
    for (label, count) in &stats.by_label {
        println!("label {}: {}", label, count);
    }
    if stats.missing_tokens > 0 {
        println!("rows without token: {}", stats.missing_tokens);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    botfactory::observability::init();

    let cli = Cli::parse();
    let cfg = load_config_or_default(cli.config);

    let request = match &cli.command {
        Command::Stats => return print_stats(&cfg),
        Command::Delete(args) => RunRequest::Delete {
            targets: load_targets(&cfg, args)?,
        },
        Command::Revoke(args) => RunRequest::Revoke {
            targets: load_targets(&cfg, args)?,
        },
    };

    let session = ConsoleSession::with_config(cfg)?;
    let report = session
        .orchestrator
        .run(request)
        .await
        .context("Failed to start admin run")?;
    let report = session.finish(report).await;

    for record in &report.revoked {
        println!("{},{}", record.handle, record.token);
    }
    if !report.failed_targets.is_empty() {
        anyhow::bail!("{} target(s) failed", report.failed_targets.len());
    }
    Ok(())
}
