use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use wikisync_core::discord::{DiscordClient, DiscordClientConfig};
use wikisync_core::report::{
    FlatReport, FolderOutcome, ForumReport, ItemResult, RunReport, SyncOptions,
};
use wikisync_core::runtime::{RuntimeOverrides, ensure_root_ready, resolve_runtime};
use wikisync_core::walk::run_walk;

#[derive(Debug, Parser)]
#[command(
    name = "wikisync",
    version,
    about = "Mirror a wiki folder tree onto Discord channels and forum threads"
)]
struct Cli {
    #[arg(
        short = 't',
        long,
        value_name = "TOKEN",
        help = "Bot token (or DISCORD_TOKEN / config)"
    )]
    token: Option<String>,

    #[arg(
        short = 'g',
        long,
        value_name = "ID",
        help = "Guild/server id (or DISCORD_GUILD_ID / config)"
    )]
    guild_id: Option<String>,

    #[arg(
        short = 'r',
        long,
        value_name = "PATH",
        help = "Wiki root folder (default ./wiki)"
    )]
    root: Option<PathBuf>,

    #[arg(long, value_name = "PATH", help = "Config file (default ./wikisync.toml)")]
    config: Option<PathBuf>,

    #[arg(long, help = "Plan operations without touching the remote platform")]
    dry_run: bool,

    #[arg(long, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let runtime = resolve_runtime(&RuntimeOverrides {
        root: cli.root.clone(),
        config: cli.config.clone(),
    })?;

    let Some(token) = cli.token.clone().or_else(|| runtime.config.token()) else {
        bail!("a bot token is required (--token, DISCORD_TOKEN, or [discord] token)");
    };
    let Some(guild_id) = cli.guild_id.clone().or_else(|| runtime.config.guild_id()) else {
        bail!("a guild id is required (--guild-id, DISCORD_GUILD_ID, or [discord] guild_id)");
    };

    if cli.diagnostics {
        println!("[diagnostics]\n{}", runtime.diagnostics());
    }

    ensure_root_ready(&runtime.root)?;

    let mut client = DiscordClient::new(DiscordClientConfig::from_config(&runtime.config, token))?;
    info!(
        guild_id = %guild_id,
        root = %runtime.root.display(),
        dry_run = cli.dry_run,
        "starting wiki sync"
    );
    let options = SyncOptions {
        dry_run: cli.dry_run,
    };
    let report = run_walk(&mut client, &guild_id, &runtime.root, &options)?;

    render_report(&report, &guild_id, &runtime.root);

    if !report.success {
        bail!(
            "run completed with {} failed item(s) and {} skipped folder(s)",
            report.failed_items,
            report.folders_skipped
        );
    }
    Ok(())
}

fn render_report(report: &RunReport, guild_id: &str, root: &std::path::Path) {
    println!("wiki sync");
    println!("guild_id: {guild_id}");
    println!("root: {}", root.display());
    println!("dry_run: {}", report.dry_run);

    for folder in &report.folders {
        match &folder.outcome {
            FolderOutcome::Flat(flat) => {
                print_flat(&folder.folder, flat);
            }
            FolderOutcome::Forum(forum) => {
                print_forum(&folder.folder, forum);
            }
            FolderOutcome::Skipped { reason } => {
                println!("{}: skipped ({reason})", folder.folder);
            }
        }
    }

    println!("folders_processed: {}", report.folders_processed);
    println!("folders_skipped: {}", report.folders_skipped);
    println!("failed_items: {}", report.failed_items);
    println!("request_count: {}", report.request_count);
}

fn print_flat(folder: &str, report: &FlatReport) {
    println!(
        "{folder}: flat channel (created {}, edited {}, deleted {})",
        report.created, report.edited, report.deleted
    );
    print_items(&report.items);
}

fn print_forum(folder: &str, report: &ForumReport) {
    println!(
        "{folder}: forum channel (threads deleted {}, threads created {}, replies {})",
        report.threads_deleted, report.threads_created, report.replies_posted
    );
    print_items(&report.items);
}

fn print_items(items: &[ItemResult]) {
    for item in items {
        match &item.detail {
            Some(detail) => println!(
                "  - {}: {} {} ({detail})",
                item.name,
                item.action.as_str(),
                item.status.as_str()
            ),
            None => println!(
                "  - {}: {} {}",
                item.name,
                item.action.as_str(),
                item.status.as_str()
            ),
        }
    }
}
