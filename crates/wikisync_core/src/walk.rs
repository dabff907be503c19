use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::discord::{ChannelApi, ChannelKind};
use crate::filesystem::{ChannelFolder, FolderKind, list_channel_folders, list_documents, list_posts};
use crate::flat::{bot_messages, reconcile_flat};
use crate::forum::{bot_threads, reconcile_forum};
use crate::report::{FolderOutcome, FolderReport, RunReport, SyncOptions};
use crate::resolve::{ChannelTarget, resolve_channel};

/// Walk the wiki root once: classify every top-level folder, resolve its
/// remote channel, and reconcile it. Folders are processed strictly
/// sequentially; one bad folder never aborts the run.
pub fn run_walk<A: ChannelApi>(
    api: &mut A,
    guild_id: &str,
    root: &Path,
    options: &SyncOptions,
) -> Result<RunReport> {
    let bot_user_id = api
        .current_user_id()
        .context("failed to identify the bot account")?;
    let folders = list_channel_folders(root)?;

    let mut report = RunReport {
        dry_run: options.dry_run,
        ..Default::default()
    };

    for folder in &folders {
        info!(folder = %folder.name, kind = folder.kind.as_str(), "processing folder");
        let outcome = sync_folder(api, guild_id, &bot_user_id, folder, options);
        match &outcome {
            FolderOutcome::Skipped { reason } => {
                warn!(folder = %folder.name, reason = %reason, "skipping folder");
                report.folders_skipped += 1;
            }
            FolderOutcome::Flat(flat) => {
                report.folders_processed += 1;
                report.failed_items += flat.errors.len();
            }
            FolderOutcome::Forum(forum) => {
                report.folders_processed += 1;
                report.failed_items += forum.errors.len();
            }
        }
        report.folders.push(FolderReport {
            folder: folder.name.clone(),
            outcome,
        });
    }

    report.request_count = api.request_count();
    report.success = report.folders_skipped == 0 && report.failed_items == 0;
    Ok(report)
}

fn sync_folder<A: ChannelApi>(
    api: &mut A,
    guild_id: &str,
    bot_user_id: &str,
    folder: &ChannelFolder,
    options: &SyncOptions,
) -> FolderOutcome {
    let want = match folder.kind {
        FolderKind::Flat => ChannelKind::Text,
        FolderKind::Forum => ChannelKind::Forum,
    };

    let target = match resolve_channel(api, guild_id, &folder.name, want) {
        Ok(Some(target)) => target,
        Ok(None) => {
            return FolderOutcome::Skipped {
                reason: format!("no {} channel found", want.as_str()),
            };
        }
        Err(error) => {
            return FolderOutcome::Skipped {
                reason: format!("channel lookup failed: {error:#}"),
            };
        }
    };

    match (folder.kind, target) {
        (FolderKind::Flat, ChannelTarget::Flat(channel)) => {
            let documents = match list_documents(&folder.path) {
                Ok(documents) => documents,
                Err(error) => {
                    return FolderOutcome::Skipped {
                        reason: format!("failed to list documents: {error:#}"),
                    };
                }
            };
            let messages = match api.channel_messages(&channel.id) {
                Ok(messages) => messages,
                Err(error) => {
                    return FolderOutcome::Skipped {
                        reason: format!("failed to fetch channel messages: {error:#}"),
                    };
                }
            };
            let bots = bot_messages(&messages, bot_user_id);
            FolderOutcome::Flat(reconcile_flat(api, &channel, &bots, &documents, options))
        }
        (FolderKind::Forum, ChannelTarget::Forum(channel)) => {
            let posts = match list_posts(&folder.path) {
                Ok(posts) => posts,
                Err(error) => {
                    return FolderOutcome::Skipped {
                        reason: format!("failed to list posts: {error:#}"),
                    };
                }
            };
            let threads = match api.active_threads(guild_id) {
                Ok(threads) => threads,
                Err(error) => {
                    return FolderOutcome::Skipped {
                        reason: format!("failed to fetch active threads: {error:#}"),
                    };
                }
            };
            let bots = bot_threads(&threads, &channel.id, bot_user_id);
            FolderOutcome::Forum(reconcile_forum(api, &channel, &bots, &posts, options))
        }
        (_, target) => FolderOutcome::Skipped {
            reason: format!(
                "channel kind mismatch: wanted {}, found {}",
                want.as_str(),
                match target {
                    ChannelTarget::Flat(_) => "text",
                    ChannelTarget::Forum(_) => "forum",
                    ChannelTarget::Unsupported(_) => "unsupported",
                }
            ),
        },
    }
}
