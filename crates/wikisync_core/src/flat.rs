use tracing::{debug, warn};

use crate::discord::{ChannelApi, RemoteChannel, RemoteMessage};
use crate::filesystem::LocalDocument;
use crate::report::{FlatReport, ItemAction, ItemResult, SyncOptions};

/// Select the bot-authored subsequence of a channel's messages, ordered by
/// creation time ascending. Storage order is irrelevant; only the creation
/// timestamp (with the numeric id as tiebreaker) defines positions.
pub fn bot_messages(messages: &[RemoteMessage], bot_user_id: &str) -> Vec<RemoteMessage> {
    let mut selected: Vec<RemoteMessage> = messages
        .iter()
        .filter(|message| message.author_id == bot_user_id)
        .cloned()
        .collect();
    selected.sort_by(|left, right| {
        left.timestamp
            .cmp(&right.timestamp)
            .then_with(|| snowflake_value(&left.id).cmp(&snowflake_value(&right.id)))
    });
    selected
}

/// Force the channel's bot-authored message sequence to mirror the local
/// documents position-for-position.
///
/// Preconditions: `documents` sorted by file name, `bot_messages` the full
/// bot-authored subsequence sorted by creation time ascending.
///
/// Excess messages (positions `[P, M)`) are deleted; missing positions are
/// created in ascending order so platform creation order matches local
/// order; then every position is overwritten with the document's current
/// content, without any equality check. A failed call is recorded and the
/// loop continues; the next run repairs whatever was left behind.
pub fn reconcile_flat<A: ChannelApi>(
    api: &mut A,
    channel: &RemoteChannel,
    bot_messages: &[RemoteMessage],
    documents: &[LocalDocument],
    options: &SyncOptions,
) -> FlatReport {
    let mut report = FlatReport::default();
    let have = bot_messages.len();
    let want = documents.len();

    if options.dry_run {
        plan_flat(&mut report, bot_messages, documents);
        return report;
    }

    let mut tracked: Vec<RemoteMessage> = bot_messages.to_vec();

    if have > want {
        debug!(
            channel = %channel.name,
            excess = have - want,
            "deleting excess messages"
        );
        for message in &bot_messages[want..] {
            match api.delete_message(&channel.id, &message.id) {
                Ok(()) => {
                    report.deleted += 1;
                    report
                        .items
                        .push(ItemResult::applied(&message.id, ItemAction::Delete));
                }
                Err(error) => {
                    warn!(
                        channel = %channel.name,
                        message_id = %message.id,
                        error = %error,
                        "failed to delete message"
                    );
                    report
                        .errors
                        .push(format!("delete {}: {error:#}", message.id));
                    report.items.push(ItemResult::failed(
                        &message.id,
                        ItemAction::Delete,
                        format!("{error:#}"),
                    ));
                }
            }
        }
        tracked.truncate(want);
    } else if have < want {
        debug!(
            channel = %channel.name,
            missing = want - have,
            "creating missing messages"
        );
        for document in &documents[have..] {
            let content = match document.content() {
                Ok(content) => content,
                Err(error) => {
                    report
                        .errors
                        .push(format!("{}: {error:#}", document.file_name()));
                    report.items.push(ItemResult::failed(
                        document.file_name(),
                        ItemAction::Create,
                        format!("{error:#}"),
                    ));
                    continue;
                }
            };
            match api.create_message(&channel.id, content) {
                Ok(message) => {
                    report.created += 1;
                    report
                        .items
                        .push(ItemResult::applied(document.file_name(), ItemAction::Create));
                    tracked.push(message);
                }
                Err(error) => {
                    warn!(
                        channel = %channel.name,
                        document = %document.file_name(),
                        error = %error,
                        "failed to create message"
                    );
                    report
                        .errors
                        .push(format!("create {}: {error:#}", document.file_name()));
                    report.items.push(ItemResult::failed(
                        document.file_name(),
                        ItemAction::Create,
                        format!("{error:#}"),
                    ));
                }
            }
        }
    }

    // Content pass: rewrite every position, pairing documents with the
    // tracked sequence. An unpaired position (a create failed above) is
    // repaired by a fresh create.
    for (position, document) in documents.iter().enumerate() {
        let content = match document.content() {
            Ok(content) => content,
            Err(error) => {
                report
                    .errors
                    .push(format!("{}: {error:#}", document.file_name()));
                report.items.push(ItemResult::failed(
                    document.file_name(),
                    ItemAction::Edit,
                    format!("{error:#}"),
                ));
                continue;
            }
        };
        let paired = tracked.get(position).cloned();
        match paired {
            Some(message) => match api.edit_message(&channel.id, &message.id, content) {
                Ok(()) => {
                    report.edited += 1;
                    report
                        .items
                        .push(ItemResult::applied(document.file_name(), ItemAction::Edit));
                }
                Err(error) => {
                    warn!(
                        channel = %channel.name,
                        document = %document.file_name(),
                        error = %error,
                        "failed to edit message"
                    );
                    report
                        .errors
                        .push(format!("edit {}: {error:#}", document.file_name()));
                    report.items.push(ItemResult::failed(
                        document.file_name(),
                        ItemAction::Edit,
                        format!("{error:#}"),
                    ));
                }
            },
            None => match api.create_message(&channel.id, content) {
                Ok(message) => {
                    report.created += 1;
                    report
                        .items
                        .push(ItemResult::applied(document.file_name(), ItemAction::Create));
                    tracked.push(message);
                }
                Err(error) => {
                    report
                        .errors
                        .push(format!("create {}: {error:#}", document.file_name()));
                    report.items.push(ItemResult::failed(
                        document.file_name(),
                        ItemAction::Create,
                        format!("{error:#}"),
                    ));
                }
            },
        }
    }

    report
}

/// Dry-run plan: deletions for `[P, M)`, creations for `[M, P)`, edits for
/// the overlap. The live run's redundant re-edit of freshly created
/// messages is omitted from the plan.
fn plan_flat(report: &mut FlatReport, bot_messages: &[RemoteMessage], documents: &[LocalDocument]) {
    let have = bot_messages.len();
    let want = documents.len();

    for message in bot_messages.iter().skip(want) {
        report
            .items
            .push(ItemResult::planned(&message.id, ItemAction::Delete));
    }
    for document in documents.iter().skip(have) {
        report
            .items
            .push(ItemResult::planned(document.file_name(), ItemAction::Create));
    }
    for document in documents.iter().take(have.min(want)) {
        report
            .items
            .push(ItemResult::planned(document.file_name(), ItemAction::Edit));
    }
}

fn snowflake_value(id: &str) -> u64 {
    id.parse().unwrap_or(0)
}
