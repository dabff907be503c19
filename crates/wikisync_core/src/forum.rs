use tracing::{debug, warn};

use crate::discord::{ChannelApi, RemoteChannel, RemoteThread};
use crate::filesystem::LocalPost;
use crate::report::{ForumReport, ItemAction, ItemResult, SyncOptions};

/// Select the threads of a forum channel that the bot owns. Threads owned
/// by anyone else survive every run untouched.
pub fn bot_threads(
    threads: &[RemoteThread],
    forum_id: &str,
    bot_user_id: &str,
) -> Vec<RemoteThread> {
    threads
        .iter()
        .filter(|thread| {
            thread.parent_id.as_deref() == Some(forum_id)
                && thread.owner_id.as_deref() == Some(bot_user_id)
        })
        .cloned()
        .collect()
}

/// Rebuild a forum channel's bot-owned threads from the local posts.
///
/// Thread identity and opener content are coupled on the platform, so this
/// never patches a thread in place: every bot-owned thread is deleted
/// unconditionally, then one thread per post folder is created with
/// document 0 as the opener and the remaining documents as replies, in
/// sorted order. Thread-level metadata (reactions, view counts) is lost on
/// every run; that is the accepted cost of the rebuild policy.
pub fn reconcile_forum<A: ChannelApi>(
    api: &mut A,
    forum: &RemoteChannel,
    bot_threads: &[RemoteThread],
    posts: &[LocalPost],
    options: &SyncOptions,
) -> ForumReport {
    let mut report = ForumReport::default();

    if options.dry_run {
        plan_forum(&mut report, bot_threads, posts);
        return report;
    }

    debug!(
        forum = %forum.name,
        threads = bot_threads.len(),
        "deleting bot-owned threads"
    );
    for thread in bot_threads {
        match api.delete_thread(&thread.id) {
            Ok(()) => {
                report.threads_deleted += 1;
                report
                    .items
                    .push(ItemResult::applied(&thread.name, ItemAction::DeleteThread));
            }
            Err(error) => {
                warn!(
                    forum = %forum.name,
                    thread = %thread.name,
                    error = %error,
                    "failed to delete thread"
                );
                report
                    .errors
                    .push(format!("delete thread {}: {error:#}", thread.name));
                report.items.push(ItemResult::failed(
                    &thread.name,
                    ItemAction::DeleteThread,
                    format!("{error:#}"),
                ));
            }
        }
    }

    for post in posts {
        let Some((opener, replies)) = post.documents.split_first() else {
            report
                .errors
                .push(format!("{}: post folder has no documents", post.name));
            report.items.push(ItemResult::failed(
                &post.name,
                ItemAction::CreateThread,
                "post folder has no documents",
            ));
            continue;
        };

        let content = match opener.content() {
            Ok(content) => content,
            Err(error) => {
                report.errors.push(format!("{}: {error:#}", post.name));
                report.items.push(ItemResult::failed(
                    &post.name,
                    ItemAction::CreateThread,
                    format!("{error:#}"),
                ));
                continue;
            }
        };

        debug!(forum = %forum.name, post = %post.name, "creating forum post");
        let thread = match api.create_thread(&forum.id, &post.name, content) {
            Ok(thread) => {
                report.threads_created += 1;
                report
                    .items
                    .push(ItemResult::applied(&post.name, ItemAction::CreateThread));
                thread
            }
            Err(error) => {
                warn!(
                    forum = %forum.name,
                    post = %post.name,
                    error = %error,
                    "failed to create thread"
                );
                report
                    .errors
                    .push(format!("create thread {}: {error:#}", post.name));
                report.items.push(ItemResult::failed(
                    &post.name,
                    ItemAction::CreateThread,
                    format!("{error:#}"),
                ));
                continue;
            }
        };

        for reply in replies {
            let item_name = format!("{}/{}", post.name, reply.file_name());
            let content = match reply.content() {
                Ok(content) => content,
                Err(error) => {
                    report.errors.push(format!("{item_name}: {error:#}"));
                    report.items.push(ItemResult::failed(
                        &item_name,
                        ItemAction::Reply,
                        format!("{error:#}"),
                    ));
                    continue;
                }
            };
            match api.create_message(&thread.id, content) {
                Ok(_) => {
                    report.replies_posted += 1;
                    report
                        .items
                        .push(ItemResult::applied(&item_name, ItemAction::Reply));
                }
                Err(error) => {
                    warn!(
                        forum = %forum.name,
                        reply = %item_name,
                        error = %error,
                        "failed to post reply"
                    );
                    report.errors.push(format!("reply {item_name}: {error:#}"));
                    report.items.push(ItemResult::failed(
                        &item_name,
                        ItemAction::Reply,
                        format!("{error:#}"),
                    ));
                }
            }
        }
    }

    report
}

fn plan_forum(report: &mut ForumReport, bot_threads: &[RemoteThread], posts: &[LocalPost]) {
    for thread in bot_threads {
        report
            .items
            .push(ItemResult::planned(&thread.name, ItemAction::DeleteThread));
    }
    for post in posts {
        if post.documents.is_empty() {
            report.items.push(ItemResult::failed(
                &post.name,
                ItemAction::CreateThread,
                "post folder has no documents",
            ));
            report
                .errors
                .push(format!("{}: post folder has no documents", post.name));
            continue;
        }
        report
            .items
            .push(ItemResult::planned(&post.name, ItemAction::CreateThread));
        for reply in post.documents.iter().skip(1) {
            report.items.push(ItemResult::planned(
                format!("{}/{}", post.name, reply.file_name()),
                ItemAction::Reply,
            ));
        }
    }
}
