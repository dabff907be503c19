use anyhow::{Context, Result};
use tracing::debug;

use crate::discord::{ChannelApi, ChannelKind, RemoteChannel};

/// A resolved remote target, classified once so the reconcilers can
/// pattern-match instead of probing channel attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelTarget {
    Flat(RemoteChannel),
    Forum(RemoteChannel),
    Unsupported(RemoteChannel),
}

impl From<RemoteChannel> for ChannelTarget {
    fn from(channel: RemoteChannel) -> Self {
        match channel.kind {
            ChannelKind::Text => Self::Flat(channel),
            ChannelKind::Forum => Self::Forum(channel),
            ChannelKind::Other(_) => Self::Unsupported(channel),
        }
    }
}

impl ChannelTarget {
    pub fn channel(&self) -> &RemoteChannel {
        match self {
            Self::Flat(channel) | Self::Forum(channel) | Self::Unsupported(channel) => channel,
        }
    }
}

/// Split a folder name on its last underscore into a display name and a
/// candidate remote id suffix.
pub fn split_folder_name(folder_name: &str) -> (&str, Option<&str>) {
    match folder_name.rsplit_once('_') {
        Some((prefix, suffix)) if !prefix.is_empty() && !suffix.is_empty() => {
            (prefix, Some(suffix))
        }
        _ => (folder_name, None),
    }
}

/// Resolve a folder name to a remote channel.
///
/// The id suffix is tried first; a hit is accepted whatever its kind (the
/// caller decides what to do with a mismatch). Id lookup failures are
/// treated as absent, never propagated; the display name is then searched
/// within the guild, restricted to `want`. `Ok(None)` means not found.
pub fn resolve_channel<A: ChannelApi>(
    api: &mut A,
    guild_id: &str,
    folder_name: &str,
    want: ChannelKind,
) -> Result<Option<ChannelTarget>> {
    let (display_name, candidate_id) = split_folder_name(folder_name);

    if let Some(id) = candidate_id {
        match api.fetch_channel(id) {
            Ok(Some(channel)) => {
                debug!(folder = %folder_name, channel_id = %channel.id, "resolved channel by id");
                return Ok(Some(ChannelTarget::from(channel)));
            }
            Ok(None) => {}
            Err(error) => {
                debug!(
                    folder = %folder_name,
                    error = %error,
                    "channel id lookup failed, falling back to name search"
                );
            }
        }
    }

    let channels = api
        .guild_channels(guild_id)
        .context("failed to list guild channels")?;
    let found = channels.into_iter().find(|channel| {
        channel.guild_id.as_deref() == Some(guild_id)
            && channel.name == display_name
            && channel.kind == want
    });
    if let Some(channel) = &found {
        debug!(folder = %folder_name, channel_id = %channel.id, "resolved channel by name");
    }
    Ok(found.map(ChannelTarget::from))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discord::testing::MockApi;

    const GUILD: &str = "guild-1";

    #[test]
    fn splits_on_last_underscore_only() {
        assert_eq!(split_folder_name("general_123"), ("general", Some("123")));
        assert_eq!(
            split_folder_name("dev_updates_456"),
            ("dev_updates", Some("456"))
        );
        assert_eq!(split_folder_name("general"), ("general", None));
        assert_eq!(split_folder_name("general_"), ("general_", None));
        assert_eq!(split_folder_name("_123"), ("_123", None));
    }

    #[test]
    fn resolves_by_id_suffix() {
        let mut api = MockApi::new("bot");
        api.add_channel("555", "whatever", GUILD, ChannelKind::Text);

        let target = resolve_channel(&mut api, GUILD, "general_555", ChannelKind::Text)
            .expect("resolve")
            .expect("target");
        assert_eq!(target.channel().id, "555");
        assert!(matches!(target, ChannelTarget::Flat(_)));
    }

    #[test]
    fn id_hit_is_accepted_regardless_of_kind() {
        let mut api = MockApi::new("bot");
        api.add_channel("555", "faq", GUILD, ChannelKind::Forum);

        let target = resolve_channel(&mut api, GUILD, "general_555", ChannelKind::Text)
            .expect("resolve")
            .expect("target");
        assert!(matches!(target, ChannelTarget::Forum(_)));
    }

    #[test]
    fn falls_back_to_name_search_when_id_misses() {
        let mut api = MockApi::new("bot");
        api.add_channel("9", "general", GUILD, ChannelKind::Text);

        let target = resolve_channel(&mut api, GUILD, "general_000", ChannelKind::Text)
            .expect("resolve")
            .expect("target");
        assert_eq!(target.channel().id, "9");
    }

    #[test]
    fn id_lookup_error_is_treated_as_absent() {
        let mut api = MockApi::new("bot");
        api.fail_channel_fetch = true;
        api.add_channel("9", "general", GUILD, ChannelKind::Text);

        let target = resolve_channel(&mut api, GUILD, "general_000", ChannelKind::Text)
            .expect("resolve")
            .expect("target");
        assert_eq!(target.channel().id, "9");
    }

    #[test]
    fn name_search_respects_kind_predicate() {
        let mut api = MockApi::new("bot");
        api.add_channel("9", "faq", GUILD, ChannelKind::Text);
        api.add_channel("10", "faq", GUILD, ChannelKind::Forum);

        let target = resolve_channel(&mut api, GUILD, "faq", ChannelKind::Forum)
            .expect("resolve")
            .expect("target");
        assert_eq!(target.channel().id, "10");
        assert!(matches!(target, ChannelTarget::Forum(_)));
    }

    #[test]
    fn name_search_ignores_other_guilds() {
        let mut api = MockApi::new("bot");
        api.add_channel("9", "general", "other-guild", ChannelKind::Text);

        let target =
            resolve_channel(&mut api, GUILD, "general", ChannelKind::Text).expect("resolve");
        assert!(target.is_none());
    }

    #[test]
    fn unknown_folder_is_not_found() {
        let mut api = MockApi::new("bot");
        let target =
            resolve_channel(&mut api, GUILD, "missing", ChannelKind::Text).expect("resolve");
        assert!(target.is_none());
    }

    #[test]
    fn unsupported_kind_is_classified() {
        let mut api = MockApi::new("bot");
        api.add_channel("7", "voicey", GUILD, ChannelKind::Other(2));

        let target = resolve_channel(&mut api, GUILD, "voicey_7", ChannelKind::Text)
            .expect("resolve")
            .expect("target");
        assert!(matches!(target, ChannelTarget::Unsupported(_)));
    }
}
