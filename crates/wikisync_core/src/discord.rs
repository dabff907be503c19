use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::header::HeaderMap;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::SyncConfig;

const CHANNEL_KIND_TEXT: u8 = 0;
const CHANNEL_KIND_FORUM: u8 = 15;

/// Discord caps message listing pages at 100 entries.
const MESSAGE_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Text,
    Forum,
    Other(u8),
}

impl ChannelKind {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            CHANNEL_KIND_TEXT => Self::Text,
            CHANNEL_KIND_FORUM => Self::Forum,
            other => Self::Other(other),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Forum => "forum",
            Self::Other(_) => "unsupported",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteChannel {
    pub id: String,
    pub name: String,
    pub kind: ChannelKind,
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteMessage {
    pub id: String,
    pub author_id: String,
    pub content: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteThread {
    pub id: String,
    pub name: String,
    pub owner_id: Option<String>,
    pub parent_id: Option<String>,
}

/// The seam between the reconcilers and the chat platform. Implementations
/// issue strictly sequential network calls; the trait carries no batching
/// or concurrency semantics.
pub trait ChannelApi {
    /// Identity of the automated account; cached after the first call.
    fn current_user_id(&mut self) -> Result<String>;
    /// Direct id lookup. `Ok(None)` when the id does not resolve.
    fn fetch_channel(&mut self, channel_id: &str) -> Result<Option<RemoteChannel>>;
    fn guild_channels(&mut self, guild_id: &str) -> Result<Vec<RemoteChannel>>;
    /// Full message listing for a channel, paginated internally. No order
    /// is guaranteed; callers sort by creation time.
    fn channel_messages(&mut self, channel_id: &str) -> Result<Vec<RemoteMessage>>;
    fn create_message(&mut self, channel_id: &str, content: &str) -> Result<RemoteMessage>;
    fn edit_message(&mut self, channel_id: &str, message_id: &str, content: &str) -> Result<()>;
    fn delete_message(&mut self, channel_id: &str, message_id: &str) -> Result<()>;
    /// Every active thread in the guild; callers filter by parent channel.
    fn active_threads(&mut self, guild_id: &str) -> Result<Vec<RemoteThread>>;
    fn create_thread(&mut self, forum_id: &str, name: &str, content: &str)
    -> Result<RemoteThread>;
    fn delete_thread(&mut self, thread_id: &str) -> Result<()>;
    fn request_count(&self) -> usize;
}

#[derive(Debug, Clone)]
pub struct DiscordClientConfig {
    pub api_url: String,
    pub token: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl DiscordClientConfig {
    pub fn new(token: String, api_url: String, user_agent: String) -> Self {
        Self {
            api_url,
            token,
            user_agent,
            timeout_ms: env_value_u64("DISCORD_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("DISCORD_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("DISCORD_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("DISCORD_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("DISCORD_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("DISCORD_HTTP_RETRY_DELAY_MS", 500),
        }
    }

    pub fn from_config(config: &SyncConfig, token: String) -> Self {
        Self::new(token, config.api_url(), config.user_agent())
    }
}

/// REST client for the Discord API with per-call rate-limit spacing and a
/// bounded retry budget for retryable statuses. Internal retries are the
/// only ones anywhere in the system; callers never retry a failed call.
pub struct DiscordClient {
    client: Client,
    config: DiscordClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    current_user: Option<String>,
}

impl DiscordClient {
    pub fn new(config: DiscordClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .context("failed to build Discord HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            current_user: None,
        })
    }

    fn request_json(
        &mut self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        is_write: bool,
    ) -> Result<Option<Value>> {
        let url = format!("{}{}", self.config.api_url, path);
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            let mut request = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.config.token))
                .header("User-Agent", self.config.user_agent.clone());
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send() {
                Ok(response) => {
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS && attempt < max_retries {
                        let wait_ms = retry_after_ms(response.headers())
                            .unwrap_or(self.config.retry_delay_ms);
                        warn!(wait_ms, "Discord rate limit reached, waiting before retry");
                        sleep(Duration::from_millis(wait_ms));
                        continue;
                    }
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        let detail = api_error_detail(response);
                        bail!("Discord API request failed with HTTP {status}{detail}");
                    }
                    if status == StatusCode::NO_CONTENT {
                        return Ok(None);
                    }
                    let payload: Value = response
                        .json()
                        .context("failed to decode Discord API JSON response")?;
                    return Ok(Some(payload));
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).context("failed to call Discord API");
                }
            }
        }

        bail!("Discord API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        sleep(Duration::from_millis(
            base.saturating_mul(multiplier).saturating_add(jitter),
        ));
    }
}

impl ChannelApi for DiscordClient {
    fn current_user_id(&mut self) -> Result<String> {
        if let Some(id) = &self.current_user {
            return Ok(id.clone());
        }
        let payload = self
            .request_json(Method::GET, "/users/@me", None, false)?
            .ok_or_else(|| anyhow::anyhow!("empty response for current user"))?;
        let user: UserPayload =
            serde_json::from_value(payload).context("failed to decode current user response")?;
        self.current_user = Some(user.id.clone());
        Ok(user.id)
    }

    fn fetch_channel(&mut self, channel_id: &str) -> Result<Option<RemoteChannel>> {
        let path = format!("/channels/{channel_id}");
        match self.request_json(Method::GET, &path, None, false) {
            Ok(Some(payload)) => {
                let channel: ChannelPayload = serde_json::from_value(payload)
                    .context("failed to decode channel response")?;
                Ok(Some(channel.into_channel()))
            }
            Ok(None) => Ok(None),
            Err(error) if error.to_string().contains("HTTP 404") => Ok(None),
            Err(error) => Err(error),
        }
    }

    fn guild_channels(&mut self, guild_id: &str) -> Result<Vec<RemoteChannel>> {
        let path = format!("/guilds/{guild_id}/channels");
        let payload = self
            .request_json(Method::GET, &path, None, false)?
            .unwrap_or_else(|| Value::Array(Vec::new()));
        let channels: Vec<ChannelPayload> =
            serde_json::from_value(payload).context("failed to decode guild channel list")?;
        Ok(channels
            .into_iter()
            .map(ChannelPayload::into_channel)
            .collect())
    }

    fn channel_messages(&mut self, channel_id: &str) -> Result<Vec<RemoteMessage>> {
        let mut messages = Vec::new();
        let mut before: Option<String> = None;

        loop {
            let path = match &before {
                Some(id) => {
                    format!("/channels/{channel_id}/messages?limit={MESSAGE_PAGE_SIZE}&before={id}")
                }
                None => format!("/channels/{channel_id}/messages?limit={MESSAGE_PAGE_SIZE}"),
            };
            let payload = self
                .request_json(Method::GET, &path, None, false)?
                .unwrap_or_else(|| Value::Array(Vec::new()));
            let batch: Vec<MessagePayload> =
                serde_json::from_value(payload).context("failed to decode channel message list")?;
            if batch.is_empty() {
                break;
            }
            let fetched = batch.len();
            // Pages run newest to oldest; the last entry anchors the next page.
            before = batch.last().map(|message| message.id.clone());
            messages.extend(batch.into_iter().map(MessagePayload::into_message));
            if fetched < MESSAGE_PAGE_SIZE {
                break;
            }
        }

        Ok(messages)
    }

    fn create_message(&mut self, channel_id: &str, content: &str) -> Result<RemoteMessage> {
        debug!(channel_id = %channel_id, "creating message");
        let path = format!("/channels/{channel_id}/messages");
        let body = json!({ "content": content });
        let payload = self
            .request_json(Method::POST, &path, Some(&body), true)?
            .ok_or_else(|| anyhow::anyhow!("empty response for created message"))?;
        let message: MessagePayload =
            serde_json::from_value(payload).context("failed to decode created message")?;
        Ok(message.into_message())
    }

    fn edit_message(&mut self, channel_id: &str, message_id: &str, content: &str) -> Result<()> {
        debug!(channel_id = %channel_id, message_id = %message_id, "editing message");
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        let body = json!({ "content": content });
        self.request_json(Method::PATCH, &path, Some(&body), true)?;
        Ok(())
    }

    fn delete_message(&mut self, channel_id: &str, message_id: &str) -> Result<()> {
        debug!(channel_id = %channel_id, message_id = %message_id, "deleting message");
        let path = format!("/channels/{channel_id}/messages/{message_id}");
        self.request_json(Method::DELETE, &path, None, true)?;
        Ok(())
    }

    fn active_threads(&mut self, guild_id: &str) -> Result<Vec<RemoteThread>> {
        let path = format!("/guilds/{guild_id}/threads/active");
        let payload = self
            .request_json(Method::GET, &path, None, false)?
            .unwrap_or_else(|| json!({ "threads": [] }));
        let parsed: ActiveThreadsPayload =
            serde_json::from_value(payload).context("failed to decode active thread list")?;
        Ok(parsed
            .threads
            .into_iter()
            .map(ThreadPayload::into_thread)
            .collect())
    }

    fn create_thread(
        &mut self,
        forum_id: &str,
        name: &str,
        content: &str,
    ) -> Result<RemoteThread> {
        debug!(forum_id = %forum_id, thread = %name, "creating thread");
        let path = format!("/channels/{forum_id}/threads");
        let body = json!({
            "name": name,
            "message": { "content": content },
        });
        let payload = self
            .request_json(Method::POST, &path, Some(&body), true)?
            .ok_or_else(|| anyhow::anyhow!("empty response for created thread"))?;
        let thread: ThreadPayload =
            serde_json::from_value(payload).context("failed to decode created thread")?;
        Ok(thread.into_thread())
    }

    fn delete_thread(&mut self, thread_id: &str) -> Result<()> {
        debug!(thread_id = %thread_id, "deleting thread");
        let path = format!("/channels/{thread_id}");
        self.request_json(Method::DELETE, &path, None, true)?;
        Ok(())
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

fn retry_after_ms(headers: &HeaderMap) -> Option<u64> {
    let value = headers.get("Retry-After")?.to_str().ok()?;
    let seconds: f64 = value.trim().parse().ok()?;
    if seconds.is_sign_negative() {
        return None;
    }
    Some((seconds * 1000.0) as u64)
}

fn api_error_detail(response: reqwest::blocking::Response) -> String {
    let Ok(payload) = response.json::<Value>() else {
        return String::new();
    };
    let message = payload
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error");
    match payload.get("code").and_then(Value::as_i64) {
        Some(code) => format!(" [{code}]: {message}"),
        None => format!(": {message}"),
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

#[derive(Debug, Deserialize)]
struct UserPayload {
    id: String,
}

#[derive(Debug, Deserialize)]
struct ChannelPayload {
    id: String,
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    guild_id: Option<String>,
}

impl ChannelPayload {
    fn into_channel(self) -> RemoteChannel {
        RemoteChannel {
            id: self.id,
            name: self.name.unwrap_or_default(),
            kind: ChannelKind::from_raw(self.kind),
            guild_id: self.guild_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagePayload {
    id: String,
    #[serde(default)]
    content: String,
    timestamp: String,
    author: UserPayload,
}

impl MessagePayload {
    fn into_message(self) -> RemoteMessage {
        RemoteMessage {
            id: self.id,
            author_id: self.author.id,
            content: self.content,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActiveThreadsPayload {
    #[serde(default)]
    threads: Vec<ThreadPayload>,
}

#[derive(Debug, Deserialize)]
struct ThreadPayload {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    owner_id: Option<String>,
    #[serde(default)]
    parent_id: Option<String>,
}

impl ThreadPayload {
    fn into_thread(self) -> RemoteThread {
        RemoteThread {
            id: self.id,
            name: self.name.unwrap_or_default(),
            owner_id: self.owner_id,
            parent_id: self.parent_id,
        }
    }
}

/// In-memory [`ChannelApi`] double shared by the reconciler and walker
/// tests. Ids and timestamps are allocated monotonically so creation
/// order matches the ordering contract of the real platform.
#[cfg(test)]
pub(crate) mod testing {
    use std::collections::{BTreeMap, BTreeSet};

    use anyhow::{Result, bail};

    use super::{ChannelApi, ChannelKind, RemoteChannel, RemoteMessage, RemoteThread};

    #[derive(Default)]
    pub struct MockApi {
        pub bot_id: String,
        pub channels: Vec<RemoteChannel>,
        pub messages: BTreeMap<String, Vec<RemoteMessage>>,
        pub threads: Vec<RemoteThread>,
        pub fail_channel_fetch: bool,
        pub fail_message_edits: BTreeSet<String>,
        pub fail_message_deletes: BTreeSet<String>,
        pub fail_thread_deletes: BTreeSet<String>,
        pub fail_thread_creates: BTreeSet<String>,
        pub fail_creates_remaining: usize,
        next_id: u64,
        request_count: usize,
    }

    impl MockApi {
        pub fn new(bot_id: &str) -> Self {
            Self {
                bot_id: bot_id.to_string(),
                ..Default::default()
            }
        }

        pub fn add_channel(&mut self, id: &str, name: &str, guild_id: &str, kind: ChannelKind) {
            self.channels.push(RemoteChannel {
                id: id.to_string(),
                name: name.to_string(),
                kind,
                guild_id: Some(guild_id.to_string()),
            });
        }

        pub fn add_message(&mut self, channel_id: &str, author_id: &str, content: &str) -> String {
            let id = self.allocate_id();
            let timestamp = self.current_timestamp();
            self.messages
                .entry(channel_id.to_string())
                .or_default()
                .push(RemoteMessage {
                    id: id.clone(),
                    author_id: author_id.to_string(),
                    content: content.to_string(),
                    timestamp,
                });
            id
        }

        pub fn add_message_at(
            &mut self,
            channel_id: &str,
            author_id: &str,
            content: &str,
            timestamp: &str,
        ) -> String {
            let id = self.allocate_id();
            self.messages
                .entry(channel_id.to_string())
                .or_default()
                .push(RemoteMessage {
                    id: id.clone(),
                    author_id: author_id.to_string(),
                    content: content.to_string(),
                    timestamp: timestamp.to_string(),
                });
            id
        }

        pub fn add_thread(&mut self, id: &str, name: &str, owner_id: &str, parent_id: &str) {
            self.threads.push(RemoteThread {
                id: id.to_string(),
                name: name.to_string(),
                owner_id: Some(owner_id.to_string()),
                parent_id: Some(parent_id.to_string()),
            });
        }

        pub fn channel_contents(&self, channel_id: &str) -> Vec<String> {
            self.messages
                .get(channel_id)
                .map(|messages| {
                    messages
                        .iter()
                        .map(|message| message.content.clone())
                        .collect()
                })
                .unwrap_or_default()
        }

        pub fn thread_named(&self, name: &str) -> Option<&RemoteThread> {
            self.threads.iter().find(|thread| thread.name == name)
        }

        fn allocate_id(&mut self) -> String {
            self.next_id += 1;
            format!("{}", 1_000 + self.next_id)
        }

        fn current_timestamp(&self) -> String {
            format!("2026-03-01T00:00:00.{:06}Z", self.next_id)
        }
    }

    impl ChannelApi for MockApi {
        fn current_user_id(&mut self) -> Result<String> {
            self.request_count += 1;
            Ok(self.bot_id.clone())
        }

        fn fetch_channel(&mut self, channel_id: &str) -> Result<Option<RemoteChannel>> {
            self.request_count += 1;
            if self.fail_channel_fetch {
                bail!("channel fetch rejected");
            }
            Ok(self
                .channels
                .iter()
                .find(|channel| channel.id == channel_id)
                .cloned())
        }

        fn guild_channels(&mut self, guild_id: &str) -> Result<Vec<RemoteChannel>> {
            self.request_count += 1;
            Ok(self
                .channels
                .iter()
                .filter(|channel| channel.guild_id.as_deref() == Some(guild_id))
                .cloned()
                .collect())
        }

        fn channel_messages(&mut self, channel_id: &str) -> Result<Vec<RemoteMessage>> {
            self.request_count += 1;
            Ok(self.messages.get(channel_id).cloned().unwrap_or_default())
        }

        fn create_message(&mut self, channel_id: &str, content: &str) -> Result<RemoteMessage> {
            self.request_count += 1;
            if self.fail_creates_remaining > 0 {
                self.fail_creates_remaining -= 1;
                bail!("message create rejected");
            }
            let bot_id = self.bot_id.clone();
            let id = self.add_message(channel_id, &bot_id, content);
            let message = self
                .messages
                .get(channel_id)
                .and_then(|messages| messages.iter().find(|message| message.id == id))
                .cloned();
            match message {
                Some(message) => Ok(message),
                None => bail!("created message not stored"),
            }
        }

        fn edit_message(
            &mut self,
            channel_id: &str,
            message_id: &str,
            content: &str,
        ) -> Result<()> {
            self.request_count += 1;
            if self.fail_message_edits.contains(message_id) {
                bail!("message edit rejected");
            }
            let Some(message) = self
                .messages
                .get_mut(channel_id)
                .and_then(|messages| messages.iter_mut().find(|message| message.id == message_id))
            else {
                bail!("no such message {message_id}");
            };
            message.content = content.to_string();
            Ok(())
        }

        fn delete_message(&mut self, channel_id: &str, message_id: &str) -> Result<()> {
            self.request_count += 1;
            if self.fail_message_deletes.contains(message_id) {
                bail!("message delete rejected");
            }
            let Some(messages) = self.messages.get_mut(channel_id) else {
                bail!("no such channel {channel_id}");
            };
            let before = messages.len();
            messages.retain(|message| message.id != message_id);
            if messages.len() == before {
                bail!("no such message {message_id}");
            }
            Ok(())
        }

        fn active_threads(&mut self, _guild_id: &str) -> Result<Vec<RemoteThread>> {
            self.request_count += 1;
            Ok(self.threads.clone())
        }

        fn create_thread(
            &mut self,
            forum_id: &str,
            name: &str,
            content: &str,
        ) -> Result<RemoteThread> {
            self.request_count += 1;
            if self.fail_thread_creates.contains(name) {
                bail!("thread create rejected");
            }
            let id = self.allocate_id();
            let thread = RemoteThread {
                id: id.clone(),
                name: name.to_string(),
                owner_id: Some(self.bot_id.clone()),
                parent_id: Some(forum_id.to_string()),
            };
            self.threads.push(thread.clone());
            let bot_id = self.bot_id.clone();
            self.add_message(&id, &bot_id, content);
            Ok(thread)
        }

        fn delete_thread(&mut self, thread_id: &str) -> Result<()> {
            self.request_count += 1;
            if self.fail_thread_deletes.contains(thread_id) {
                bail!("thread delete rejected");
            }
            let before = self.threads.len();
            self.threads.retain(|thread| thread.id != thread_id);
            if self.threads.len() == before {
                bail!("no such thread {thread_id}");
            }
            self.messages.remove(thread_id);
            Ok(())
        }

        fn request_count(&self) -> usize {
            self.request_count
        }
    }
}
