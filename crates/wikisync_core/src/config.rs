use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_URL: &str = "https://discord.com/api/v10";
pub const DEFAULT_USER_AGENT: &str = "wikisync/0.1";
pub const DEFAULT_WIKI_ROOT: &str = "./wiki";

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncConfig {
    #[serde(default)]
    pub discord: DiscordSection,
    #[serde(default)]
    pub sync: SyncSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DiscordSection {
    pub token: Option<String>,
    pub guild_id: Option<String>,
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct SyncSection {
    pub root: Option<String>,
}

impl SyncConfig {
    /// Resolve the bot token: env DISCORD_TOKEN > config > None.
    pub fn token(&self) -> Option<String> {
        env_override("DISCORD_TOKEN").or_else(|| self.discord.token.clone())
    }

    /// Resolve the guild id: env DISCORD_GUILD_ID > config > None.
    pub fn guild_id(&self) -> Option<String> {
        env_override("DISCORD_GUILD_ID").or_else(|| self.discord.guild_id.clone())
    }

    /// Resolve the REST API base URL: env DISCORD_API_URL > config > DEFAULT_API_URL.
    pub fn api_url(&self) -> String {
        env_override("DISCORD_API_URL")
            .or_else(|| self.discord.api_url.clone())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    /// Resolve user agent: env DISCORD_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("DISCORD_USER_AGENT")
            .or_else(|| self.discord.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

/// Load and parse a SyncConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<SyncConfig> {
    if !config_path.exists() {
        return Ok(SyncConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: SyncConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn default_config_has_no_credentials() {
        let config = SyncConfig::default();
        assert!(config.discord.token.is_none());
        assert!(config.discord.guild_id.is_none());
        assert!(config.sync.root.is_none());
    }

    #[test]
    fn load_config_returns_default_for_missing_file() {
        let config = load_config(Path::new("/nonexistent/wikisync.toml")).expect("load config");
        assert!(config.discord.token.is_none());
    }

    #[test]
    fn load_config_parses_sections() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(
            &config_path,
            r#"
[discord]
token = "bot-token"
guild_id = "123456789"
api_url = "http://localhost:9999/api/v10"
user_agent = "test-agent/1.0"

[sync]
root = "./content"
"#,
        )
        .expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert_eq!(config.discord.token.as_deref(), Some("bot-token"));
        assert_eq!(config.discord.guild_id.as_deref(), Some("123456789"));
        assert_eq!(
            config.discord.api_url.as_deref(),
            Some("http://localhost:9999/api/v10")
        );
        assert_eq!(config.discord.user_agent.as_deref(), Some("test-agent/1.0"));
        assert_eq!(config.sync.root.as_deref(), Some("./content"));
    }

    #[test]
    fn load_config_tolerates_partial_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(&config_path, "[sync]\nroot = \"./wiki\"\n").expect("write config");

        let config = load_config(&config_path).expect("load config");
        assert!(config.discord.token.is_none());
        assert_eq!(config.sync.root.as_deref(), Some("./wiki"));
    }

    #[test]
    fn load_config_returns_error_for_invalid_toml() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(&config_path, "[discord\ntoken = \"oops\"").expect("write config");
        let error = load_config(&config_path).expect_err("must fail");
        assert!(error.to_string().contains("failed to parse"));
    }

    #[test]
    fn default_api_url_without_overrides() {
        let config = SyncConfig::default();
        assert_eq!(config.api_url(), DEFAULT_API_URL);
    }

    #[test]
    fn config_api_url_wins_over_default() {
        let config = SyncConfig {
            discord: DiscordSection {
                api_url: Some("http://localhost:4000".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert_eq!(config.api_url(), "http://localhost:4000");
    }
}
