use std::path::{Path, PathBuf};

use anyhow::{Result, bail};

use crate::config::{DEFAULT_WIKI_ROOT, SyncConfig, load_config};

pub const DEFAULT_CONFIG_FILENAME: &str = "wikisync.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueSource {
    Flag,
    Env,
    Config,
    Default,
}

impl ValueSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Flag => "flag",
            Self::Env => "env",
            Self::Config => "config",
            Self::Default => "default",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RuntimeOverrides {
    pub root: Option<PathBuf>,
    pub config: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct ResolvedRuntime {
    pub config: SyncConfig,
    pub config_path: PathBuf,
    pub config_source: ValueSource,
    pub root: PathBuf,
    pub root_source: ValueSource,
}

impl ResolvedRuntime {
    pub fn diagnostics(&self) -> String {
        format!(
            "root={} ({})\nconfig_path={} ({})\napi_url={}",
            normalize_for_display(&self.root),
            self.root_source.as_str(),
            normalize_for_display(&self.config_path),
            self.config_source.as_str(),
            self.config.api_url(),
        )
    }
}

/// Resolve the config file, load it, then resolve the wiki root against it.
///
/// Precedence for the root: flag > env WIKISYNC_ROOT > config > `./wiki`.
pub fn resolve_runtime(overrides: &RuntimeOverrides) -> Result<ResolvedRuntime> {
    let (config_path, config_source) = match &overrides.config {
        Some(path) => (path.clone(), ValueSource::Flag),
        None => (PathBuf::from(DEFAULT_CONFIG_FILENAME), ValueSource::Default),
    };
    let config = load_config(&config_path)?;

    let (root, root_source) = match &overrides.root {
        Some(path) => (path.clone(), ValueSource::Flag),
        None => match env_root() {
            Some(value) => (PathBuf::from(value), ValueSource::Env),
            None => match &config.sync.root {
                Some(value) => (PathBuf::from(value), ValueSource::Config),
                None => (PathBuf::from(DEFAULT_WIKI_ROOT), ValueSource::Default),
            },
        },
    };

    Ok(ResolvedRuntime {
        config,
        config_path,
        config_source,
        root,
        root_source,
    })
}

/// Startup check: a missing or non-directory root is fatal, the walk never starts.
pub fn ensure_root_ready(root: &Path) -> Result<()> {
    if !root.exists() {
        bail!("wiki root {} does not exist", root.display());
    }
    if !root.is_dir() {
        bail!("wiki root {} is not a directory", root.display());
    }
    Ok(())
}

fn env_root() -> Option<String> {
    let value = std::env::var("WIKISYNC_ROOT").ok()?;
    let trimmed = value.trim().to_string();
    if trimmed.is_empty() { None } else { Some(trimmed) }
}

fn normalize_for_display(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn value_source_labels() {
        assert_eq!(ValueSource::Flag.as_str(), "flag");
        assert_eq!(ValueSource::Env.as_str(), "env");
        assert_eq!(ValueSource::Config.as_str(), "config");
        assert_eq!(ValueSource::Default.as_str(), "default");
    }

    #[test]
    fn root_flag_wins_over_config() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(&config_path, "[sync]\nroot = \"./from-config\"\n").expect("write config");

        let runtime = resolve_runtime(&RuntimeOverrides {
            root: Some(PathBuf::from("./from-flag")),
            config: Some(config_path),
        })
        .expect("resolve runtime");

        assert_eq!(runtime.root, PathBuf::from("./from-flag"));
        assert_eq!(runtime.root_source, ValueSource::Flag);
        assert_eq!(runtime.config_source, ValueSource::Flag);
    }

    #[test]
    fn root_falls_back_to_config_then_default() {
        let temp = tempdir().expect("tempdir");
        let config_path = temp.path().join("wikisync.toml");
        fs::write(&config_path, "[sync]\nroot = \"./from-config\"\n").expect("write config");

        let runtime = resolve_runtime(&RuntimeOverrides {
            root: None,
            config: Some(config_path),
        })
        .expect("resolve runtime");
        assert_eq!(runtime.root, PathBuf::from("./from-config"));
        assert_eq!(runtime.root_source, ValueSource::Config);

        let runtime = resolve_runtime(&RuntimeOverrides {
            root: None,
            config: Some(temp.path().join("missing.toml")),
        })
        .expect("resolve runtime");
        assert_eq!(runtime.root, PathBuf::from(DEFAULT_WIKI_ROOT));
        assert_eq!(runtime.root_source, ValueSource::Default);
    }

    #[test]
    fn ensure_root_ready_rejects_missing_and_file_roots() {
        let temp = tempdir().expect("tempdir");
        let missing = temp.path().join("absent");
        let error = ensure_root_ready(&missing).expect_err("missing root must fail");
        assert!(error.to_string().contains("does not exist"));

        let file = temp.path().join("not-a-dir");
        fs::write(&file, "x").expect("write file");
        let error = ensure_root_ready(&file).expect_err("file root must fail");
        assert!(error.to_string().contains("not a directory"));
    }

    #[test]
    fn diagnostics_mentions_sources() {
        let temp = tempdir().expect("tempdir");
        let runtime = resolve_runtime(&RuntimeOverrides {
            root: Some(temp.path().join("wiki")),
            config: Some(temp.path().join("missing.toml")),
        })
        .expect("resolve runtime");
        let diagnostics = runtime.diagnostics();
        assert!(diagnostics.contains("root="));
        assert!(diagnostics.contains("(flag)"));
    }
}
