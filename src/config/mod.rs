// src/config/mod.rs
//! Startup configuration: the watch settings file (TOML or JSON) plus a few
//! environment overrides, and the process settings that only come from env.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::ConfigError;
use crate::policy::CompletionPolicy;
use crate::probe::http::MatchMode;
use crate::probe::types::{SourceDescriptor, QUERY_PLACEHOLDER};
use crate::scheduler::{SchedulerCfg, DEFAULT_POLL_INTERVAL_SECS, MAX_POLL_INTERVAL_SECS};

pub const ENV_CONFIG_PATH: &str = "WATCH_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/watch.toml";
pub const DEFAULT_JSON_PATH: &str = "config/watch.json";

pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL_SECS";
pub const ENV_PER_SOURCE_TIMEOUT: &str = "PER_SOURCE_TIMEOUT_SECS";
pub const ENV_COMPLETION_POLICY: &str = "COMPLETION_POLICY";

pub const DEFAULT_PER_SOURCE_TIMEOUT_SECS: u64 = 10;
pub const MAX_PER_SOURCE_TIMEOUT_SECS: u64 = 300;
pub const DEFAULT_DELIVERY_TIMEOUT_SECS: u64 = 10;
pub const MAX_DELIVERY_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_DELIVERY_RETRIES: u8 = 3;
pub const DEFAULT_PORT: u16 = 10_000;

fn default_poll_interval() -> u64 {
    DEFAULT_POLL_INTERVAL_SECS
}
fn default_per_source_timeout() -> u64 {
    DEFAULT_PER_SOURCE_TIMEOUT_SECS
}
fn default_delivery_timeout() -> u64 {
    DEFAULT_DELIVERY_TIMEOUT_SECS
}
fn default_delivery_retries() -> u8 {
    DEFAULT_DELIVERY_RETRIES
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WatchConfig {
    #[serde(default = "default_poll_interval", alias = "poll_interval_seconds")]
    pub poll_interval_seconds: u64,
    #[serde(default, alias = "completion_policy")]
    pub completion_policy: CompletionPolicy,
    #[serde(default = "default_per_source_timeout", alias = "per_source_timeout_seconds")]
    pub per_source_timeout_seconds: u64,
    #[serde(default, alias = "match_mode")]
    pub match_mode: MatchMode,
    /// Probe once right away when a new watch is created.
    #[serde(default = "default_true", alias = "probe_on_watch")]
    pub probe_on_watch: bool,
    /// Per attempt, for Telegram and webhook sends.
    #[serde(default = "default_delivery_timeout", alias = "delivery_timeout_seconds")]
    pub delivery_timeout_seconds: u64,
    /// Attempts per message, including the first.
    #[serde(default = "default_delivery_retries", alias = "delivery_retries")]
    pub delivery_retries: u8,
    #[serde(default, alias = "user_agent")]
    pub user_agent: Option<String>,
    #[serde(default)]
    pub sources: Vec<SourceDescriptor>,
}

impl WatchConfig {
    /// Parse and validate one file; no environment overrides.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = Self::parse(&content, &ext)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load using env var + fallbacks, then apply env overrides:
    /// 1) $WATCH_CONFIG_PATH
    /// 2) config/watch.toml
    /// 3) config/watch.json
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::locate()?;
        tracing::info!(target: "config", path = %path.display(), "loading watch config");
        let mut cfg = Self::from_path(&path)?;
        cfg.apply_overrides(|k| std::env::var(k).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn locate() -> Result<PathBuf, ConfigError> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            return if pb.exists() {
                Ok(pb)
            } else {
                Err(ConfigError::NotFound(pb))
            };
        }
        [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH]
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
            .ok_or(ConfigError::Missing)
    }

    /// TOML when hinted by the extension, else JSON, else TOML as a last try.
    pub fn parse(s: &str, hint_ext: &str) -> Result<Self, ConfigError> {
        let try_toml_first = hint_ext == "toml";
        if try_toml_first {
            return toml::from_str(s).map_err(|e| ConfigError::Format(e.to_string()));
        }
        match serde_json::from_str(s) {
            Ok(cfg) => Ok(cfg),
            Err(json_err) => toml::from_str(s).map_err(|toml_err| {
                ConfigError::Format(format!("not JSON ({json_err}) nor TOML ({toml_err})"))
            }),
        }
    }

    /// Apply `POLL_INTERVAL_SECS`, `PER_SOURCE_TIMEOUT_SECS` and
    /// `COMPLETION_POLICY` from `get` (the process env in production).
    pub fn apply_overrides<F>(&mut self, get: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get(ENV_POLL_INTERVAL) {
            self.poll_interval_seconds = parse_secs(ENV_POLL_INTERVAL, &v)?;
        }
        if let Some(v) = get(ENV_PER_SOURCE_TIMEOUT) {
            self.per_source_timeout_seconds = parse_secs(ENV_PER_SOURCE_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_COMPLETION_POLICY) {
            self.completion_policy = v
                .parse()
                .map_err(|e: String| ConfigError::invalid(ENV_COMPLETION_POLICY, e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_POLL_INTERVAL_SECS).contains(&self.poll_interval_seconds) {
            return Err(ConfigError::invalid(
                "pollIntervalSeconds",
                format!("must be between 1 and {MAX_POLL_INTERVAL_SECS}"),
            ));
        }
        if !(1..=MAX_PER_SOURCE_TIMEOUT_SECS).contains(&self.per_source_timeout_seconds) {
            return Err(ConfigError::invalid(
                "perSourceTimeoutSeconds",
                format!("must be between 1 and {MAX_PER_SOURCE_TIMEOUT_SECS}"),
            ));
        }
        if !(1..=MAX_DELIVERY_TIMEOUT_SECS).contains(&self.delivery_timeout_seconds) {
            return Err(ConfigError::invalid(
                "deliveryTimeoutSeconds",
                format!("must be between 1 and {MAX_DELIVERY_TIMEOUT_SECS}"),
            ));
        }
        if self.delivery_retries == 0 {
            return Err(ConfigError::invalid("deliveryRetries", "must be > 0"));
        }
        if self.sources.is_empty() {
            return Err(ConfigError::invalid("sources", "at least one source is required"));
        }

        let mut names = HashSet::new();
        for (i, s) in self.sources.iter().enumerate() {
            let key = format!("sources[{i}]");
            let name = s.name.trim();
            if name.is_empty() {
                return Err(ConfigError::invalid(key, "name is empty"));
            }
            if !names.insert(name.to_lowercase()) {
                return Err(ConfigError::invalid(key, format!("duplicate source name `{name}`")));
            }
            let sample = s.url_template.replace(QUERY_PLACEHOLDER, "probe");
            let url = Url::parse(&sample)
                .map_err(|e| ConfigError::invalid(format!("{key}.urlTemplate"), e.to_string()))?;
            if !matches!(url.scheme(), "http" | "https") {
                return Err(ConfigError::invalid(
                    format!("{key}.urlTemplate"),
                    "must be an http(s) URL",
                ));
            }
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_seconds)
    }

    pub fn per_source_timeout(&self) -> Duration {
        Duration::from_secs(self.per_source_timeout_seconds)
    }

    pub fn scheduler_cfg(&self) -> SchedulerCfg {
        SchedulerCfg {
            interval: self.poll_interval(),
            policy: self.completion_policy,
        }
    }
}

fn parse_secs(key: &str, v: &str) -> Result<u64, ConfigError> {
    v.trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::invalid(key, e.to_string()))
}

/// Process-level settings; secrets never live in the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub bot_token: Option<String>,
    pub webhook_url: Option<String>,
    pub port: u16,
}

impl RuntimeSettings {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(get: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |k: &str| get(k).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let port = match non_empty("PORT") {
            Some(v) => v
                .parse::<u16>()
                .map_err(|e| ConfigError::invalid("PORT", e.to_string()))?,
            None => DEFAULT_PORT,
        };
        Ok(Self {
            bot_token: non_empty("BOT_TOKEN"),
            webhook_url: non_empty("NOTIFY_WEBHOOK_URL"),
            port,
        })
    }
}
