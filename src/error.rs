// src/error.rs
//! Error taxonomy. Probe and delivery failures are non-fatal and never reach
//! the subscriber; configuration failures stop the process before it starts.

use std::path::PathBuf;
use std::time::Duration;

/// One source could not be probed. The aggregator treats this as "zero results".
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("request to {url} failed: {message}")]
    Request { url: String, message: String },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("probe timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid search url for source `{source_name}`: {message}")]
    InvalidUrl {
        source_name: String,
        message: String,
    },

    #[error("could not read response body: {0}")]
    Body(String),
}

/// A rendered notification could not be handed to the transport.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("{channel} request failed: {message}")]
    Request {
        channel: &'static str,
        message: String,
    },

    #[error("{channel} answered HTTP {status}")]
    Status { channel: &'static str, status: u16 },

    #[error("{channel} rejected the message: {message}")]
    Rejected {
        channel: &'static str,
        message: String,
    },
}

/// Startup configuration is missing or unusable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration found (set WATCH_CONFIG_PATH or create config/watch.toml)")]
    Missing,

    #[error("WATCH_CONFIG_PATH points to non-existent path {0}")]
    NotFound(PathBuf),

    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported configuration format: {0}")]
    Format(String),

    #[error("invalid value for {key}: {message}")]
    Invalid { key: String, message: String },
}

impl ConfigError {
    pub(crate) fn invalid(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            key: key.into(),
            message: message.into(),
        }
    }
}
