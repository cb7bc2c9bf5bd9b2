//! Client configuration: defaults, optional TOML file, environment overrides.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ClientError, Result};

pub const ENV_BASE_URL: &str = "RESEARCH_DESK_BASE_URL";
pub const ENV_PUSH_URL: &str = "RESEARCH_DESK_PUSH_URL";

const APP_DIR: &str = "research-desk";

/// Models the backend accepts, in display order. The first is the default.
pub const SUPPORTED_MODELS: &[(&str, &str)] = &[
    (
        "llama-3.3-70b-versatile",
        "A powerful and versatile language model optimized for research tasks. Provides comprehensive analysis with high accuracy.",
    ),
    (
        "mixtral-8x7b-32768",
        "A balanced model with strong analytical capabilities. Good for general research tasks.",
    ),
    (
        "gemma-7b-it",
        "A lightweight and efficient model. Ideal for quick research tasks with good accuracy.",
    ),
];

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

pub fn model_description(model: &str) -> Option<&'static str> {
    SUPPORTED_MODELS
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, desc)| *desc)
}

/// Reject model names the backend would refuse with a 400.
pub fn validate_model(model: &str) -> Result<()> {
    if model_description(model).is_some() {
        Ok(())
    } else {
        Err(ClientError::InvalidModel(model.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the research backend (e.g. `http://127.0.0.1:5000`).
    pub base_url: String,
    /// WebSocket URL of the push channel. Polling alone is used when unset.
    pub push_url: Option<String>,
    pub poll_interval_ms: u64,
    pub connect_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Where the last active chat id is kept between runs.
    pub state_path: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            push_url: None,
            poll_interval_ms: 2_000,
            connect_timeout_ms: 3_000,
            request_timeout_ms: 10_000,
            state_path: None,
        }
    }
}

impl ClientConfig {
    /// Load from `path`, or from the default config location when it exists,
    /// then apply environment overrides.
    ///
    /// An explicit `path` that does not exist is an error; a missing default
    /// file is not.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => match default_config_path() {
                Some(p) if p.exists() => Self::from_file(&p)?,
                _ => Self::default(),
            },
        };
        cfg.apply_env(|key| std::env::var(key).ok());
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| ClientError::Config {
            path: path.display().to_string(),
            detail: e.to_string(),
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml(&text).map_err(|e| match e {
            ClientError::Config { detail, .. } => ClientError::Config {
                path: path.display().to_string(),
                detail,
            },
            other => other,
        })
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| ClientError::Config {
            path: "<inline>".to_string(),
            detail: e.to_string(),
        })
    }

    /// Apply overrides from `lookup` (the process environment in practice).
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url;
        }
        if let Some(url) = lookup(ENV_PUSH_URL).filter(|v| !v.trim().is_empty()) {
            self.push_url = Some(url);
        }
    }

    /// Base URL without a trailing slash, ready for `format!("{base}/api/..")`.
    pub fn normalized_base_url(&self) -> String {
        self.base_url.trim_end_matches('/').to_string()
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Configured state path, else `<data_dir>/research-desk/state.json`.
    pub fn resolved_state_path(&self) -> Option<PathBuf> {
        self.state_path
            .clone()
            .or_else(|| dirs::data_dir().map(|d| d.join(APP_DIR).join("state.json")))
    }
}

/// `<config_dir>/research-desk/config.toml`, when the platform has one.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}
