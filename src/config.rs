//! Configuration file handling.
//!
//! The configuration is a JSON document in which every field is optional.
//! Durations may be written as `"500ms"`, `"2s"`, `"1m"` or as a bare
//! number of milliseconds.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Result, TypeAssistError};
use crate::speed::Speed;

pub const DEFAULT_API_URL: &str = "https://typeassist-backend.onrender.com";
pub const API_URL_ENV: &str = "API_URL";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_request_timeout", with = "duration_format")]
    pub request_timeout: Duration,

    #[serde(default = "default_hotkey")]
    pub hotkey: String,

    #[serde(default = "default_cancel_key")]
    pub cancel_key: String,

    #[serde(default)]
    pub speed: Speed,

    /// Pause before the first character so the user can refocus the target window.
    #[serde(default = "default_settle_delay", with = "duration_format")]
    pub settle_delay: Duration,

    #[serde(default = "default_jitter_factor")]
    pub jitter_factor: f64,

    /// Where the auth record lives; the platform data directory when unset.
    #[serde(default)]
    pub settings_path: Option<PathBuf>,

    #[serde(default)]
    pub verbose: bool,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_hotkey() -> String {
    "F9".to_string()
}

fn default_cancel_key() -> String {
    "Escape".to_string()
}

fn default_settle_delay() -> Duration {
    Duration::from_millis(300)
}

fn default_jitter_factor() -> f64 {
    0.3
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            request_timeout: default_request_timeout(),
            hotkey: default_hotkey(),
            cancel_key: default_cancel_key(),
            speed: Speed::default(),
            settle_delay: default_settle_delay(),
            jitter_factor: default_jitter_factor(),
            settings_path: None,
            verbose: false,
        }
    }
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| TypeAssistError::config_load(path, e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| TypeAssistError::config_load(path, e.to_string()))
    }

    pub fn save_to_file(&self, path: &str) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| TypeAssistError::config_save(path, e.to_string()))
    }

    /// Loads `path` if given (defaults otherwise), then applies `API_URL`.
    pub fn load(path: Option<&str>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with the environment supplied by `lookup`.
    pub fn load_with(path: Option<&str>, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        if let Some(url) = lookup(API_URL_ENV) {
            let url = url.trim();
            if !url.is_empty() {
                tracing::debug!(api_url = %url, "API URL overridden from environment");
                config.api_url = url.to_string();
            }
        }
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.api_url.starts_with("http://") || self.api_url.starts_with("https://")) {
            return Err(TypeAssistError::config_validation(format!(
                "api_url must be an http(s) URL, got '{}'",
                self.api_url
            )));
        }

        if self.request_timeout.is_zero() {
            return Err(TypeAssistError::config_validation(
                "request_timeout must be greater than zero",
            ));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(TypeAssistError::config_validation(
                "jitter_factor must be within [0, 1]",
            ));
        }

        crate::hotkey::parse_hotkey(&self.hotkey)?;
        crate::hotkey::parse_hotkey(&self.cancel_key)?;

        Ok(())
    }
}

/// Parses `"250ms"`, `"3s"`, `"2m"` or a bare millisecond count.
pub fn parse_duration(value: &str) -> Result<Duration> {
    let trimmed = value.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err(TypeAssistError::invalid_duration(value, "empty duration"));
    }

    let (digits, multiplier) = if let Some(n) = trimmed.strip_suffix("ms") {
        (n, 1)
    } else if let Some(n) = trimmed.strip_suffix('s') {
        (n, 1_000)
    } else if let Some(n) = trimmed.strip_suffix('m') {
        (n, 60_000)
    } else {
        (trimmed.as_str(), 1)
    };

    let amount: u64 = digits.trim().parse().map_err(|_| {
        TypeAssistError::invalid_duration(value, "expected a non-negative number with ms, s or m")
    })?;

    amount
        .checked_mul(multiplier)
        .map(Duration::from_millis)
        .ok_or_else(|| TypeAssistError::invalid_duration(value, "duration too large"))
}

pub(crate) mod duration_format {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format!("{}ms", duration.as_millis()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Millis(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(Duration::from_millis(ms)),
            Repr::Text(text) => super::parse_duration(&text).map_err(serde::de::Error::custom),
        }
    }
}
