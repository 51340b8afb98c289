//! Service configuration, loaded from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::agent::TurnSettings;
use crate::error::{Result, WhatnextError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reasoning: ReasoningConfig,
    pub turn: TurnConfig,
    pub session: SessionConfig,
    pub data: DataConfig,
    pub hours: HoursConfig,
}

impl AppConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            WhatnextError::Config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8000".to_string(),
        }
    }
}

/// Which reasoning engine backs the agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineProvider {
    OpenAi,
    /// Deterministic in-process engine, for local development.
    Scripted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReasoningConfig {
    pub provider: EngineProvider,
    pub base_url: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub model: String,
    pub ranking_model: String,
    pub temperature: Option<f64>,
    /// Reuse an existing agent configuration instead of creating one.
    pub assistant_id: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            provider: EngineProvider::OpenAi,
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            model: "gpt-4o".to_string(),
            ranking_model: "gpt-4o".to_string(),
            temperature: Some(1.0),
            assistant_id: None,
            request_timeout_secs: 20,
        }
    }
}

impl ReasoningConfig {
    pub fn api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| {
                WhatnextError::Config(format!(
                    "environment variable {} is not set",
                    self.api_key_env
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub candidate_pool_size: usize,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            poll_interval_ms: 500,
            candidate_pool_size: 30,
        }
    }
}

impl TurnConfig {
    pub fn settings(&self) -> TurnSettings {
        TurnSettings {
            timeout: Duration::from_secs(self.timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            candidate_pool_size: self.candidate_pool_size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_secs: 3600 }
    }
}

impl SessionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub locations_path: PathBuf,
    pub users_path: PathBuf,
    pub categories_path: PathBuf,
    pub tags_path: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            locations_path: PathBuf::from("data/locations.json"),
            users_path: PathBuf::from("data/users.json"),
            categories_path: PathBuf::from("data/categories.json"),
            tags_path: PathBuf::from("data/tags.json"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HoursConfig {
    /// IANA zone every open-now check is evaluated in.
    pub timezone: String,
}

impl Default for HoursConfig {
    fn default() -> Self {
        Self {
            timezone: "America/Los_Angeles".to_string(),
        }
    }
}

impl HoursConfig {
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| WhatnextError::Config(format!("invalid timezone '{}': {}", self.timezone, e)))
    }
}
