use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use testwright_core_types::EngineError;

/// Top-level application configuration, loaded from YAML with environment
/// overrides applied on top.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: ModelConfig,
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub engine: EngineConfig,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub api_base: String,
    pub api_key: String,
    pub name: String,
    pub temperature: f32,
    /// Seconds before a chat completion request is abandoned.
    pub timeout_secs: u64,
    /// Attach page screenshots to planning requests.
    pub use_vision: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com/v1".to_string(),
            api_key: String::new(),
            name: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            timeout_secs: 60,
            use_vision: false,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
    pub nav_timeout_secs: u64,
    pub action_timeout_secs: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            headless: true,
            chrome_path: None,
            nav_timeout_secs: 30,
            action_timeout_secs: 10,
        }
    }
}

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct EngineConfig {
    pub max_steps: usize,
    pub settle_millis: u64,
    /// Ceiling in seconds for a single planned wait action.
    pub max_wait_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_steps: 30,
            settle_millis: 1500,
            max_wait_secs: 30,
        }
    }
}

impl AppConfig {
    /// Load configuration from an optional YAML file, then apply
    /// environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config file {}", path.display()))?;
                serde_yaml::from_str(&raw)
                    .with_context(|| format!("parsing config file {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("TESTWRIGHT_API_KEY") {
            self.model.api_key = key;
        }
        if let Ok(base) = std::env::var("TESTWRIGHT_API_BASE") {
            self.model.api_base = base;
        }
        if let Ok(name) = std::env::var("TESTWRIGHT_MODEL") {
            self.model.name = name;
        }
        if let Ok(headless) = std::env::var("TESTWRIGHT_HEADLESS") {
            self.browser.headless = !matches!(headless.as_str(), "0" | "false" | "no");
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.model.api_key.is_empty() {
            return Err(EngineError::Config(
                "no model API key configured; set model.api_key or TESTWRIGHT_API_KEY"
                    .to_string(),
            ));
        }
        if self.engine.max_steps == 0 {
            return Err(EngineError::Config(
                "engine.max_steps must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn model_timeout(&self) -> Duration {
        Duration::from_secs(self.model.timeout_secs)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.engine.settle_millis)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_secs(self.engine.max_wait_secs)
    }
}
