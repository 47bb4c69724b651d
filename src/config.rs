use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use url::Url;

use crate::extractor::{default_rules, LabelRule, LabelScorer, DEFAULT_NOISE_FLOOR};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub watcher: WatcherConfig,
    pub extractor: ExtractorConfig,
    pub relay: RelayConfig,
    pub calculator: CalculatorConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// File path or http(s) URL of the page to watch.
    pub source: Option<String>,
    pub poll_interval_ms: u64,
    pub debounce_ms: u64,
    pub user_agent: String,
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    pub candidate_tags: Vec<String>,
    pub noise_floor: f64,
    pub rules: Vec<LabelRule>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Companion surface that receives every relayed message as a JSON post.
    pub webhook_url: Option<String>,
    pub retry_delay_ms: u64,
    pub request_timeout_secs: u64,
    pub history_capacity: usize,
    pub channel_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalculatorConfig {
    pub prefs_path: PathBuf,
    /// External OCR program and its arguments; reads an image on stdin.
    pub ocr_command: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// When set, logs are also written to a daily rolling file here.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7878,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            source: None,
            poll_interval_ms: 1000,
            debounce_ms: 300,
            user_agent: format!("provv-watcher/{}", env!("CARGO_PKG_VERSION")),
            request_timeout_secs: 15,
        }
    }
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            candidate_tags: ["label", "span", "div", "td", "th"]
                .iter()
                .map(|tag| tag.to_string())
                .collect(),
            noise_floor: DEFAULT_NOISE_FLOOR,
            rules: default_rules(),
        }
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            retry_delay_ms: 250,
            request_timeout_secs: 5,
            history_capacity: 200,
            channel_capacity: 64,
        }
    }
}

impl Default for CalculatorConfig {
    fn default() -> Self {
        Self {
            prefs_path: PathBuf::from("provvcalc_prefs.toml"),
            ocr_command: ["tesseract", "stdin", "stdout", "-l", "ita+eng"]
                .iter()
                .map(|arg| arg.to_string())
                .collect(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            file_prefix: "provv-watcher.log".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            // Built-in defaults, so every file is optional
            .add_source(Config::try_from(&AppConfig::default())?)
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Environment variables like PROVV__WATCHER__DEBOUNCE_MS
            .add_source(Environment::with_prefix("PROVV").separator("__"))
            .build()?;

        let config: AppConfig = s.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("Server port must be greater than 0".into()));
        }

        if self.watcher.debounce_ms == 0 {
            return Err(ConfigError::Message("Watcher debounce_ms must be greater than 0".into()));
        }

        if self.watcher.poll_interval_ms == 0 {
            return Err(ConfigError::Message("Watcher poll_interval_ms must be greater than 0".into()));
        }

        if self.extractor.candidate_tags.is_empty() {
            return Err(ConfigError::Message("Extractor candidate_tags cannot be empty".into()));
        }

        if !self.extractor.noise_floor.is_finite() || self.extractor.noise_floor < 0.0 {
            return Err(ConfigError::Message(
                "Extractor noise_floor must be a finite number of at least 0".into(),
            ));
        }

        if self.extractor.rules.is_empty() {
            return Err(ConfigError::Message("Extractor rules cannot be empty".into()));
        }

        if let Err(e) = LabelScorer::new(&self.extractor.rules) {
            return Err(ConfigError::Message(format!("Invalid extractor rule: {}", e)));
        }

        if let Some(webhook_url) = &self.relay.webhook_url {
            if Url::parse(webhook_url).is_err() {
                return Err(ConfigError::Message("Invalid relay webhook_url format".into()));
            }
        }

        if self.relay.history_capacity == 0 {
            return Err(ConfigError::Message("Relay history_capacity must be greater than 0".into()));
        }

        if self.relay.channel_capacity == 0 {
            return Err(ConfigError::Message("Relay channel_capacity must be greater than 0".into()));
        }

        Ok(())
    }
}
