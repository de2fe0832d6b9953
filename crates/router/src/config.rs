//! Service configuration
//!
//! Values come from unprefixed environment variables (`MODEL_DIR`,
//! `PREDICT_TIMEOUT_MS`, ...) layered over an optional `router.{toml,json,yaml}`
//! file in the working directory. Anything unparsable or out of range fails
//! startup rather than silently falling back.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Upper bound for `top_k`, requested or default
pub const MAX_TOP_K: usize = 10;

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Model artifact directory; unset runs the service without a model
    #[serde(default)]
    pub model_dir: Option<PathBuf>,

    #[serde(default = "default_top_k")]
    pub default_top_k: usize,

    #[serde(default = "default_min_confidence")]
    pub default_min_confidence: f64,

    /// Request body limit for the predict routes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,

    /// Prediction deadline; zero or negative disables it
    #[serde(default = "default_predict_timeout_ms")]
    pub predict_timeout_ms: i64,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Fallback tracing filter when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Reload the model when files in `model_dir` change
    #[serde(default)]
    pub model_watch: bool,

    #[serde(default = "default_model_watch_debounce_ms")]
    pub model_watch_debounce_ms: u64,
}

fn default_top_k() -> usize {
    3
}

fn default_min_confidence() -> f64 {
    0.55
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_max_text_chars() -> usize {
    2000
}

fn default_max_batch_items() -> usize {
    256
}

fn default_predict_timeout_ms() -> i64 {
    2000
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_model_watch_debounce_ms() -> u64 {
    500
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            model_dir: None,
            default_top_k: default_top_k(),
            default_min_confidence: default_min_confidence(),
            max_body_bytes: default_max_body_bytes(),
            max_text_chars: default_max_text_chars(),
            max_batch_items: default_max_batch_items(),
            predict_timeout_ms: default_predict_timeout_ms(),
            host: default_host(),
            port: default_port(),
            log_level: default_log_level(),
            model_watch: false,
            model_watch_debounce_ms: default_model_watch_debounce_ms(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the optional config file and the process environment
    pub fn load() -> Result<Self> {
        Self::build(
            config::Config::builder()
                .add_source(config::File::with_name("router").required(false))
                .add_source(Self::environment()),
        )
    }

    /// Load from an explicit variable map instead of the process environment
    pub fn from_vars(vars: HashMap<String, String>) -> Result<Self> {
        Self::build(config::Config::builder().add_source(Self::environment().source(Some(vars))))
    }

    fn environment() -> config::Environment {
        config::Environment::default().try_parsing(true)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let mut config: ServiceConfig = builder
            .build()
            .context("Failed to read configuration")?
            .try_deserialize()
            .context("Invalid configuration")?;

        // An empty MODEL_DIR means "not configured"
        if config
            .model_dir
            .as_ref()
            .is_some_and(|dir| dir.as_os_str().is_empty())
        {
            config.model_dir = None;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TOP_K).contains(&self.default_top_k) {
            bail!(
                "DEFAULT_TOP_K must be between 1 and {}, got {}",
                MAX_TOP_K,
                self.default_top_k
            );
        }
        if !(0.0..=1.0).contains(&self.default_min_confidence) {
            bail!(
                "DEFAULT_MIN_CONFIDENCE must be between 0.0 and 1.0, got {}",
                self.default_min_confidence
            );
        }
        if self.max_body_bytes == 0 {
            bail!("MAX_BODY_BYTES must be positive");
        }
        if self.max_text_chars == 0 {
            bail!("MAX_TEXT_CHARS must be positive");
        }
        if self.max_batch_items == 0 {
            bail!("MAX_BATCH_ITEMS must be positive");
        }
        Ok(())
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }

    pub fn watch_debounce(&self) -> Duration {
        Duration::from_millis(self.model_watch_debounce_ms)
    }
}
