use std::{env, path::PathBuf, time::Duration};

use thiserror::Error;

pub const DEFAULT_HUB_PATH: &str = "/appointmentHub";
pub const DEFAULT_AI_PREDICT_URL: &str = "http://localhost:8000/predict";
pub const DEFAULT_AI_CHAT_URL: &str = "http://localhost:8005";
pub const DEFAULT_TOKEN_FILE: &str = ".medscan/token";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// REST base, usually ending in `/api`.
    pub api_base: String,
    pub hub_path: String,
    pub token_file: PathBuf,
    pub ai_predict_url: String,
    pub ai_chat_url: String,
    pub reconnect: ReconnectPolicy,
}

/// Retry schedule for the real-time hub connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before retry number `attempt` (1-based). Doubles each time and
    /// saturates at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        let factor = 1u32 << shift;
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok(); // Load .env file

        let api_base = env::var("MEDSCAN_API_BASE")
            .map_err(|_| ConfigError::Missing("MEDSCAN_API_BASE"))?
            .trim_end_matches('/')
            .to_string();
        if !(api_base.starts_with("http://") || api_base.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                key: "MEDSCAN_API_BASE",
                value: api_base,
            });
        }

        let hub_path = env::var("MEDSCAN_HUB_PATH").unwrap_or_else(|_| DEFAULT_HUB_PATH.into());
        let token_file = env::var("MEDSCAN_TOKEN_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_token_file());
        let ai_predict_url =
            env::var("MEDSCAN_AI_PREDICT_URL").unwrap_or_else(|_| DEFAULT_AI_PREDICT_URL.into());
        let ai_chat_url =
            env::var("MEDSCAN_AI_CHAT_URL").unwrap_or_else(|_| DEFAULT_AI_CHAT_URL.into());

        let defaults = ReconnectPolicy::default();
        let initial_delay = duration_ms_var("MEDSCAN_RECONNECT_INITIAL_MS")?
            .unwrap_or(defaults.initial_delay);
        let max_delay =
            duration_ms_var("MEDSCAN_RECONNECT_MAX_MS")?.unwrap_or(defaults.max_delay);

        Ok(Config {
            api_base,
            hub_path,
            token_file,
            ai_predict_url,
            ai_chat_url,
            reconnect: ReconnectPolicy {
                initial_delay,
                max_delay: max_delay.max(initial_delay),
            },
        })
    }

    /// Builds a config for a given API base with every other value defaulted.
    pub fn for_api_base(api_base: impl Into<String>) -> Self {
        Config {
            api_base: api_base.into().trim_end_matches('/').to_string(),
            hub_path: DEFAULT_HUB_PATH.into(),
            token_file: default_token_file(),
            ai_predict_url: DEFAULT_AI_PREDICT_URL.into(),
            ai_chat_url: DEFAULT_AI_CHAT_URL.into(),
            reconnect: ReconnectPolicy::default(),
        }
    }

    /// WebSocket URL of the appointment hub: the REST base minus a trailing
    /// `/api` segment, with the scheme switched to `ws`/`wss`.
    pub fn hub_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        let base = base.strip_suffix("/api").unwrap_or(base);
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        let path = if self.hub_path.starts_with('/') {
            self.hub_path.clone()
        } else {
            format!("/{}", self.hub_path)
        };
        format!("{base}{path}")
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base, path.trim_start_matches('/'))
    }
}

fn default_token_file() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(DEFAULT_TOKEN_FILE))
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_TOKEN_FILE))
}

/// A positive millisecond count; zero is refused.
fn duration_ms_var(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(value) => match value.trim().parse::<u64>() {
            Ok(ms) if ms > 0 => Ok(Some(Duration::from_millis(ms))),
            _ => Err(ConfigError::Invalid { key, value }),
        },
        Err(_) => Ok(None),
    }
}
