use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, SuggestError};

/// Application configuration loaded from environment variables.
/// Every value has a default; nothing here is a secret.
#[derive(Debug, Clone)]
pub struct Config {
    // Upstream services
    pub stream_url: String,
    pub public_api_url: String,
    pub service_url: String,

    // Handle normalization
    pub handle_suffix: String,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Sessions and HTTP
    pub page_idle: Duration,
    pub http_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stream_url: "https://bsky-follow-suggestions.theo.io".to_string(),
            public_api_url: "https://public.api.bsky.app".to_string(),
            service_url: "https://bsky.social".to_string(),
            handle_suffix: "bsky.social".to_string(),
            web_host: "0.0.0.0".to_string(),
            web_port: 3000,
            page_idle: Duration::from_secs(3600),
            http_timeout: Duration::from_secs(30),
        }
    }
}

impl Config {
    /// Load configuration from the process environment (and `.env` if present).
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            stream_url: url_or(&lookup, "SUGGEST_STREAM_URL", defaults.stream_url),
            public_api_url: url_or(&lookup, "BSKY_PUBLIC_API_URL", defaults.public_api_url),
            service_url: url_or(&lookup, "BSKY_SERVICE_URL", defaults.service_url),
            handle_suffix: lookup("HANDLE_SUFFIX")
                .map(|s| s.trim().trim_start_matches('.').to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.handle_suffix),
            web_host: lookup("WEB_HOST").unwrap_or(defaults.web_host),
            web_port: parsed(&lookup, "WEB_PORT")?.unwrap_or(defaults.web_port),
            page_idle: parsed(&lookup, "PAGE_IDLE_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.page_idle),
            http_timeout: parsed(&lookup, "HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
        };

        Ok(config)
    }

    pub fn log_settings(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  SUGGEST_STREAM_URL: {}", self.stream_url);
        tracing::info!("  BSKY_PUBLIC_API_URL: {}", self.public_api_url);
        tracing::info!("  BSKY_SERVICE_URL: {}", self.service_url);
        tracing::info!("  HANDLE_SUFFIX: {}", self.handle_suffix);
        tracing::info!("  PAGE_IDLE_SECS: {}", self.page_idle.as_secs());
    }
}

fn url_or(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: String) -> String {
    lookup(key)
        .map(|v| v.trim().trim_end_matches('/').to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match lookup(key) {
        None => Ok(None),
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| SuggestError::Config(format!("{key} must be a number, got '{raw}'"))),
    }
}
