use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the mini-app server and bot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub static_root: PathBuf,
    pub enable_cors: bool,
    pub bot_token: Option<String>,
    pub miniapp_url: String,
    pub telegram_api_url: String,
    /// Zero disables the `auth_date` freshness check.
    pub init_data_max_age: Duration,
    pub bot_poll_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            static_root: PathBuf::from("static"),
            enable_cors: false,
            bot_token: None,
            miniapp_url: "https://127.0.0.1:8443".to_string(),
            telegram_api_url: "https://api.telegram.org".to_string(),
            init_data_max_age: Duration::from_secs(0),
            bot_poll_timeout: Duration::from_secs(30),
            shutdown_grace: Duration::from_secs(30),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary variable source so tests do not
    /// have to mutate the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let bind_addr: SocketAddr = match lookup("LISTEN_ADDRESS") {
            Some(v) => v.parse().context("failed to parse LISTEN_ADDRESS")?,
            None => defaults.bind_addr,
        };

        let static_root = lookup("STATIC_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.static_root);

        let enable_cors = lookup("ENABLE_CORS")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let bot_token = lookup("TG_BOT_TOKEN").filter(|v| !v.trim().is_empty());
        let miniapp_url = lookup("MINIAPP_URL").unwrap_or(defaults.miniapp_url);
        let telegram_api_url = lookup("TELEGRAM_API_URL")
            .map(|v| v.trim_end_matches('/').to_string())
            .unwrap_or(defaults.telegram_api_url);

        let secs = |key: &str, fallback: Duration| {
            lookup(key)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(fallback)
        };

        Ok(Self {
            bind_addr,
            static_root,
            enable_cors,
            bot_token,
            miniapp_url,
            telegram_api_url,
            init_data_max_age: secs("INIT_DATA_MAX_AGE_SECS", defaults.init_data_max_age),
            bot_poll_timeout: secs("BOT_POLL_TIMEOUT_SECS", defaults.bot_poll_timeout),
            shutdown_grace: secs("SHUTDOWN_GRACE_SECS", defaults.shutdown_grace),
        })
    }

    pub fn index_path(&self) -> PathBuf {
        self.static_root.join("index.html")
    }
}
