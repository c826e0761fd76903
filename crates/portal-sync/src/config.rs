use std::env;
use std::str::FromStr;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;

use crate::application::portal::SyncSettings;
use crate::application::scheduler::PollSettings;
use crate::application::status::UpdatePolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server_port: String,
    pub orders_endpoint_url: String,
    pub cache_url: Option<String>,
    pub proxy_url: Option<String>,
    pub api_secret: Option<String>,
    pub auth_token: Option<String>,
    pub order_limit: u32,
    pub poll_interval_ms: u64,
    pub max_poll_interval_ms: u64,
    pub request_timeout_ms: u64,
    pub jsonp_timeout_ms: u64,
    pub new_order_highlight_ms: u64,
    pub update_policy: UpdatePolicy,
    pub polling_enabled: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let server_port = env::var("SERVER_PORT").unwrap_or_else(|_| "3000".into());
        let orders_endpoint_url =
            env::var("ORDERS_ENDPOINT_URL").context("ORDERS_ENDPOINT_URL must be set")?;
        let config = Self {
            server_port,
            orders_endpoint_url,
            cache_url: optional("CACHE_URL"),
            proxy_url: optional("PROXY_URL"),
            api_secret: optional("API_SECRET"),
            auth_token: optional("AUTH_TOKEN"),
            order_limit: parsed("ORDER_LIMIT", 100)?,
            poll_interval_ms: parsed("POLL_INTERVAL_MS", 3_000)?,
            max_poll_interval_ms: parsed("MAX_POLL_INTERVAL_MS", 30_000)?,
            request_timeout_ms: parsed("REQUEST_TIMEOUT_MS", 10_000)?,
            jsonp_timeout_ms: parsed("JSONP_TIMEOUT_MS", 10_000)?,
            new_order_highlight_ms: parsed("NEW_ORDER_HIGHLIGHT_MS", 5_000)?,
            update_policy: match optional("UPDATE_POLICY") {
                Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
                None => UpdatePolicy::default(),
            },
            polling_enabled: parsed("POLLING_ENABLED", true)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.sync_settings()
            .poll
            .validate()
            .context("invalid POLL_INTERVAL_MS / MAX_POLL_INTERVAL_MS")
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            poll: PollSettings {
                base_interval: Duration::from_millis(self.poll_interval_ms),
                max_interval: Duration::from_millis(self.max_poll_interval_ms),
                enabled: self.polling_enabled,
            },
            highlight_for: Duration::from_millis(self.new_order_highlight_ms),
            default_policy: self.update_policy,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn jsonp_timeout(&self) -> Duration {
        Duration::from_millis(self.jsonp_timeout_ms)
    }
}

fn optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match optional(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {raw}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(poll_interval_ms: u64, max_poll_interval_ms: u64) -> Config {
        Config {
            server_port: "3000".into(),
            orders_endpoint_url: "http://127.0.0.1:9/exec".into(),
            cache_url: None,
            proxy_url: None,
            api_secret: None,
            auth_token: None,
            order_limit: 100,
            poll_interval_ms,
            max_poll_interval_ms,
            request_timeout_ms: 10_000,
            jsonp_timeout_ms: 10_000,
            new_order_highlight_ms: 5_000,
            update_policy: UpdatePolicy::default(),
            polling_enabled: true,
        }
    }

    #[test]
    fn default_intervals_are_accepted() {
        let cfg = config(3_000, 30_000);
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sync_settings().poll.base_interval, Duration::from_secs(3));
    }

    #[test]
    fn zero_poll_interval_is_rejected() {
        let err = config(0, 30_000).validate().unwrap_err();
        assert!(err.to_string().contains("POLL_INTERVAL_MS"));
        assert!(config(3_000, 0).validate().is_err());
    }

    #[test]
    fn cap_below_base_is_rejected() {
        assert!(config(5_000, 4_000).validate().is_err());
        assert!(config(5_000, 5_000).validate().is_ok());
    }
}
