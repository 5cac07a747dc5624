//! Client configuration loaded from environment variables.
//!
//! Every setting has a default so a local development client starts with
//! zero configuration.

use std::time::Duration;

use parley_shared::constants::{
    DEFAULT_BASE_URL, DEFAULT_QUEUE_CAPACITY, DEFAULT_REQUEST_TIMEOUT_SECS,
};
use parley_shared::UserId;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Root URL of the chat server.
    /// Env: `PARLEY_BASE_URL`
    /// Default: `http://localhost:3000`
    pub base_url: String,

    /// API key sent as the `Api-Key` header.
    /// Env: `PARLEY_API_KEY`
    /// Default: none (anonymous requests).
    pub api_key: Option<String>,

    /// Username sent as the `Api-Username` header.
    /// Env: `PARLEY_API_USERNAME`
    pub api_username: Option<String>,

    /// Id of the signed-in user; selects the user-state topic and decides
    /// which messages count as our own.
    /// Env: `PARLEY_USER_ID`
    /// Default: `0`
    pub user_id: UserId,

    /// Capacity of the inbound envelope queue and the notification channel.
    /// Env: `PARLEY_QUEUE_CAPACITY`
    /// Default: `1024`
    pub queue_capacity: usize,

    /// Per-request timeout for REST calls.
    /// Env: `PARLEY_REQUEST_TIMEOUT_SECS`
    /// Default: 30 seconds.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: None,
            api_username: None,
            user_id: UserId(0),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Load configuration from the process environment, falling back to
    /// defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(url) = lookup("PARLEY_BASE_URL") {
            let url = url.trim().trim_end_matches('/');
            if url.is_empty() {
                tracing::warn!("Empty PARLEY_BASE_URL, using default");
            } else {
                config.base_url = url.to_string();
            }
        }

        if let Some(key) = lookup("PARLEY_API_KEY") {
            if !key.is_empty() {
                config.api_key = Some(key);
            }
        }

        if let Some(username) = lookup("PARLEY_API_USERNAME") {
            if !username.is_empty() {
                config.api_username = Some(username);
            }
        }

        if let Some(val) = lookup("PARLEY_USER_ID") {
            match val.parse::<UserId>() {
                Ok(id) => config.user_id = id,
                Err(e) => tracing::warn!(
                    value = %val,
                    error = %e,
                    "Invalid PARLEY_USER_ID, using default"
                ),
            }
        }

        if let Some(val) = lookup("PARLEY_QUEUE_CAPACITY") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.queue_capacity = n,
                _ => tracing::warn!(value = %val, "Invalid PARLEY_QUEUE_CAPACITY, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_REQUEST_TIMEOUT_SECS") {
            match val.parse::<u64>() {
                Ok(secs) if secs > 0 => config.request_timeout = Duration::from_secs(secs),
                _ => tracing::warn!(
                    value = %val,
                    "Invalid PARLEY_REQUEST_TIMEOUT_SECS, using default"
                ),
            }
        }

        config
    }
}
