// SPDX-License-Identifier: EUPL-1.2 OR MIT

//! Client configuration.
//!
//! ```toml
//! url = "ldaps://ldap.example.com"
//! username = "cn=reader,dc=example,dc=com"
//! password = "secret"
//! connection_timeout_ms = 5000
//! request_timeout_ms = 30000
//!
//! [pool]
//! max_size = 8
//! ```

use std::fs::read_to_string;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::metrics::PoolMetrics;
use crate::pool::PoolConfig;

fn default_connection_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_max_size() -> usize {
    PoolConfig::default().max_size
}

fn default_max_idle_time_secs() -> u64 {
    300
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

#[derive(Deserialize, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default)]
    pub pool: PoolSettings,
}

/// Pool sizing as it appears in configuration files.
#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct PoolSettings {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_max_idle_time_secs")]
    pub max_idle_time_secs: u64,
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            max_idle_time_secs: default_max_idle_time_secs(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            username: String::new(),
            password: String::new(),
            connection_timeout_ms: default_connection_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            pool: PoolSettings::default(),
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field(
                "password",
                &if self.password.is_empty() {
                    ""
                } else {
                    "***REDACTED***"
                },
            )
            .field("connection_timeout_ms", &self.connection_timeout_ms)
            .field("request_timeout_ms", &self.request_timeout_ms)
            .field("pool", &self.pool)
            .finish()
    }
}

impl ClientConfig {
    pub fn new(
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(contents)?)
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.connection_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Merge `other` into this configuration.
    ///
    /// Only values `other` actually sets are taken: empty strings and
    /// timeouts or pool settings left at their defaults keep the current
    /// value.
    pub fn configure(&mut self, other: &ClientConfig) -> &mut Self {
        for (ours, theirs) in [
            (&mut self.url, &other.url),
            (&mut self.username, &other.username),
            (&mut self.password, &other.password),
        ] {
            if !theirs.is_empty() {
                ours.clone_from(theirs);
            }
        }

        let defaults = PoolSettings::default();
        for (ours, theirs, default) in [
            (
                &mut self.connection_timeout_ms,
                other.connection_timeout_ms,
                default_connection_timeout_ms(),
            ),
            (
                &mut self.request_timeout_ms,
                other.request_timeout_ms,
                default_request_timeout_ms(),
            ),
            (
                &mut self.pool.max_idle_time_secs,
                other.pool.max_idle_time_secs,
                defaults.max_idle_time_secs,
            ),
            (
                &mut self.pool.acquire_timeout_secs,
                other.pool.acquire_timeout_secs,
                defaults.acquire_timeout_secs,
            ),
        ] {
            if theirs != default {
                *ours = theirs;
            }
        }
        if other.pool.max_size != defaults.max_size {
            self.pool.max_size = other.pool.max_size;
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::Missing("URL"));
        }
        if self.username.is_empty() {
            return Err(ConfigError::Missing("User name"));
        }
        if self.password.is_empty() {
            return Err(ConfigError::Missing("Password"));
        }
        if self.pool.max_size == 0 {
            return Err(ConfigError::Invalid {
                reason: "pool.max_size must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Pool configuration derived from the `[pool]` table.
    pub fn pool_config(&self, metrics: Option<Arc<PoolMetrics>>) -> PoolConfig {
        PoolConfig {
            max_size: self.pool.max_size,
            max_idle_time: Duration::from_secs(self.pool.max_idle_time_secs),
            acquire_timeout: Duration::from_secs(self.pool.acquire_timeout_secs),
            connection_timeout: self.connection_timeout(),
            metrics,
        }
    }
}
