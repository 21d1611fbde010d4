// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Typed configuration surface.
//!
//! Nothing here reads files. [`DeviceConfig`] and [`BridgeConfig`] derive
//! `serde::Deserialize` so a front-end can load them from whatever format it
//! likes; [`BrokerConfig`] is assembled with a builder.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use homie_bridge::config::{BrokerConfig, DeviceConfig};
//!
//! let broker = BrokerConfig::builder()
//!     .host("192.168.1.50")
//!     .credentials("user", "password")
//!     .build()
//!     .unwrap();
//! assert_eq!(broker.port(), 1883);
//!
//! let device = DeviceConfig::new("airly", "air-quality")
//!     .with_fetch_interval_seconds(600)
//!     .with_setting("latitude", "50.06");
//! assert_eq!(device.fetch_interval().unwrap(), Duration::from_secs(600));
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, ProtocolError};

/// Default MQTT port.
pub const DEFAULT_PORT: u16 = 1883;

/// Default refresh interval, one minute.
pub const DEFAULT_FETCH_INTERVAL_SECONDS: u64 = 60;

/// Longest accepted refresh interval, one week.
pub const MAX_FETCH_INTERVAL_SECONDS: u64 = 7 * 24 * 60 * 60;

/// Default size of the refresh worker pool.
pub const DEFAULT_WORKERS: usize = 4;

// =============================================================================
// Broker
// =============================================================================

/// Broker connection settings.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
    client_id_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
            client_id_prefix: "homie_bridge".to_string(),
        }
    }
}

impl BrokerConfig {
    /// Creates a builder.
    #[must_use]
    pub fn builder() -> BrokerConfigBuilder {
        BrokerConfigBuilder::default()
    }

    /// Broker host.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Broker port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.port
    }

    /// `(username, password)` if authentication is configured.
    #[must_use]
    pub fn credentials(&self) -> Option<(&str, &str)> {
        self.credentials
            .as_ref()
            .map(|(u, p)| (u.as_str(), p.as_str()))
    }

    /// MQTT keep-alive interval.
    #[must_use]
    pub fn keep_alive(&self) -> Duration {
        self.keep_alive
    }

    /// How long to wait for the broker's ConnAck.
    #[must_use]
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Prefix of the generated client id.
    #[must_use]
    pub fn client_id_prefix(&self) -> &str {
        &self.client_id_prefix
    }
}

/// Builder for [`BrokerConfig`].
#[derive(Debug, Default)]
pub struct BrokerConfigBuilder {
    config: BrokerConfig,
}

impl BrokerConfigBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Sets the client id prefix (default: `homie_bridge`).
    #[must_use]
    pub fn client_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.client_id_prefix = prefix.into();
        self
    }

    /// Finishes the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidAddress`] if no host is set.
    pub fn build(self) -> Result<BrokerConfig, ProtocolError> {
        if self.config.host.is_empty() {
            return Err(ProtocolError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }
        Ok(self.config)
    }
}

// =============================================================================
// Devices
// =============================================================================

/// Per-device settings.
///
/// `kind` selects the vendor driver; `settings` carries whatever that driver
/// needs (address, token, credentials).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeviceConfig {
    /// Device id, the top-level topic segment.
    pub id: String,
    /// Driver kind, e.g. `air-quality` or `light-bridge`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Display name. Defaults to the id.
    #[serde(default)]
    pub name: Option<String>,
    /// Seconds between refreshes.
    #[serde(default = "default_fetch_interval")]
    pub fetch_interval_seconds: u64,
    /// Whether to refresh once immediately at start.
    #[serde(default = "default_true")]
    pub refresh_on_start: bool,
    /// Vendor parameters.
    #[serde(default)]
    pub settings: BTreeMap<String, String>,
}

fn default_fetch_interval() -> u64 {
    DEFAULT_FETCH_INTERVAL_SECONDS
}

fn default_true() -> bool {
    true
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

impl DeviceConfig {
    /// Creates a configuration with default interval and no settings.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            name: None,
            fetch_interval_seconds: DEFAULT_FETCH_INTERVAL_SECONDS,
            refresh_on_start: true,
            settings: BTreeMap::new(),
        }
    }

    /// Sets the display name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Sets the refresh interval in seconds.
    #[must_use]
    pub fn with_fetch_interval_seconds(mut self, seconds: u64) -> Self {
        self.fetch_interval_seconds = seconds;
        self
    }

    /// Skips the immediate refresh at start.
    #[must_use]
    pub fn without_refresh_on_start(mut self) -> Self {
        self.refresh_on_start = false;
        self
    }

    /// Adds a vendor parameter.
    #[must_use]
    pub fn with_setting(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.settings.insert(key.into(), value.into());
        self
    }

    /// Display name, falling back to the id.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Looks up a vendor parameter.
    #[must_use]
    pub fn setting(&self, key: &str) -> Option<&str> {
        self.settings.get(key).map(String::as_str)
    }

    /// Refresh interval.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for a zero interval or one longer than
    /// [`MAX_FETCH_INTERVAL_SECONDS`].
    pub fn fetch_interval(&self) -> Result<Duration, Error> {
        if self.fetch_interval_seconds == 0 {
            return Err(Error::Config(format!(
                "device '{}': fetch-interval-seconds must be positive",
                self.id
            )));
        }
        if self.fetch_interval_seconds > MAX_FETCH_INTERVAL_SECONDS {
            return Err(Error::Config(format!(
                "device '{}': fetch-interval-seconds must not exceed {MAX_FETCH_INTERVAL_SECONDS}",
                self.id
            )));
        }
        Ok(Duration::from_secs(self.fetch_interval_seconds))
    }
}

// =============================================================================
// Bridge
// =============================================================================

/// Bridge-wide settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BridgeConfig {
    /// Prefix prepended to every topic. Empty means none.
    #[serde(default)]
    pub base_topic: String,
    /// Maximum number of refreshes running at once.
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Whether to publish the `$`-attribute tree.
    #[serde(default = "default_true")]
    pub announce: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_topic: String::new(),
            workers: DEFAULT_WORKERS,
            announce: true,
        }
    }
}

impl BridgeConfig {
    /// Worker pool size.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `workers` is zero.
    pub fn worker_count(&self) -> Result<usize, Error> {
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        Ok(self.workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_defaults() {
        let config = BrokerConfig::default();
        assert!(config.host().is_empty());
        assert_eq!(config.port(), 1883);
        assert!(config.credentials().is_none());
        assert_eq!(config.keep_alive(), Duration::from_secs(30));
        assert_eq!(config.connection_timeout(), Duration::from_secs(10));
        assert_eq!(config.client_id_prefix(), "homie_bridge");
    }

    #[test]
    fn broker_builder_chain() {
        let config = BrokerConfig::builder()
            .host("192.168.1.50")
            .port(8883)
            .credentials("admin", "secret")
            .keep_alive(Duration::from_secs(45))
            .connection_timeout(Duration::from_secs(15))
            .client_id_prefix("test")
            .build()
            .unwrap();

        assert_eq!(config.host(), "192.168.1.50");
        assert_eq!(config.port(), 8883);
        assert_eq!(config.credentials(), Some(("admin", "secret")));
        assert_eq!(config.keep_alive(), Duration::from_secs(45));
        assert_eq!(config.connection_timeout(), Duration::from_secs(15));
        assert_eq!(config.client_id_prefix(), "test");
    }

    #[test]
    fn broker_missing_host_fails() {
        let result = BrokerConfig::builder().build();
        assert!(matches!(result, Err(ProtocolError::InvalidAddress(_))));
    }

    #[test]
    fn device_config_from_json() {
        let json = r#"{
            "id": "printer",
            "type": "printer",
            "fetch-interval-seconds": 300,
            "settings": { "ip": "192.168.1.20" }
        }"#;
        let config: DeviceConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.id, "printer");
        assert_eq!(config.kind, "printer");
        assert_eq!(config.display_name(), "printer");
        assert!(config.refresh_on_start);
        assert_eq!(config.setting("ip"), Some("192.168.1.20"));
        assert_eq!(config.fetch_interval().unwrap(), Duration::from_secs(300));
    }

    #[test]
    fn device_config_defaults() {
        let config: DeviceConfig =
            serde_json::from_str(r#"{ "id": "tv", "type": "tv" }"#).unwrap();
        assert_eq!(config.fetch_interval_seconds, DEFAULT_FETCH_INTERVAL_SECONDS);
        assert!(config.settings.is_empty());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = DeviceConfig::new("tv", "tv").with_fetch_interval_seconds(0);
        assert!(matches!(config.fetch_interval(), Err(Error::Config(_))));
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let config = DeviceConfig::new("tv", "tv").with_fetch_interval_seconds(u64::MAX);
        assert!(matches!(config.fetch_interval(), Err(Error::Config(_))));

        let config = DeviceConfig::new("tv", "tv")
            .with_fetch_interval_seconds(MAX_FETCH_INTERVAL_SECONDS);
        assert_eq!(
            config.fetch_interval().unwrap(),
            Duration::from_secs(MAX_FETCH_INTERVAL_SECONDS)
        );
    }

    #[test]
    fn bridge_config_defaults() {
        let config: BridgeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.worker_count().unwrap(), DEFAULT_WORKERS);
    }

    #[test]
    fn zero_workers_is_rejected() {
        let config = BridgeConfig {
            workers: 0,
            ..BridgeConfig::default()
        };
        assert!(config.worker_count().is_err());
    }
}
