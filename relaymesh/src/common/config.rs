/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::common::{QoS, RelayError};

const DEFAULT_USERNAME: &str = "tether";
const DEFAULT_PASSWORD: &str = "sp_ceB0ss!";

/// Configuration for relaymesh agents.
///
/// Loaded from `$XDG_CONFIG_HOME/relaymesh/config.toml` or built in code, then
/// handed to [`AgentBuilder::config`](crate::common::AgentBuilder::config). The
/// value is merged with builder overrides once, when the agent is built.
///
/// # Example Configuration File
///
/// ```toml
/// [broker]
/// protocol = "mqtt"
/// host = "broker.local"
/// port = 1883
///
/// [channels]
/// qos = 2
/// retain = false
///
/// [behavior]
/// auto_connect = true
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Broker connection options.
    pub broker: BrokerOptions,
    /// Defaults applied to every channel unless overridden.
    pub channels: ChannelDefaults,
    /// Behavioral configuration switches.
    pub behavior: BehaviorConfig,
}

/// Connection options for the pub/sub broker.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerOptions {
    /// Wire protocol, e.g. `mqtt`, `tcp` or `ws`.
    pub protocol: String,
    /// Broker host name or address.
    pub host: String,
    /// Broker port.
    pub port: u16,
    /// URL path, used by WebSocket transports.
    pub path: String,
    /// Username presented on connect.
    pub username: String,
    /// Password presented on connect.
    pub password: String,
}

/// Per-field overrides for [`BrokerOptions`]. `None` keeps the base value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerOverrides {
    /// Override for [`BrokerOptions::protocol`].
    pub protocol: Option<String>,
    /// Override for [`BrokerOptions::host`].
    pub host: Option<String>,
    /// Override for [`BrokerOptions::port`].
    pub port: Option<u16>,
    /// Override for [`BrokerOptions::path`].
    pub path: Option<String>,
    /// Override for [`BrokerOptions::username`].
    pub username: Option<String>,
    /// Override for [`BrokerOptions::password`].
    pub password: Option<String>,
}

/// Channel-level defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelDefaults {
    /// QoS used for subscribe and publish when a channel does not specify one.
    pub qos: QoS,
    /// Retain flag used for publish when a channel does not specify one.
    pub retain: bool,
}

/// Behavioral configuration switches
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BehaviorConfig {
    /// Connect while building the agent.
    ///
    /// When disabled, channels can be created before any connection exists and
    /// receivers defer their subscription until [`Agent::connect`](crate::common::Agent::connect).
    pub auto_connect: bool,
}

impl BrokerOptions {
    /// Defaults for a TCP runtime: `mqtt://localhost:1883`.
    #[must_use]
    pub fn tcp() -> Self {
        Self {
            protocol: "mqtt".to_string(),
            host: "localhost".to_string(),
            port: 1883,
            path: String::new(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }

    /// Defaults for a WebSocket runtime: `ws://localhost:15675/ws`.
    #[must_use]
    pub fn websocket() -> Self {
        Self {
            protocol: "ws".to_string(),
            host: "localhost".to_string(),
            port: 15675,
            path: "/ws".to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }

    /// Returns a copy of these options with every `Some` field of `overrides` applied.
    #[must_use]
    pub fn merged(&self, overrides: &BrokerOverrides) -> Self {
        Self {
            protocol: overrides.protocol.clone().unwrap_or_else(|| self.protocol.clone()),
            host: overrides.host.clone().unwrap_or_else(|| self.host.clone()),
            port: overrides.port.unwrap_or(self.port),
            path: overrides.path.clone().unwrap_or_else(|| self.path.clone()),
            username: overrides.username.clone().unwrap_or_else(|| self.username.clone()),
            password: overrides.password.clone().unwrap_or_else(|| self.password.clone()),
        }
    }

    /// The broker URI, `protocol://host:port{path}`.
    #[must_use]
    pub fn uri(&self) -> String {
        format!("{}://{}:{}{}", self.protocol, self.host, self.port, self.path)
    }
}

impl Default for BrokerOptions {
    fn default() -> Self {
        Self::tcp()
    }
}

// Logged on every connect attempt, so the password never appears.
impl fmt::Debug for BrokerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerOptions")
            .field("protocol", &self.protocol)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("path", &self.path)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl BrokerOverrides {
    /// Overrides nothing.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the protocol override.
    #[must_use]
    pub fn protocol(mut self, protocol: impl Into<String>) -> Self {
        self.protocol = Some(protocol.into());
        self
    }

    /// Sets the host override.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Sets the port override.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the path override.
    #[must_use]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Sets the username override.
    #[must_use]
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Sets the password override.
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

impl Default for ChannelDefaults {
    fn default() -> Self {
        Self {
            qos: QoS::AtLeastOnce,
            retain: false,
        }
    }
}

impl Default for BehaviorConfig {
    fn default() -> Self {
        Self { auto_connect: true }
    }
}

impl RelayConfig {
    /// Parses a configuration from TOML text. Missing sections and fields keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the text is not valid TOML for this structure.
    pub fn from_toml_str(config_str: &str) -> Result<Self, RelayError> {
        Ok(toml::from_str::<Self>(config_str)?)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Config`] if the file cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self, RelayError> {
        let config_str = std::fs::read_to_string(path)?;
        Self::from_toml_str(&config_str)
    }

    /// Load configuration from XDG-compliant locations
    ///
    /// Looks for `relaymesh/config.toml` under `$XDG_CONFIG_HOME` (falling back to
    /// `~/.config`). If no configuration file is found, returns the default
    /// configuration. If a configuration file exists but is malformed, logs an
    /// error and uses defaults.
    #[must_use]
    pub fn load() -> Self {
        let xdg_dirs = match xdg::BaseDirectories::with_prefix("relaymesh") {
            Ok(dirs) => dirs,
            Err(e) => {
                error!("Failed to initialize XDG directories: {}", e);
                return Self::default();
            }
        };

        let Some(path) = xdg_dirs.find_config_file("config.toml") else {
            info!("No configuration file found, using defaults");
            return Self::default();
        };

        info!("Loading configuration from: {}", path.display());
        match Self::load_from(&path) {
            Ok(config) => {
                info!("Successfully loaded configuration");
                config
            }
            Err(e) => {
                error!("Failed to load configuration file {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_sets_differ_by_runtime() {
        let tcp = BrokerOptions::tcp();
        let ws = BrokerOptions::websocket();
        assert_eq!(tcp.uri(), "mqtt://localhost:1883");
        assert_eq!(ws.uri(), "ws://localhost:15675/ws");
        assert_eq!(tcp.username, ws.username);
        assert_eq!(BrokerOptions::default(), tcp);
    }

    #[test]
    fn overrides_replace_only_given_fields() {
        let merged = BrokerOptions::tcp().merged(&BrokerOverrides::new().host("10.0.0.5").port(1884));
        assert_eq!(merged.host, "10.0.0.5");
        assert_eq!(merged.port, 1884);
        assert_eq!(merged.protocol, "mqtt");
        assert_eq!(merged.password, DEFAULT_PASSWORD);
    }

    #[test]
    fn debug_output_hides_password() {
        let rendered = format!("{:?}", BrokerOptions::tcp());
        assert!(!rendered.contains(DEFAULT_PASSWORD));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = RelayConfig::from_toml_str(
            r#"
            [broker]
            host = "broker.local"

            [channels]
            qos = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.channels.qos, QoS::ExactlyOnce);
        assert!(!config.channels.retain);
        assert!(config.behavior.auto_connect);
    }

    #[test]
    fn invalid_qos_is_a_config_error() {
        let result = RelayConfig::from_toml_str("[channels]\nqos = 7\n");
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
