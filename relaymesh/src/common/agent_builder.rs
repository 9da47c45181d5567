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
use std::sync::Arc;

use mti::prelude::*;
use tracing::{debug, instrument};

use crate::address::AgentIdentity;
use crate::common::{
    Agent, BrokerOptions, BrokerOverrides, ConnectionManager, RelayConfig, RelayError,
};
use crate::traits::Transport;

/// Builds an [`Agent`].
///
/// Configuration is resolved once, in [`build`](Self::build): the
/// [`RelayConfig`] (defaults unless one is supplied) is merged with the
/// builder's broker overrides and switches, and the result is fixed for the
/// agent's lifetime.
///
/// ```rust,ignore
/// let broker = MemoryBroker::new();
/// let agent = Agent::builder("tester")
///     .instance_id("specialGroup")
///     .transport(broker.clone())
///     .build()
///     .await?;
/// ```
pub struct AgentBuilder {
    role: String,
    instance_id: Option<String>,
    config: RelayConfig,
    broker_overrides: BrokerOverrides,
    auto_connect: Option<bool>,
    transport: Option<Arc<dyn Transport>>,
    client_id: Option<String>,
}

impl fmt::Debug for AgentBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentBuilder")
            .field("role", &self.role)
            .field("instance_id", &self.instance_id)
            .field("config", &self.config)
            .field("auto_connect", &self.auto_connect)
            .field("transport", &self.transport)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl AgentBuilder {
    pub(crate) fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            instance_id: None,
            config: RelayConfig::default(),
            broker_overrides: BrokerOverrides::default(),
            auto_connect: None,
            transport: None,
            client_id: None,
        }
    }

    /// Sets the instance (or group) id. Senders append it to their topics.
    #[must_use]
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Uses `config` instead of the built-in defaults.
    #[must_use]
    pub fn config(mut self, config: RelayConfig) -> Self {
        self.config = config;
        self
    }

    /// Replaces the broker options wholesale, e.g. with [`BrokerOptions::websocket`].
    #[must_use]
    pub fn broker(mut self, options: BrokerOptions) -> Self {
        self.config.broker = options;
        self
    }

    /// Overrides individual broker options.
    #[must_use]
    pub fn broker_overrides(mut self, overrides: BrokerOverrides) -> Self {
        self.broker_overrides = overrides;
        self
    }

    /// Whether to connect in [`build`](Self::build). Defaults to the config's
    /// `behavior.auto_connect`.
    #[must_use]
    pub const fn auto_connect(mut self, auto_connect: bool) -> Self {
        self.auto_connect = Some(auto_connect);
        self
    }

    /// The transport to connect with.
    ///
    /// Required unless the `mqtt` feature is enabled, in which case an
    /// [`MqttTransport`](crate::transport::MqttTransport) is used by default.
    #[must_use]
    pub fn transport(mut self, transport: impl Transport) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Like [`transport`](Self::transport), for a transport that is already shared.
    #[must_use]
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// The id presented to the broker. Generated (`relay_<uuid v7>`) if unset.
    #[must_use]
    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    /// Builds the agent, connecting first if auto-connect is on.
    ///
    /// # Errors
    ///
    /// * [`RelayError::MalformedAddress`] if the role or instance id is not a valid segment.
    /// * [`RelayError::Config`] if no transport is available.
    /// * [`RelayError::Connection`] if auto-connect is on and connecting fails.
    #[instrument(skip(self), fields(role = %self.role))]
    pub async fn build(self) -> Result<Agent, RelayError> {
        let identity = AgentIdentity::new(self.role, self.instance_id)?;
        let transport = match self.transport {
            Some(transport) => transport,
            None => default_transport()?,
        };
        let options = self.config.broker.merged(&self.broker_overrides);
        let client_id = self.client_id.unwrap_or_else(generate_client_id);
        let auto_connect = self.auto_connect.unwrap_or(self.config.behavior.auto_connect);
        debug!(%client_id, auto_connect, ?options, "Building agent");

        let agent = Agent::new(
            identity,
            ConnectionManager::new(transport, options, client_id),
            self.config.channels,
            auto_connect,
        );
        if auto_connect {
            agent.connect().await?;
        }
        Ok(agent)
    }
}

fn generate_client_id() -> String {
    "relay".create_type_id::<V7>().to_string()
}

#[cfg(feature = "mqtt")]
#[allow(clippy::unnecessary_wraps)]
fn default_transport() -> Result<Arc<dyn Transport>, RelayError> {
    Ok(Arc::new(crate::transport::MqttTransport::new()))
}

#[cfg(not(feature = "mqtt"))]
fn default_transport() -> Result<Arc<dyn Transport>, RelayError> {
    Err(RelayError::Config(
        "no transport configured: supply one with AgentBuilder::transport or enable the `mqtt` feature"
            .to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ConnectionState;
    use crate::transport::MemoryBroker;

    #[test]
    fn generated_client_ids_are_prefixed_and_unique() {
        let first = generate_client_id();
        let second = generate_client_id();
        assert!(first.starts_with("relay_"));
        assert_ne!(first, second);
    }

    #[tokio::test]
    async fn auto_connect_connects_during_build() -> anyhow::Result<()> {
        let agent = Agent::builder("tester")
            .transport(MemoryBroker::new())
            .build()
            .await?;
        assert_eq!(agent.state(), ConnectionState::Connected);
        assert!(agent.client_id().starts_with("relay_"));
        Ok(())
    }

    #[tokio::test]
    async fn auto_connect_failure_fails_the_build() {
        let broker = MemoryBroker::new();
        broker.set_available(false);
        let result = Agent::builder("tester").transport(broker).build().await;
        assert!(matches!(result, Err(RelayError::Connection(_))));
    }

    #[tokio::test]
    async fn invalid_role_is_rejected() {
        let result = Agent::builder("bad/role")
            .transport(MemoryBroker::new())
            .auto_connect(false)
            .build()
            .await;
        assert!(matches!(result, Err(RelayError::MalformedAddress { .. })));
    }

    #[tokio::test]
    async fn overrides_apply_on_top_of_config() -> anyhow::Result<()> {
        let agent = Agent::builder("tester")
            .broker(BrokerOptions::websocket())
            .broker_overrides(BrokerOverrides::new().host("10.1.1.1"))
            .transport(MemoryBroker::new())
            .auto_connect(false)
            .build()
            .await?;
        assert_eq!(agent.broker_uri(), "ws://10.1.1.1:15675/ws");
        assert_eq!(agent.state(), ConnectionState::Initialised);
        Ok(())
    }
}
