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

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::address::{validate_channel_name, AgentIdentity, TopicAddress, TopicPattern};
use crate::channel::{
    ChannelDefinition, ChannelDirection, ChannelOptions, Receiver, ReceiverInner, ReceiverSlot,
    Sender, SenderInner,
};
use crate::common::{
    AgentBuilder, BrokerOverrides, ChannelDefaults, ChannelRegistry, ConnectionManager,
    ConnectionState, Dispatcher, PublishOptions, QoS, Registration, RelayError,
};

/// A participant on the broker: one identity, one connection, many channels.
///
/// Build one with [`Agent::builder`]. Channels created from an agent share its
/// connection; inbound messages are routed to receivers by a single dispatch
/// task started on every successful [`connect`](Self::connect).
///
/// Dropping the agent stops dispatch. Call [`disconnect`](Self::disconnect)
/// first for a graceful close.
///
/// # Example
///
/// ```rust,ignore
/// use relaymesh::prelude::*;
///
/// #[relay_message]
/// struct Reading { value: f32 }
///
/// let agent = Agent::builder("sensor").instance_id("left").build().await?;
/// let readings = agent.create_sender::<Reading>("readings")?;
/// readings.send(&Reading { value: 0.5 }).await?;
/// ```
pub struct Agent {
    identity: AgentIdentity,
    connection: Arc<ConnectionManager>,
    registry: Arc<ChannelRegistry>,
    channel_defaults: ChannelDefaults,
    auto_connect: bool,
    dispatcher: Mutex<Option<Dispatcher>>,
}

impl fmt::Debug for Agent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent")
            .field("identity", &self.identity)
            .field("connection", &self.connection)
            .field("registry", &self.registry)
            .field("auto_connect", &self.auto_connect)
            .field(
                "dispatching",
                &self
                    .dispatcher
                    .lock()
                    .as_ref()
                    .is_some_and(|dispatcher| !dispatcher.is_finished()),
            )
            .finish()
    }
}

impl Agent {
    /// Starts building an agent with the given role.
    pub fn builder(role: impl Into<String>) -> AgentBuilder {
        AgentBuilder::new(role)
    }

    pub(crate) fn new(
        identity: AgentIdentity,
        connection: ConnectionManager,
        channel_defaults: ChannelDefaults,
        auto_connect: bool,
    ) -> Self {
        Self {
            identity,
            connection: Arc::new(connection),
            registry: Arc::new(ChannelRegistry::new()),
            channel_defaults,
            auto_connect,
            dispatcher: Mutex::new(None),
        }
    }

    /// The agent's role and instance id.
    #[must_use]
    pub const fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    /// The role.
    #[must_use]
    pub fn role(&self) -> &str {
        self.identity.role()
    }

    /// The instance id, if one was given.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.identity.instance_id()
    }

    /// The id this agent presents to the broker.
    #[must_use]
    pub fn client_id(&self) -> &str {
        self.connection.client_id()
    }

    /// Whether channels require a live connection when created.
    #[must_use]
    pub const fn auto_connect(&self) -> bool {
        self.auto_connect
    }

    /// Connection state as last recorded. See [`is_connected`](Self::is_connected)
    /// for a check that also asks the transport.
    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// `true` only if the state is `Connected`, a handle is held, and the transport
    /// reports the connection as live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    /// The broker URI, `protocol://host:port{path}`.
    #[must_use]
    pub fn broker_uri(&self) -> String {
        self.connection.options().uri()
    }

    /// `(role, instance id or "any", broker URI)`.
    #[must_use]
    pub fn description(&self) -> (String, String, String) {
        (
            self.identity.role().to_string(),
            self.identity.instance_id().unwrap_or("any").to_string(),
            self.broker_uri(),
        )
    }

    /// Connects using the options the agent was built with.
    ///
    /// # Errors
    ///
    /// See [`connect_with`](Self::connect_with).
    pub async fn connect(&self) -> Result<(), RelayError> {
        self.connect_with(&BrokerOverrides::default()).await
    }

    /// Connects with `overrides` applied for this attempt only.
    ///
    /// On success a fresh dispatch task is started and every registered receiver
    /// is subscribed, including ones created while the agent was disconnected.
    /// There is no retry: on failure the state is `Errored` and the caller decides
    /// what to do next.
    ///
    /// # Errors
    ///
    /// [`RelayError::Connection`] if the transport fails, or
    /// [`RelayError::InvalidState`] if a connect is already in flight or a live
    /// connection exists.
    #[instrument(skip(self, overrides), fields(role = %self.identity.role()))]
    pub async fn connect_with(&self, overrides: &BrokerOverrides) -> Result<(), RelayError> {
        let inbound = self.connection.connect_with(overrides).await?;
        let dispatcher = Dispatcher::spawn(
            self.registry.clone(),
            inbound,
            self.connection.client_id().to_string(),
        );
        if let Some(previous) = self.dispatcher.lock().replace(dispatcher) {
            previous.stop();
        }
        self.subscribe_all().await;
        Ok(())
    }

    /// Stops dispatch and closes the connection. The agent can connect again.
    #[instrument(skip(self), fields(role = %self.identity.role()))]
    pub async fn disconnect(&self) {
        let dispatcher = self.dispatcher.lock().take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.stop();
        }
        for receiver in self.registry.receivers() {
            receiver.mark_subscribed(false);
        }
        self.connection.disconnect().await;
    }

    /// Creates (or returns the existing) sender called `name` with default options.
    ///
    /// # Errors
    ///
    /// See [`create_sender_with`](Self::create_sender_with).
    pub fn create_sender<T>(&self, name: &str) -> Result<Sender<T>, RelayError>
    where
        T: 'static,
    {
        self.create_sender_with(name, ChannelOptions::default())
    }

    /// Creates a sender called `name`, or returns the existing one.
    ///
    /// The topic is `role/name[/instance]`, taking role and instance from
    /// `options` first and the agent's identity second, unless
    /// `options.override_topic` is set.
    ///
    /// # Errors
    ///
    /// * [`RelayError::MalformedAddress`] if `name` or an override is not a valid segment.
    /// * [`RelayError::NotConnected`] if the agent auto-connects but is not connected.
    /// * [`RelayError::ChannelTypeMismatch`] if `name` exists with another payload type.
    pub fn create_sender_with<T>(&self, name: &str, options: ChannelOptions) -> Result<Sender<T>, RelayError>
    where
        T: 'static,
    {
        validate_channel_name(name)?;
        let registration = self
            .registry
            .sender_or_insert_with(name, options.ignore_existing, || {
                self.require_connection(name, ChannelDirection::Sender)?;
                let topic = match &options.override_topic {
                    Some(topic) => topic.clone(),
                    None => TopicAddress::for_sender(
                        name,
                        &self.identity,
                        options.role.as_deref(),
                        options.instance_id.as_deref(),
                    )?
                    .to_string(),
                };
                Ok(SenderInner::new(
                    ChannelDefinition::new(name, topic, ChannelDirection::Sender),
                    PublishOptions::new(
                        options.qos.unwrap_or(self.channel_defaults.qos),
                        options.retain.unwrap_or(self.channel_defaults.retain),
                    ),
                    self.connection.clone(),
                ))
            })?;

        Ok(match registration {
            Registration::Existing(sender) => sender,
            Registration::Created(sender) => {
                info!(channel = %name, topic = %sender.topic(), "Created sender");
                sender
            }
        })
    }

    /// Creates (or returns the existing) receiver called `name` with default options.
    ///
    /// # Errors
    ///
    /// See [`create_receiver_with`](Self::create_receiver_with).
    pub async fn create_receiver<T>(&self, name: &str) -> Result<Receiver<T>, RelayError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.create_receiver_with(name, ChannelOptions::default()).await
    }

    /// Creates a receiver called `name` and subscribes it, or returns the existing one.
    ///
    /// The pattern is `role/name/instance` with role defaulting to `+` and
    /// instance to `#`, unless `options.override_topic` is set.
    ///
    /// If the agent does not auto-connect and is not connected, the receiver is
    /// registered without subscribing; the next [`connect`](Self::connect)
    /// subscribes it. A failed subscribe is logged and the receiver is still
    /// returned; retry with [`subscribe`](Self::subscribe).
    ///
    /// # Errors
    ///
    /// * [`RelayError::MalformedAddress`] if `name`, an override, or the resulting
    ///   pattern is malformed (a wildcarded channel name in particular).
    /// * [`RelayError::NotConnected`] if the agent auto-connects but is not connected.
    /// * [`RelayError::ChannelTypeMismatch`] if `name` exists with another payload type.
    #[instrument(skip(self, options), fields(role = %self.identity.role()))]
    pub async fn create_receiver_with<T>(
        &self,
        name: &str,
        options: ChannelOptions,
    ) -> Result<Receiver<T>, RelayError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        validate_channel_name(name)?;
        let registration = self
            .registry
            .receiver_or_insert_with(name, options.ignore_existing, || {
                self.require_connection(name, ChannelDirection::Receiver)?;
                let topic = match &options.override_topic {
                    Some(topic) => topic.clone(),
                    None => TopicAddress::for_receiver(
                        name,
                        options.role.as_deref(),
                        options.instance_id.as_deref(),
                    )?
                    .to_string(),
                };
                let pattern = TopicPattern::parse(&topic)?;
                Ok(ReceiverInner::new(
                    ChannelDefinition::new(name, topic, ChannelDirection::Receiver),
                    pattern,
                    options.qos.unwrap_or(self.channel_defaults.qos),
                ))
            })?;

        let receiver = match registration {
            Registration::Existing(receiver) => return Ok(receiver),
            Registration::Created(receiver) => receiver,
        };
        info!(channel = %name, topic = %receiver.topic(), "Created receiver");

        if self.connection.is_connected() {
            if let Err(e) = self.subscribe_slot(receiver.inner().as_ref()).await {
                error!(channel = %name, "{e}");
            }
        } else {
            warn!(
                channel = %name,
                topic = %receiver.topic(),
                "Not connected; subscription deferred until connect"
            );
        }
        Ok(receiver)
    }

    /// Subscribes `receiver`'s pattern on the current connection.
    ///
    /// # Errors
    ///
    /// [`RelayError::Subscription`] if there is no live connection or the
    /// transport rejects the subscription.
    pub async fn subscribe<T>(&self, receiver: &Receiver<T>) -> Result<(), RelayError>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.subscribe_slot(receiver.inner().as_ref()).await
    }

    /// Publishes `payload` on an arbitrary topic, bypassing channels.
    ///
    /// # Errors
    ///
    /// [`RelayError::PublishWithoutConnection`] if not connected, or
    /// [`RelayError::Publish`] if the transport rejects the message.
    pub async fn publish_raw(
        &self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Result<(), RelayError> {
        self.connection
            .publish(topic, payload.to_vec(), PublishOptions::new(qos, retain))
            .await
    }

    /// Definitions of every sender, in creation order.
    #[must_use]
    pub fn sender_definitions(&self) -> Vec<ChannelDefinition> {
        self.registry.sender_definitions()
    }

    /// Definitions of every receiver, in creation order.
    #[must_use]
    pub fn receiver_definitions(&self) -> Vec<ChannelDefinition> {
        self.registry.receiver_definitions()
    }

    fn require_connection(&self, name: &str, direction: ChannelDirection) -> Result<(), RelayError> {
        if self.auto_connect && !self.connection.is_connected() {
            return Err(RelayError::not_connected(format!("create {direction} \"{name}\"")));
        }
        Ok(())
    }

    async fn subscribe_slot(&self, receiver: &dyn ReceiverSlot) -> Result<(), RelayError> {
        let pattern = receiver.pattern().as_str();
        match self.connection.subscribe(pattern, receiver.qos()).await {
            Ok(()) => {
                receiver.mark_subscribed(true);
                trace!(channel = %receiver.definition().name(), pattern, "Subscribed");
                Ok(())
            }
            Err(e) => {
                receiver.mark_subscribed(false);
                Err(e)
            }
        }
    }

    async fn subscribe_all(&self) {
        for receiver in self.registry.receivers() {
            if let Err(e) = self.subscribe_slot(receiver.as_ref()).await {
                error!(channel = %receiver.definition().name(), "{e}");
            }
        }
    }
}

impl Drop for Agent {
    fn drop(&mut self) {
        if let Some(dispatcher) = self.dispatcher.get_mut().take() {
            dispatcher.stop();
        }
        // Senders keep the connection manager alive past the agent.
        let Some(handle) = self.connection.release() else {
            return;
        };
        let client_id = self.connection.client_id().to_string();
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    if let Err(e) = handle.end().await {
                        debug!(%client_id, "Closing connection of dropped agent failed: {e:#}");
                    }
                });
            }
            Err(_) => {
                debug!(%client_id, "No runtime to close the connection of a dropped agent on");
            }
        }
    }
}
