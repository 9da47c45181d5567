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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, error, info, trace, warn};

use crate::common::{BrokerOptions, BrokerOverrides, PublishOptions, QoS, RelayError};
use crate::message::InboundMessage;
use crate::traits::{Connection, Transport, TransportHandle};

/// Where an agent's single broker connection stands.
///
/// ```text
/// Initialised --connect--> Connecting --ok--> Connected --disconnect--> Initialised
///                               |
///                               +--err--> Errored --connect--> Connecting
///                               |
///                               +--disconnect--> Initialised
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection, none attempted since the last disconnect.
    #[default]
    Initialised,
    /// A connect attempt is in flight.
    Connecting,
    /// The transport accepted the connection.
    Connected,
    /// The last connect attempt failed.
    Errored,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Initialised => "initialised",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Owns an agent's transport connection.
///
/// The manager holds the only reference to the live [`TransportHandle`]. Channels
/// hold the manager and ask for the handle at call time, so a reconnect is picked
/// up everywhere without any channel being touched.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    options: BrokerOptions,
    client_id: String,
    state: RwLock<ConnectionState>,
    handle: RwLock<Option<Arc<dyn TransportHandle>>>,
    /// Bumped by every connect attempt and every disconnect. A connect only
    /// commits its result if nothing bumped it in the meantime.
    generation: AtomicU64,
}

impl fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("transport", &self.transport)
            .field("options", &self.options)
            .field("client_id", &self.client_id)
            .field("state", &*self.state.read())
            .field("has_handle", &self.handle.read().is_some())
            .finish()
    }
}

impl ConnectionManager {
    /// Creates a manager in [`ConnectionState::Initialised`].
    pub(crate) fn new(
        transport: Arc<dyn Transport>,
        options: BrokerOptions,
        client_id: String,
    ) -> Self {
        Self {
            transport,
            options,
            client_id,
            state: RwLock::new(ConnectionState::Initialised),
            handle: RwLock::new(None),
            generation: AtomicU64::new(0),
        }
    }

    /// The broker options every connect starts from.
    pub(crate) const fn options(&self) -> &BrokerOptions {
        &self.options
    }

    /// The id presented to the broker.
    pub(crate) fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Current state.
    pub(crate) fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Connects with `overrides` applied on top of the base options.
    ///
    /// On success the connection's inbound hook is returned so the caller can
    /// attach a dispatcher. On failure the state becomes `Errored`, the handle is
    /// cleared and the error is returned. There is no retry here.
    ///
    /// A [`disconnect`](Self::disconnect) while the transport is still connecting
    /// wins: the new connection is closed and an error is returned.
    pub(crate) async fn connect_with(
        &self,
        overrides: &BrokerOverrides,
    ) -> Result<mpsc::UnboundedReceiver<InboundMessage>, RelayError> {
        let (stale, attempt) = {
            let mut state = self.state.write();
            match *state {
                ConnectionState::Connecting => {
                    return Err(RelayError::InvalidState {
                        state: *state,
                        operation: "connect".to_string(),
                    });
                }
                ConnectionState::Connected if self.handle_is_live() => {
                    return Err(RelayError::InvalidState {
                        state: *state,
                        operation: "connect".to_string(),
                    });
                }
                _ => {}
            }
            *state = ConnectionState::Connecting;
            let attempt = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
            (self.handle.write().take(), attempt)
        };
        if let Some(stale) = stale {
            warn!(client_id = %self.client_id, "Replacing a connection the transport reports as dead");
            if let Err(e) = stale.end().await {
                debug!("Closing dead connection failed: {e:#}");
            }
        }

        let options = self.options.merged(overrides);
        info!(client_id = %self.client_id, ?options, "Connecting to broker at {}", options.uri());

        match self.transport.connect(&options, &self.client_id).await {
            Ok(Connection { handle, inbound }) => {
                let committed = {
                    let mut state = self.state.write();
                    if *state == ConnectionState::Connecting && self.is_current(attempt) {
                        *self.handle.write() = Some(handle.clone());
                        *state = ConnectionState::Connected;
                        true
                    } else {
                        false
                    }
                };
                if !committed {
                    warn!(client_id = %self.client_id, "Disconnected while connecting; closing the new connection");
                    if let Err(e) = handle.end().await {
                        debug!("Closing abandoned connection failed: {e:#}");
                    }
                    return Err(RelayError::Connection(format!(
                        "{}: disconnected while connecting",
                        options.uri()
                    )));
                }
                info!(client_id = %self.client_id, "Connected to broker at {}", options.uri());
                Ok(inbound)
            }
            Err(e) => {
                {
                    let mut state = self.state.write();
                    if *state == ConnectionState::Connecting && self.is_current(attempt) {
                        *self.handle.write() = None;
                        *state = ConnectionState::Errored;
                    }
                }
                error!(client_id = %self.client_id, "Failed to connect to {}: {e:#}", options.uri());
                Err(RelayError::Connection(format!("{}: {e:#}", options.uri())))
            }
        }
    }

    /// Closes the connection, if any, and returns to `Initialised`.
    pub(crate) async fn disconnect(&self) {
        let handle = self.release();
        if let Some(handle) = handle {
            if let Err(e) = handle.end().await {
                warn!(client_id = %self.client_id, "Transport reported an error while closing: {e:#}");
            }
            info!(client_id = %self.client_id, "Disconnected");
        } else {
            trace!(client_id = %self.client_id, "Disconnect with no connection");
        }
    }

    /// Forgets the current connection without closing it and returns to
    /// `Initialised`. Any connect in flight is abandoned when it completes.
    pub(crate) fn release(&self) -> Option<Arc<dyn TransportHandle>> {
        let mut state = self.state.write();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *state = ConnectionState::Initialised;
        self.handle.write().take()
    }

    /// `true` only if a handle is stored, the transport says it is live, and the
    /// state is `Connected`. Any disagreement between the three reads as not connected.
    pub(crate) fn is_connected(&self) -> bool {
        let state = self.state();
        let (has_handle, handle_live) = match self.handle.read().as_ref() {
            Some(handle) => (true, handle.is_live()),
            None => (false, false),
        };
        let connected = state == ConnectionState::Connected && has_handle && handle_live;
        if !connected && (state == ConnectionState::Connected || has_handle) {
            debug!(
                %state,
                has_handle,
                handle_live,
                "Connection signals disagree; reporting not connected"
            );
        }
        connected
    }

    /// The live handle, or `None` if [`is_connected`](Self::is_connected) is false.
    pub(crate) fn live_handle(&self) -> Option<Arc<dyn TransportHandle>> {
        if self.is_connected() {
            self.handle.read().clone()
        } else {
            None
        }
    }

    pub(crate) async fn subscribe(&self, pattern: &str, qos: QoS) -> Result<(), RelayError> {
        let handle = self.live_handle().ok_or_else(|| RelayError::Subscription {
            topic: pattern.to_string(),
            reason: "not connected".to_string(),
        })?;
        handle
            .subscribe(pattern, qos)
            .await
            .map_err(|e| RelayError::Subscription {
                topic: pattern.to_string(),
                reason: format!("{e:#}"),
            })
    }

    pub(crate) async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        options: PublishOptions,
    ) -> Result<(), RelayError> {
        let handle = self
            .live_handle()
            .ok_or_else(|| RelayError::PublishWithoutConnection {
                topic: topic.to_string(),
            })?;
        trace!(topic, bytes = payload.len(), qos = %options.qos, retain = options.retain, "Publishing");
        handle
            .publish(topic, payload, options)
            .await
            .map_err(|e| RelayError::Publish {
                topic: topic.to_string(),
                reason: format!("{e:#}"),
            })
    }

    fn is_current(&self, attempt: u64) -> bool {
        self.generation.load(Ordering::Acquire) == attempt
    }

    fn handle_is_live(&self) -> bool {
        self.handle.read().as_ref().is_some_and(|handle| handle.is_live())
    }
}
