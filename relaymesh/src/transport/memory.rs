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

//! In-process broker.
//!
//! Routes messages between connections in the same process using MQTT topic
//! filter semantics. Useful wherever a real broker is unavailable or unwanted:
//! tests, demos, and agents that only talk to each other.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::common::{BrokerOptions, PublishOptions, QoS};
use crate::message::InboundMessage;
use crate::traits::{Connection, Transport, TransportHandle};

/// Internal identifier for a connection to a [`MemoryBroker`].
type ConnectionId = u64;

/// A connected client.
struct ClientEntry {
    /// The id the client presented on connect.
    client_id: String,
    /// Feeds the client's inbound message hook.
    sender: mpsc::UnboundedSender<InboundMessage>,
    /// Topic filters this client has subscribed to.
    filters: Vec<(String, QoS)>,
    /// Shared with the client's handle.
    live: Arc<AtomicBool>,
}

struct BrokerState {
    clients: DashMap<ConnectionId, ClientEntry>,
    retained: DashMap<String, Vec<u8>>,
    credentials: RwLock<Option<(String, String)>>,
    available: AtomicBool,
    next_id: AtomicU64,
    published: AtomicUsize,
}

/// An in-process pub/sub broker implementing [`Transport`].
///
/// Cloning yields another reference to the same broker, so several agents built
/// with clones of one `MemoryBroker` can talk to each other.
///
/// Beyond routing, the broker can simulate the failures an agent has to cope with:
///
/// * [`set_available(false)`](Self::set_available) makes every connect attempt fail.
/// * [`require_credentials`](Self::require_credentials) rejects connects with the
///   wrong username or password.
/// * [`drop_all_connections`](Self::drop_all_connections) silently kills every live
///   connection. Handles report `is_live() == false`, nothing else is signalled.
#[derive(Clone)]
pub struct MemoryBroker {
    state: Arc<BrokerState>,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBroker")
            .field("connection_count", &self.state.clients.len())
            .field("retained_count", &self.state.retained.len())
            .field("available", &self.state.available.load(Ordering::Acquire))
            .finish()
    }
}

impl MemoryBroker {
    /// Creates an empty, available broker that accepts any credentials.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(BrokerState {
                clients: DashMap::new(),
                retained: DashMap::new(),
                credentials: RwLock::new(None),
                available: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
                published: AtomicUsize::new(0),
            }),
        }
    }

    /// Only accept connections presenting exactly these credentials.
    pub fn require_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        *self.state.credentials.write() = Some((username.into(), password.into()));
    }

    /// Toggles whether connect attempts succeed. Existing connections are unaffected.
    pub fn set_available(&self, available: bool) {
        self.state.available.store(available, Ordering::Release);
    }

    /// Kills every live connection without telling the clients.
    ///
    /// Handles start reporting `is_live() == false` and stop receiving messages,
    /// but their inbound channels stay open.
    pub fn drop_all_connections(&self) {
        for client in self.state.clients.iter() {
            client.live.store(false, Ordering::Release);
        }
        debug!(connections = self.state.clients.len(), "Dropped all connections");
    }

    /// Publishes as if from an external client that is not connected through this API.
    pub fn publish(&self, topic: &str, payload: impl Into<Vec<u8>>, retain: bool) {
        self.state.route(topic, payload.into(), retain);
    }

    /// Number of connections that are still live.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.state
            .clients
            .iter()
            .filter(|client| client.live.load(Ordering::Acquire))
            .count()
    }

    /// Every filter `client_id` has subscribed to, in subscription order.
    #[must_use]
    pub fn subscriptions_of(&self, client_id: &str) -> Vec<String> {
        self.state
            .clients
            .iter()
            .filter(|client| client.client_id == client_id)
            .flat_map(|client| {
                client
                    .filters
                    .iter()
                    .map(|(filter, _)| filter.clone())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Retained payload currently stored for `topic`.
    #[must_use]
    pub fn retained(&self, topic: &str) -> Option<Vec<u8>> {
        self.state.retained.get(topic).map(|payload| payload.clone())
    }

    /// Total messages accepted for routing since the broker was created.
    #[must_use]
    pub fn published_count(&self) -> usize {
        self.state.published.load(Ordering::Relaxed)
    }
}

impl BrokerState {
    fn route(&self, topic: &str, payload: Vec<u8>, retain: bool) {
        self.published.fetch_add(1, Ordering::Relaxed);
        if retain {
            if payload.is_empty() {
                self.retained.remove(topic);
                trace!(topic, "Cleared retained message");
            } else {
                self.retained.insert(topic.to_string(), payload.clone());
            }
        }

        let mut delivered = 0usize;
        for client in self.clients.iter() {
            if !client.live.load(Ordering::Acquire) {
                continue;
            }
            if client
                .filters
                .iter()
                .any(|(filter, _)| filter_matches(filter, topic))
            {
                // One copy per client, however many of its filters overlap.
                if client
                    .sender
                    .send(InboundMessage::new(topic, payload.clone()))
                    .is_ok()
                {
                    delivered += 1;
                }
            }
        }
        trace!(topic, delivered, "Routed message");
    }
}

/// MQTT topic filter matching: `+` matches one level, a trailing `#` matches the
/// remaining levels including none.
#[must_use]
pub fn filter_matches(filter: &str, topic: &str) -> bool {
    let mut filter_levels = filter.split('/');
    let mut topic_levels = topic.split('/');
    loop {
        match (filter_levels.next(), topic_levels.next()) {
            (Some("#"), _) | (None, None) => return true,
            (Some("+"), Some(_)) => {}
            (Some(expected), Some(actual)) if expected == actual => {}
            _ => return false,
        }
    }
}

#[async_trait]
impl Transport for MemoryBroker {
    async fn connect(&self, options: &BrokerOptions, client_id: &str) -> anyhow::Result<Connection> {
        if !self.state.available.load(Ordering::Acquire) {
            bail!("broker at {} is unreachable", options.uri());
        }
        if let Some((username, password)) = self.state.credentials.read().as_ref() {
            if *username != options.username || *password != options.password {
                bail!("broker at {} refused connection: bad username or password", options.uri());
            }
        }

        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed);
        let live = Arc::new(AtomicBool::new(true));
        let (sender, inbound) = mpsc::unbounded_channel();
        self.state.clients.insert(
            id,
            ClientEntry {
                client_id: client_id.to_string(),
                sender,
                filters: Vec::new(),
                live: live.clone(),
            },
        );
        debug!(client_id, connection = id, "Client connected to memory broker");

        Ok(Connection {
            handle: Arc::new(MemoryHandle {
                state: self.state.clone(),
                id,
                live,
            }),
            inbound,
        })
    }
}

/// A live connection to a [`MemoryBroker`].
struct MemoryHandle {
    state: Arc<BrokerState>,
    id: ConnectionId,
    live: Arc<AtomicBool>,
}

impl std::fmt::Debug for MemoryHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHandle")
            .field("id", &self.id)
            .field("live", &self.live.load(Ordering::Acquire))
            .finish()
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
        if self.state.clients.remove(&self.id).is_some() {
            trace!(connection = self.id, "Connection handle dropped without end");
        }
    }
}

#[async_trait]
impl TransportHandle for MemoryHandle {
    async fn subscribe(&self, pattern: &str, qos: QoS) -> anyhow::Result<()> {
        if !self.is_live() {
            bail!("connection {} is closed", self.id);
        }
        let sender = {
            let mut client = self
                .state
                .clients
                .get_mut(&self.id)
                .ok_or_else(|| anyhow!("connection {} is unknown to the broker", self.id))?;
            if client.filters.iter().any(|(filter, _)| filter == pattern) {
                debug!(pattern, "Already subscribed; replacing QoS");
                client.filters.retain(|(filter, _)| filter != pattern);
            }
            client.filters.push((pattern.to_string(), qos));
            client.sender.clone()
        };

        // Retained messages go to the new subscriber straight away.
        for retained in self.state.retained.iter() {
            if filter_matches(pattern, retained.key()) {
                let _ = sender.send(InboundMessage::new(retained.key().as_str(), retained.value().clone()));
            }
        }
        trace!(pattern, %qos, connection = self.id, "Subscribed");
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, options: PublishOptions) -> anyhow::Result<()> {
        if !self.is_live() {
            bail!("connection {} is closed", self.id);
        }
        self.state.route(topic, payload, options.retain);
        Ok(())
    }

    async fn end(&self) -> anyhow::Result<()> {
        self.live.store(false, Ordering::Release);
        // Dropping the entry drops its sender, which closes the inbound channel.
        self.state.clients.remove(&self.id);
        debug!(connection = self.id, "Client disconnected from memory broker");
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
