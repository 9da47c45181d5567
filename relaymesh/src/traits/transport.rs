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

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::common::{BrokerOptions, PublishOptions, QoS};
use crate::message::InboundMessage;

/// A freshly opened connection.
///
/// `inbound` is the connection's single message hook: every message the broker
/// delivers on any subscription arrives here, in broker order. It is consumed by
/// exactly one dispatcher.
pub struct Connection {
    /// The live handle, shared by every channel of the agent.
    pub handle: Arc<dyn TransportHandle>,
    /// Every message delivered on this connection.
    pub inbound: mpsc::UnboundedReceiver<InboundMessage>,
}

impl Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}

/// Opens connections to a pub/sub broker.
#[async_trait]
pub trait Transport: Debug + Send + Sync + 'static {
    /// Connects using `options`, identifying as `client_id`.
    ///
    /// Resolves once the broker has accepted the connection. There is no timeout
    /// at this layer beyond whatever the transport itself applies.
    async fn connect(&self, options: &BrokerOptions, client_id: &str) -> anyhow::Result<Connection>;
}

/// A live connection to a broker.
#[async_trait]
pub trait TransportHandle: Debug + Send + Sync + 'static {
    /// Subscribes to `pattern`, resolving once the broker has acknowledged.
    async fn subscribe(&self, pattern: &str, qos: QoS) -> anyhow::Result<()>;

    /// Publishes `payload` on `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>, options: PublishOptions) -> anyhow::Result<()>;

    /// Closes the connection gracefully.
    async fn end(&self) -> anyhow::Result<()>;

    /// The transport's own view of whether the connection is still up.
    ///
    /// A connection can drop without anyone above the transport being told, so
    /// this is polled rather than cached.
    fn is_live(&self) -> bool;
}
