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

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Relaymesh
//!
//! An addressing and routing layer over publish/subscribe brokers. Agents
//! exchange typed messages on named channels without agreeing on raw topic
//! strings: each topic is derived from the agent's role, an optional instance
//! id and the channel name, and receivers match inbound topics with partial
//! wildcards.
//!
//! ## Key Concepts
//!
//! - **Agents (`Agent`)**: one identity, one broker connection, many channels.
//! - **Addressing**: senders publish on `role/channelName[/instanceId]`;
//!   receivers subscribe on `+/channelName/#` unless narrowed.
//! - **Matching (`TopicPattern`)**: decides which receivers an inbound topic
//!   belongs to, independently of which broker subscription delivered it.
//! - **Channels (`Sender`, `Receiver`)**: typed endpoints; receivers carry
//!   persistent and one-shot callbacks.
//! - **Transports**: the broker client sits behind the `Transport` trait. An
//!   in-process `MemoryBroker` is always available; an MQTT client is behind
//!   the `mqtt` feature.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use relaymesh::prelude::*;
//!
//! #[relay_message]
//! struct Reading {
//!     value: f32,
//! }
//!
//! let broker = MemoryBroker::new();
//! let agent = Agent::builder("sensor").transport(broker).build().await?;
//! let readings = agent.create_receiver::<Reading>("readings").await?;
//! readings.on_message(|delivery| println!("{:?}", delivery.payload));
//! ```

/// Topic addressing and matching.
pub mod address;

/// Sender and receiver channels.
pub(crate) mod channel;

/// The agent facade, configuration, errors and internal machinery.
pub(crate) mod common;

/// Message envelopes and the payload codec.
pub(crate) mod message;

/// The transport boundary.
pub(crate) mod traits;

/// Bundled transport implementations.
pub mod transport;

pub use message::codec;

/// Configuration types and loading.
pub mod config {
    pub use crate::common::config::*;
}

/// Transport-facing types for implementing [`Transport`](crate::traits::Transport)
/// outside this crate.
pub mod wire {
    pub use crate::message::InboundMessage;
    pub use crate::traits::{Connection, Transport, TransportHandle};
}

/// A prelude module for conveniently importing the most commonly used items.
///
/// # Re-exports
///
/// ## Macros (from `relaymesh-macro`)
/// *   [`relaymesh_macro::relay_message`]: Attribute macro for defining channel payloads.
///
/// ## External Crates
/// *   [`async_trait::async_trait`](https://docs.rs/async-trait/latest/async_trait/attr.async_trait.html): for implementing [`Transport`](crate::traits::Transport).
///
/// ## Core Types
/// *   [`crate::common::Agent`] and [`crate::common::AgentBuilder`].
/// *   [`crate::channel::Sender`], [`crate::channel::Receiver`] and their options and definitions.
/// *   [`crate::message::Delivery`]: what receiver callbacks are handed.
/// *   [`crate::common::RelayError`], [`crate::common::ConnectionState`], [`crate::common::QoS`].
/// *   [`crate::common::RelayConfig`], [`crate::common::BrokerOptions`], [`crate::common::BrokerOverrides`].
/// *   [`crate::transport::MemoryBroker`] (and `MqttTransport` with the `mqtt` feature).
pub mod prelude {
    // Macros from relaymesh-macro
    pub use relaymesh_macro::*;

    // External crate re-exports
    pub use async_trait::async_trait;

    // Core types
    pub use crate::address::{AgentIdentity, TopicAddress, TopicPattern};
    pub use crate::channel::{ChannelDefinition, ChannelDirection, ChannelOptions, Receiver, Sender};
    pub use crate::common::{
        Agent, AgentBuilder, BrokerOptions, BrokerOverrides, ConnectionState, PublishOptions, QoS,
        RelayConfig, RelayError,
    };
    pub use crate::message::{Delivery, InboundMessage};
    pub use crate::traits::{Connection, Transport, TransportHandle};
    pub use crate::transport::MemoryBroker;
    #[cfg(feature = "mqtt")]
    pub use crate::transport::MqttTransport;
}
