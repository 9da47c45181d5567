//! The agent facade and the machinery behind it.
//!
//! # Key Re-exported Components:
//!
//! *   [`Agent`]: owns one identity, one connection and every channel created from it.
//! *   [`AgentBuilder`]: resolves configuration once and builds an [`Agent`].
//! *   [`ConnectionState`]: the connect/disconnect state machine.
//! *   [`RelayConfig`]: configuration, loadable from XDG locations.
//! *   [`RelayError`]: the error type for every fallible operation.
//!
//! Internally, the connection manager owns the transport handle, the channel
//! registry tracks senders and receivers per direction, and the dispatcher
//! routes inbound messages to receivers.

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

// --- Public Re-exports ---
pub use agent::Agent;
pub use agent_builder::AgentBuilder;
pub use config::{BrokerOptions, BrokerOverrides, ChannelDefaults, RelayConfig};
pub use connection::ConnectionState;
pub use error::RelayError;
pub use types::{PublishOptions, QoS};

// --- Crate-Internal Re-exports ---
pub(crate) use connection::ConnectionManager;
pub(crate) use dispatcher::Dispatcher;
pub(crate) use registry::{ChannelRegistry, Registration};

// --- Submodules ---

/// Defines the [`Agent`] facade.
mod agent;
/// Defines [`AgentBuilder`].
mod agent_builder;
/// Defines the configuration system.
pub mod config;
/// Defines [`ConnectionState`] and the connection manager.
mod connection;
/// Defines the inbound dispatch loop.
mod dispatcher;
/// Defines [`RelayError`].
mod error;
/// Defines the sender/receiver registry.
mod registry;
/// Shared value types.
mod types;
