//! Bundled [`Transport`](crate::traits::Transport) implementations.
//!
//! *   [`MemoryBroker`]: an in-process broker, always available.
//! *   [`MqttTransport`]: a real MQTT client over TCP or WebSocket, behind the
//!     `mqtt` feature.

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
pub use memory::{filter_matches, MemoryBroker};
#[cfg(feature = "mqtt")]
pub use mqtt::MqttTransport;

// --- Submodules ---

/// Defines [`MemoryBroker`].
mod memory;

/// MQTT transport backed by `rumqttc`.
///
/// Only available when the `mqtt` feature is enabled.
#[cfg(feature = "mqtt")]
mod mqtt;
