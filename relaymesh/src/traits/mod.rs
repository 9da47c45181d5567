//! Defines the contracts relaymesh places on the pub/sub transport underneath it.
//!
//! # Key Traits
//!
//! *   [`Transport`]: opens a connection to a broker.
//! *   [`TransportHandle`]: a live connection: subscribe, publish, close, liveness.
//!
//! Everything above this boundary (addressing, matching, dispatch) is transport
//! agnostic. See [`crate::transport`] for the bundled implementations.

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
pub use transport::{Connection, Transport, TransportHandle};

// --- Submodules ---

/// Defines the transport traits and the [`Connection`] they produce.
mod transport;
