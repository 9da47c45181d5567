//! Message envelopes and the payload codec.
//!
//! *   [`InboundMessage`]: a raw `(topic, bytes)` pair as handed over by the transport.
//! *   [`Delivery`]: what a receiver callback sees once the payload has been decoded.
//! *   [`codec`]: MessagePack encode/decode for channel payloads.

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
pub use delivery::Delivery;
pub use inbound::InboundMessage;

// --- Submodules ---

/// Payload encoding for channel messages.
pub mod codec;
/// Defines [`Delivery`].
mod delivery;
/// Defines [`InboundMessage`].
mod inbound;
