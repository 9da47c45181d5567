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

//! MessagePack codec for channel payloads.
//!
//! Structs are written as maps with field names, so agents written in other
//! languages can decode them without sharing a schema.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::RelayError;

/// Encodes a value as MessagePack with named fields.
///
/// # Errors
///
/// Returns [`RelayError::Encode`] if the value cannot be serialized.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, RelayError> {
    rmp_serde::to_vec_named(value)
        .map_err(|e| RelayError::Encode(format!("MessagePack serialization failed: {e}")))
}

/// Decodes MessagePack bytes into a value.
///
/// # Errors
///
/// Returns [`RelayError::Decode`] if the bytes are not a valid encoding of `T`.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, RelayError> {
    rmp_serde::from_slice(bytes)
        .map_err(|e| RelayError::Decode(format!("MessagePack deserialization failed: {e}")))
}
