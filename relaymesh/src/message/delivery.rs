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

/// A decoded message handed to receiver callbacks.
///
/// `payload` is `None` when the message carried zero bytes. Empty messages are
/// passed through without decoding, which lets agents use a channel as a plain
/// "ping" signal.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery<T> {
    /// The concrete topic the message arrived on.
    pub topic: String,
    /// The decoded payload, or `None` for an empty message.
    pub payload: Option<T>,
}

impl<T> Delivery<T> {
    /// `true` if the message carried no payload bytes.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.payload.is_none()
    }
}
