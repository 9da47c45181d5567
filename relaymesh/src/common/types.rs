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

//! Small value types shared between channels, the connection manager and transports.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::common::RelayError;

/// Delivery-guarantee level handed to the transport.
///
/// Relaymesh never interprets this value; it is passed through on subscribe and
/// publish calls exactly as configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QoS {
    /// Fire and forget (level 0).
    AtMostOnce,
    /// Acknowledged delivery (level 1).
    #[default]
    AtLeastOnce,
    /// Assured single delivery (level 2).
    ExactlyOnce,
}

impl TryFrom<u8> for QoS {
    type Error = RelayError;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        match level {
            0 => Ok(Self::AtMostOnce),
            1 => Ok(Self::AtLeastOnce),
            2 => Ok(Self::ExactlyOnce),
            other => Err(RelayError::Config(format!("invalid QoS level {other}"))),
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

/// Options attached to every publish call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOptions {
    /// Delivery-guarantee level.
    pub qos: QoS,
    /// Ask the broker to retain the message for late subscribers.
    pub retain: bool,
}

impl PublishOptions {
    /// Creates publish options from their two parts.
    #[must_use]
    pub const fn new(qos: QoS, retain: bool) -> Self {
        Self { qos, retain }
    }
}
