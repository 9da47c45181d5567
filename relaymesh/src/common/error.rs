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

//! Error type shared by every relaymesh operation.

use std::fmt;

use crate::common::ConnectionState;

/// Errors surfaced by agents, channels and the address layer.
///
/// Construction-time and connection-time failures are returned to the caller.
/// Dispatch-time failures (undecodable payloads, panicking callbacks) never
/// surface here; they are logged per receiver by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The transport failed to connect. The agent is left in
    /// [`ConnectionState::Errored`] and may be connected again.
    Connection(String),

    /// Subscribing a receiver's pattern on the transport failed.
    Subscription {
        /// The pattern that could not be subscribed.
        topic: String,
        /// Transport-supplied reason.
        reason: String,
    },

    /// A channel name, topic or receiver pattern is not a valid address.
    MalformedAddress {
        /// The offending name or topic, verbatim.
        address: String,
        /// What is wrong with it.
        reason: String,
    },

    /// A channel was requested while the agent is configured to auto-connect
    /// but has no live connection.
    NotConnected {
        /// The operation that required a connection.
        operation: String,
    },

    /// A publish was attempted without a live connection.
    PublishWithoutConnection {
        /// The topic the message was meant for.
        topic: String,
    },

    /// The transport rejected a publish.
    Publish {
        /// Destination topic.
        topic: String,
        /// Transport-supplied reason.
        reason: String,
    },

    /// A payload could not be encoded.
    Encode(String),

    /// A payload could not be decoded.
    Decode(String),

    /// A channel with this name exists but carries a different payload type.
    ChannelTypeMismatch {
        /// Channel name.
        name: String,
    },

    /// The requested operation is not valid from the current connection state.
    InvalidState {
        /// State the connection was in.
        state: ConnectionState,
        /// The operation that was refused.
        operation: String,
    },

    /// Configuration could not be read or parsed.
    Config(String),
}

impl RelayError {
    pub(crate) fn malformed(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedAddress {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_connected(operation: impl Into<String>) -> Self {
        Self::NotConnected {
            operation: operation.into(),
        }
    }
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "Connection error: {e}"),
            Self::Subscription { topic, reason } => {
                write!(f, "Subscription to \"{topic}\" failed: {reason}")
            }
            Self::MalformedAddress { address, reason } => {
                write!(f, "Malformed address \"{address}\": {reason}")
            }
            Self::NotConnected { operation } => {
                write!(f, "Cannot {operation}: agent is not connected and auto-connect is enabled")
            }
            Self::PublishWithoutConnection { topic } => {
                write!(f, "Cannot publish on \"{topic}\": not connected")
            }
            Self::Publish { topic, reason } => write!(f, "Publish on \"{topic}\" failed: {reason}"),
            Self::Encode(e) => write!(f, "Encode error: {e}"),
            Self::Decode(e) => write!(f, "Decode error: {e}"),
            Self::ChannelTypeMismatch { name } => {
                write!(f, "Channel \"{name}\" already exists with a different payload type")
            }
            Self::InvalidState { state, operation } => {
                write!(f, "Cannot {operation} while {state}")
            }
            Self::Config(e) => write!(f, "Configuration error: {e}"),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<rmp_serde::encode::Error> for RelayError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Self::Encode(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for RelayError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        Self::Config(err.to_string())
    }
}
