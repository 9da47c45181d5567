//! Named, directional endpoints bound to a topic.
//!
//! A [`Sender`] publishes on one concrete topic. A [`Receiver`] subscribes with a
//! pattern and hands matching, decoded messages to its callbacks. Both are cheap
//! handles: cloning one yields another handle to the same channel.

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

use std::fmt;

use crate::common::QoS;

// --- Public Re-exports ---
pub use receiver::Receiver;
pub use sender::Sender;

// --- Crate-Internal Re-exports ---
pub(crate) use receiver::{ReceiverInner, ReceiverSlot};
pub(crate) use sender::SenderInner;

// --- Submodules ---

/// Defines [`Receiver`] and its callback list.
mod receiver;
/// Defines [`Sender`].
mod sender;

/// Which way a channel points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelDirection {
    /// Publishes messages.
    Sender,
    /// Receives messages.
    Receiver,
}

impl fmt::Display for ChannelDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sender => f.write_str("sender"),
            Self::Receiver => f.write_str("receiver"),
        }
    }
}

/// A channel's name, topic and direction. Fixed when the channel is created.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelDefinition {
    name: String,
    topic: String,
    direction: ChannelDirection,
}

impl ChannelDefinition {
    pub(crate) fn new(name: impl Into<String>, topic: impl Into<String>, direction: ChannelDirection) -> Self {
        Self {
            name: name.into(),
            topic: topic.into(),
            direction,
        }
    }

    /// The channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The publish topic (senders) or subscription pattern (receivers).
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Sender or receiver.
    #[must_use]
    pub const fn direction(&self) -> ChannelDirection {
        self.direction
    }
}

impl fmt::Display for ChannelDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} \"{}\" on {}", self.direction, self.name, self.topic)
    }
}

/// Per-channel overrides used when creating a sender or receiver.
///
/// Anything left unset falls back to the agent's identity and channel defaults.
///
/// ```rust,ignore
/// let options = ChannelOptions::new().instance_id("left").qos(QoS::ExactlyOnce);
/// let sender = agent.create_sender_with::<Reading>("readings", options)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelOptions {
    /// Role segment override.
    pub role: Option<String>,
    /// Instance segment override.
    pub instance_id: Option<String>,
    /// Use this topic verbatim instead of building one.
    pub override_topic: Option<String>,
    /// QoS for this channel.
    pub qos: Option<QoS>,
    /// Retain flag for this channel's publishes.
    pub retain: Option<bool>,
    /// Always create a new channel, even if one with this name exists.
    pub ignore_existing: bool,
}

impl ChannelOptions {
    /// No overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the role segment.
    #[must_use]
    pub fn role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    /// Overrides the instance segment.
    #[must_use]
    pub fn instance_id(mut self, instance_id: impl Into<String>) -> Self {
        self.instance_id = Some(instance_id.into());
        self
    }

    /// Uses `topic` as-is. Wildcard legality is then the caller's problem.
    #[must_use]
    pub fn override_topic(mut self, topic: impl Into<String>) -> Self {
        self.override_topic = Some(topic.into());
        self
    }

    /// Sets the QoS.
    #[must_use]
    pub const fn qos(mut self, qos: QoS) -> Self {
        self.qos = Some(qos);
        self
    }

    /// Sets the retain flag.
    #[must_use]
    pub const fn retain(mut self, retain: bool) -> Self {
        self.retain = Some(retain);
        self
    }

    /// Forces creation of a new channel even if the name is taken.
    #[must_use]
    pub const fn ignore_existing(mut self) -> Self {
        self.ignore_existing = true;
        self
    }
}
