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

//! Topic addressing.
//!
//! Every channel is bound to a topic of the form `role/channelName/instanceId`.
//! Senders publish on a fully specified topic; receivers subscribe with a pattern
//! that defaults to wildcards around the channel name:
//!
//! | direction | role                    | instance segment                   |
//! |-----------|-------------------------|------------------------------------|
//! | sender    | override, else agent's  | override, else agent's, else none  |
//! | receiver  | override, else `+`      | override, else `#`                 |
//!
//! A sender with no instance id at all publishes on the two-segment `role/channelName`.
//!
//! [`TopicPattern`] decides whether an inbound topic belongs to a receiver.

use std::fmt;
use std::str::FromStr;

use crate::common::RelayError;

mod matcher;

pub use matcher::{topic_matches, TopicPattern};

/// Matches exactly one topic segment.
pub const WILDCARD_SINGLE: &str = "+";

/// Matches all remaining topic segments. Only legal as the final segment.
pub const WILDCARD_MULTI: &str = "#";

/// Returns `true` if `topic_or_segment` contains either wildcard character.
#[must_use]
pub fn contains_wildcards(topic_or_segment: &str) -> bool {
    topic_or_segment.contains('+') || topic_or_segment.contains('#')
}

/// The role segment (index 0) of a topic.
#[must_use]
pub fn parse_agent_role(topic: &str) -> Option<&str> {
    topic.split('/').next()
}

/// The channel-name segment (index 1) of a topic.
#[must_use]
pub fn parse_channel_name(topic: &str) -> Option<&str> {
    topic.split('/').nth(1)
}

/// The instance segment (index 2) of a topic, if present.
#[must_use]
pub fn parse_instance_id(topic: &str) -> Option<&str> {
    topic.split('/').nth(2)
}

/// Who an agent is: a stable role plus an optional instance (or group) id.
///
/// Immutable once the agent is built.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AgentIdentity {
    role: String,
    instance_id: Option<String>,
}

impl AgentIdentity {
    /// Creates an identity, validating both parts as literal topic segments.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedAddress`] if the role or instance id is empty
    /// or contains `/`, `+` or `#`.
    pub fn new(role: impl Into<String>, instance_id: Option<String>) -> Result<Self, RelayError> {
        let role = role.into();
        validate_literal_segment(&role, "role")?;
        if let Some(id) = &instance_id {
            validate_literal_segment(id, "instance id")?;
        }
        Ok(Self { role, instance_id })
    }

    /// The agent's role.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The agent's instance id, if one was given.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }
}

/// A structured `role/channelName[/instanceId]` address.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicAddress {
    role: String,
    channel_name: String,
    instance_id: Option<String>,
}

impl TopicAddress {
    /// Builds the concrete publish address for a sender.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedAddress`] if any segment is empty, contains
    /// `/`, or contains a wildcard.
    pub fn for_sender(
        channel_name: &str,
        identity: &AgentIdentity,
        role_override: Option<&str>,
        instance_override: Option<&str>,
    ) -> Result<Self, RelayError> {
        validate_channel_name(channel_name)?;
        let role = role_override.unwrap_or(identity.role());
        validate_literal_segment(role, "sender role")?;
        let instance_id = instance_override.or(identity.instance_id());
        if let Some(id) = instance_id {
            validate_literal_segment(id, "sender instance id")?;
        }
        Ok(Self {
            role: role.to_string(),
            channel_name: channel_name.to_string(),
            instance_id: instance_id.map(str::to_string),
        })
    }

    /// Builds the subscription pattern for a receiver.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedAddress`] if the channel name is not a literal
    /// segment, or an override is not either a literal segment or a wildcard token.
    pub fn for_receiver(
        channel_name: &str,
        role_override: Option<&str>,
        instance_override: Option<&str>,
    ) -> Result<Self, RelayError> {
        validate_channel_name(channel_name)?;
        let role = role_override.unwrap_or(WILDCARD_SINGLE);
        if role != WILDCARD_SINGLE {
            validate_literal_segment(role, "receiver role")?;
        }
        let instance_id = instance_override.unwrap_or(WILDCARD_MULTI);
        if instance_id != WILDCARD_SINGLE && instance_id != WILDCARD_MULTI {
            validate_literal_segment(instance_id, "receiver instance id")?;
        }
        Ok(Self {
            role: role.to_string(),
            channel_name: channel_name.to_string(),
            instance_id: Some(instance_id.to_string()),
        })
    }

    /// The role segment.
    #[must_use]
    pub fn role(&self) -> &str {
        &self.role
    }

    /// The channel-name segment.
    #[must_use]
    pub fn channel_name(&self) -> &str {
        &self.channel_name
    }

    /// The instance segment, if the address has one.
    #[must_use]
    pub fn instance_id(&self) -> Option<&str> {
        self.instance_id.as_deref()
    }

    /// `true` if any segment is a wildcard, i.e. this is a subscription pattern.
    #[must_use]
    pub fn is_pattern(&self) -> bool {
        contains_wildcards(&self.role) || self.instance_id.as_deref().is_some_and(contains_wildcards)
    }
}

impl fmt::Display for TopicAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance_id {
            Some(id) => write!(f, "{}/{}/{}", self.role, self.channel_name, id),
            None => write!(f, "{}/{}", self.role, self.channel_name),
        }
    }
}

impl FromStr for TopicAddress {
    type Err = RelayError;

    /// Parses a two- or three-segment topic. Segments are taken verbatim.
    fn from_str(topic: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = topic.split('/').collect();
        match parts.as_slice() {
            [role, channel_name] => Ok(Self {
                role: (*role).to_string(),
                channel_name: (*channel_name).to_string(),
                instance_id: None,
            }),
            [role, channel_name, instance_id] => Ok(Self {
                role: (*role).to_string(),
                channel_name: (*channel_name).to_string(),
                instance_id: Some((*instance_id).to_string()),
            }),
            _ => Err(RelayError::malformed(
                topic,
                format!("expected 2 or 3 segments, found {}", parts.len()),
            )),
        }
    }
}

/// Checks that `name` can be used as the channel-name segment.
///
/// # Errors
///
/// Returns [`RelayError::MalformedAddress`] if the name is empty or contains `/`,
/// `+` or `#`. A wildcarded channel name is never a valid address.
pub fn validate_channel_name(name: &str) -> Result<(), RelayError> {
    validate_literal_segment(name, "channel name")
}

fn validate_literal_segment(segment: &str, what: &str) -> Result<(), RelayError> {
    if segment.is_empty() {
        return Err(RelayError::malformed(segment, format!("{what} must not be empty")));
    }
    if segment.contains('/') {
        return Err(RelayError::malformed(segment, format!("{what} must not contain '/'")));
    }
    if contains_wildcards(segment) {
        return Err(RelayError::malformed(
            segment,
            format!("{what} must not contain wildcards"),
        ));
    }
    Ok(())
}
