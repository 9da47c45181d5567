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

//! Receiver-side topic matching.
//!
//! Broker subscriptions overlap, so the dispatcher decides for itself whether an
//! inbound topic belongs to a receiver. The rules, in order:
//!
//! 1. `#` matches everything.
//! 2. A pattern without wildcards matches only the identical topic. Two-segment
//!    patterns are the exception: `role/channelName` has no instance segment and
//!    so accepts any instance (rule 4).
//! 3. Otherwise the channel-name segment (index 1) must be equal.
//! 4. If role (index 0) and instance (index 2) are both wildcards, the channel
//!    name alone decides. Otherwise each of role and instance must either be a
//!    wildcard in the pattern or equal the inbound segment. A missing instance
//!    segment in the pattern counts as a wildcard.
//!
//! Only the pattern is inspected for wildcards; the inbound topic is taken literally.

use std::fmt;
use std::str::FromStr;

use super::{contains_wildcards, WILDCARD_MULTI, WILDCARD_SINGLE};
use crate::common::RelayError;

/// A validated receiver pattern.
///
/// Parsing rejects patterns whose channel-name segment is missing or wildcarded,
/// so a malformed receiver is caught when it is created instead of silently
/// matching nothing at dispatch time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPattern {
    raw: String,
    kind: PatternKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PatternKind {
    All,
    Exact,
    Segments {
        role: Segment,
        channel_name: String,
        instance: Segment,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Any,
    Literal(String),
}

impl Segment {
    fn from_part(part: Option<&str>) -> Self {
        match part {
            Some(part) if !contains_wildcards(part) => Self::Literal(part.to_string()),
            _ => Self::Any,
        }
    }

    fn accepts(&self, incoming: Option<&str>) -> bool {
        match self {
            Self::Any => true,
            Self::Literal(expected) => incoming == Some(expected.as_str()),
        }
    }
}

impl TopicPattern {
    /// Parses and validates a receiver pattern.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedAddress`] when a wildcard is not a whole
    /// segment, `#` is not the final segment, or a wildcarded pattern has no
    /// literal channel-name segment.
    pub fn parse(pattern: &str) -> Result<Self, RelayError> {
        if pattern == WILDCARD_MULTI {
            return Ok(Self {
                raw: pattern.to_string(),
                kind: PatternKind::All,
            });
        }

        let parts: Vec<&str> = pattern.split('/').collect();
        let last = parts.len() - 1;
        for (index, part) in parts.iter().enumerate() {
            if part.contains('#') && (*part != WILDCARD_MULTI || index != last) {
                return Err(RelayError::malformed(
                    pattern,
                    "'#' must be a whole segment and the last one",
                ));
            }
            if part.contains('+') && *part != WILDCARD_SINGLE {
                return Err(RelayError::malformed(pattern, "'+' must be a whole segment"));
            }
        }

        if !contains_wildcards(pattern) && parts.len() != 2 {
            return Ok(Self {
                raw: pattern.to_string(),
                kind: PatternKind::Exact,
            });
        }

        let channel_name = match parts.get(1) {
            None => {
                return Err(RelayError::malformed(pattern, "no channel-name segment"));
            }
            Some(name) if contains_wildcards(name) => {
                return Err(RelayError::malformed(
                    pattern,
                    "channel-name segment must not be a wildcard",
                ));
            }
            Some(name) if name.is_empty() => {
                return Err(RelayError::malformed(pattern, "channel-name segment is empty"));
            }
            Some(name) => (*name).to_string(),
        };

        Ok(Self {
            raw: pattern.to_string(),
            kind: PatternKind::Segments {
                role: Segment::from_part(parts.first().copied()),
                channel_name,
                instance: Segment::from_part(parts.get(2).copied()),
            },
        })
    }

    /// Decides whether `incoming` belongs to the logical channel this pattern names.
    #[must_use]
    pub fn matches(&self, incoming: &str) -> bool {
        match &self.kind {
            PatternKind::All => true,
            PatternKind::Exact => self.raw == incoming,
            PatternKind::Segments {
                role,
                channel_name,
                instance,
            } => {
                let mut parts = incoming.split('/');
                let incoming_role = parts.next();
                let incoming_channel = parts.next();
                let incoming_instance = parts.next();

                if incoming_channel != Some(channel_name.as_str()) {
                    return false;
                }
                if *role == Segment::Any && *instance == Segment::Any {
                    return true;
                }
                role.accepts(incoming_role) && instance.accepts(incoming_instance)
            }
        }
    }

    /// The pattern exactly as it is subscribed on the transport.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The literal channel name this pattern is bound to, if it has one.
    #[must_use]
    pub fn channel_name(&self) -> Option<&str> {
        match &self.kind {
            PatternKind::Segments { channel_name, .. } => Some(channel_name),
            _ => None,
        }
    }
}

impl FromStr for TopicPattern {
    type Err = RelayError;

    fn from_str(pattern: &str) -> Result<Self, Self::Err> {
        Self::parse(pattern)
    }
}

impl fmt::Display for TopicPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// One-off form of [`TopicPattern::matches`].
///
/// # Errors
///
/// Returns [`RelayError::MalformedAddress`] if `pattern` is not a valid receiver pattern.
pub fn topic_matches(pattern: &str, incoming: &str) -> Result<bool, RelayError> {
    Ok(TopicPattern::parse(pattern)?.matches(incoming))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matches(pattern: &str, incoming: &str) -> bool {
        topic_matches(pattern, incoming).unwrap()
    }

    #[test]
    fn hash_matches_anything() {
        assert!(matches("#", "something/something/something"));
        assert!(matches("#", "not/even/a/standard/topic"));
        assert!(matches("#", "x"));
    }

    #[test]
    fn no_wildcards_means_exact() {
        assert!(matches("a/name/b", "a/name/b"));
        assert!(!matches("a/name/b", "a/name/c"));
        assert!(!matches("someType/someChannelName/someID", "other/someChannelName/otherGroup"));
        assert!(matches("one/two/three/four/five", "one/two/three/four/five"));
        assert!(!matches("one/two/three/four/five", "one/one/one/one/one"));
    }

    #[test]
    fn channel_name_only() {
        assert!(matches("+/name/#", "x/name"));
        assert!(matches("+/name/#", "x/name/y"));
        assert!(!matches("+/name/#", "x/otherName/y"));
        assert!(!matches("+/someChannelName/#", "something/someOtherChannelName.something"));
        assert!(matches("+/name", "x/name/y"));
    }

    #[test]
    fn role_and_channel_name() {
        assert!(matches("role/name/#", "role/name"));
        assert!(matches("role/name/#", "role/name/anything"));
        assert!(!matches("role/name/#", "otherRole/name"));
        assert!(!matches(
            "LidarConsolidation/trackedPoints/#",
            "LidarConsolidation/clusters/e933b82f-cb0d-4f91-a4a7-5625ce3ed20b"
        ));
    }

    #[test]
    fn instance_and_channel_name() {
        assert!(matches("+/name/id", "x/name/id"));
        assert!(matches("+/name/id", "y/name/id"));
        assert!(!matches("+/name/id", "x/name/wrongId"));
        assert!(!matches("+/name/id", "x/name"));
    }

    #[test]
    fn two_segment_pattern_accepts_any_instance() {
        assert!(matches("role/name", "role/name"));
        assert!(matches("role/name", "role/name/instance"));
        assert!(!matches("role/name", "other/name/instance"));
        assert!(!matches("role/name", "role/other"));
    }

    #[test]
    fn inbound_wildcards_are_literal() {
        assert!(!matches("role/name/id", "+/name/id"));
        assert!(!matches("+/name/id", "x/name/#"));
    }

    #[test]
    fn wildcarded_channel_name_is_rejected() {
        for pattern in ["+/+/#", "role/#", "+", "role/+/id", "role/na+me/id", "#/name/id"] {
            assert!(
                matches!(
                    TopicPattern::parse(pattern),
                    Err(RelayError::MalformedAddress { .. })
                ),
                "{pattern} should be rejected"
            );
        }
    }

    #[test]
    fn exposes_raw_pattern() {
        let pattern: TopicPattern = "+/chan/#".parse().unwrap();
        assert_eq!(pattern.as_str(), "+/chan/#");
        assert_eq!(pattern.channel_name(), Some("chan"));
        assert_eq!(pattern.to_string(), "+/chan/#");
    }
}
