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
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::channel::ChannelDefinition;
use crate::common::{ConnectionManager, PublishOptions, RelayError};
use crate::message::codec;

pub(crate) struct SenderInner<T> {
    definition: ChannelDefinition,
    publish_options: PublishOptions,
    connection: Arc<ConnectionManager>,
    _payload: PhantomData<fn(&T)>,
}

impl<T> SenderInner<T> {
    pub(crate) fn new(
        definition: ChannelDefinition,
        publish_options: PublishOptions,
        connection: Arc<ConnectionManager>,
    ) -> Self {
        Self {
            definition,
            publish_options,
            connection,
            _payload: PhantomData,
        }
    }
}

/// Publishes `T` values on one fixed topic.
///
/// Obtained from [`Agent::create_sender`](crate::common::Agent::create_sender).
/// The sender never holds the connection itself; every send asks the agent's
/// connection manager for the live handle, and fails with
/// [`RelayError::PublishWithoutConnection`] if there is none.
pub struct Sender<T> {
    inner: Arc<SenderInner<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Sender<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sender")
            .field("definition", &self.inner.definition)
            .field("publish_options", &self.inner.publish_options)
            .finish()
    }
}

impl<T> Sender<T> {
    pub(crate) const fn from_inner(inner: Arc<SenderInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<SenderInner<T>> {
        &self.inner
    }

    /// The channel's definition.
    #[must_use]
    pub fn definition(&self) -> &ChannelDefinition {
        &self.inner.definition
    }

    /// The channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.definition.name()
    }

    /// The topic every message is published on.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.inner.definition.topic()
    }

    /// QoS and retain flag used for every publish.
    #[must_use]
    pub fn publish_options(&self) -> PublishOptions {
        self.inner.publish_options
    }

    /// `true` if both handles refer to the same channel instance.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Publishes pre-encoded bytes.
    ///
    /// # Errors
    ///
    /// [`RelayError::PublishWithoutConnection`] if the agent is not connected, or
    /// [`RelayError::Publish`] if the transport rejects the message.
    pub async fn send_raw(&self, payload: &[u8]) -> Result<(), RelayError> {
        self.inner
            .connection
            .publish(self.topic(), payload.to_vec(), self.inner.publish_options)
            .await
    }

    /// Publishes a zero-length message. Receivers see it with `payload: None`.
    ///
    /// # Errors
    ///
    /// As for [`send_raw`](Self::send_raw).
    pub async fn send_empty(&self) -> Result<(), RelayError> {
        self.send_raw(&[]).await
    }
}

impl<T: Serialize> Sender<T> {
    /// Encodes `payload` and publishes it.
    ///
    /// # Errors
    ///
    /// [`RelayError::Encode`] if the value cannot be encoded, otherwise as for
    /// [`send_raw`](Self::send_raw).
    #[instrument(skip(self, payload), fields(channel = %self.name(), topic = %self.topic()))]
    pub async fn send(&self, payload: &T) -> Result<(), RelayError> {
        let bytes = codec::encode(payload)?;
        self.inner
            .connection
            .publish(self.topic(), bytes, self.inner.publish_options)
            .await
    }
}
