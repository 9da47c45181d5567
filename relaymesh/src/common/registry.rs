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

//! Per-agent collections of senders and receivers.
//!
//! Entries are type-erased so one registry can hold channels of any payload
//! type; the typed handle is recovered by downcasting on lookup. Channels are
//! never removed: they live as long as the agent.

use std::any::Any;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use tracing::{trace, warn};

use crate::channel::{ChannelDefinition, Receiver, ReceiverInner, ReceiverSlot, Sender, SenderInner};
use crate::common::RelayError;

struct RegisteredSender {
    definition: ChannelDefinition,
    handle: Arc<dyn Any + Send + Sync>,
}

/// The outcome of a get-or-create.
pub(crate) enum Registration<C> {
    /// A channel with this name already existed and is returned as-is.
    Existing(C),
    /// A new channel was created and registered.
    Created(C),
}

#[derive(Default)]
pub(crate) struct ChannelRegistry {
    senders: RwLock<Vec<RegisteredSender>>,
    receivers: RwLock<Vec<Arc<dyn ReceiverSlot>>>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("sender_count", &self.senders.read().len())
            .field("receiver_count", &self.receivers.read().len())
            .finish()
    }
}

impl ChannelRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns the sender registered under `name`, or registers the one built by
    /// `create`. With `ignore_existing` a new sender is always registered.
    ///
    /// Lookup and insertion happen under one lock, so concurrent callers asking
    /// for the same name get the same instance.
    pub(crate) fn sender_or_insert_with<T, F>(
        &self,
        name: &str,
        ignore_existing: bool,
        create: F,
    ) -> Result<Registration<Sender<T>>, RelayError>
    where
        T: 'static,
        F: FnOnce() -> Result<SenderInner<T>, RelayError>,
    {
        let mut senders = self.senders.write();
        if !ignore_existing {
            if let Some(existing) = senders.iter().find(|entry| entry.definition.name() == name) {
                let inner = existing
                    .handle
                    .clone()
                    .downcast::<SenderInner<T>>()
                    .map_err(|_| RelayError::ChannelTypeMismatch {
                        name: name.to_string(),
                    })?;
                warn!(channel = %name, topic = %existing.definition.topic(), "Sender already exists; reusing it");
                return Ok(Registration::Existing(Sender::from_inner(inner)));
            }
        }

        let sender = Sender::from_inner(Arc::new(create()?));
        senders.push(RegisteredSender {
            definition: sender.definition().clone(),
            handle: sender.inner().clone(),
        });
        trace!(channel = %name, topic = %sender.topic(), "Registered sender");
        Ok(Registration::Created(sender))
    }

    /// Receiver counterpart of [`sender_or_insert_with`](Self::sender_or_insert_with).
    pub(crate) fn receiver_or_insert_with<T, F>(
        &self,
        name: &str,
        ignore_existing: bool,
        create: F,
    ) -> Result<Registration<Receiver<T>>, RelayError>
    where
        T: DeserializeOwned + Send + 'static,
        F: FnOnce() -> Result<ReceiverInner<T>, RelayError>,
    {
        let mut receivers = self.receivers.write();
        if !ignore_existing {
            if let Some(existing) = receivers.iter().find(|slot| slot.definition().name() == name) {
                let inner = existing
                    .clone()
                    .into_any()
                    .downcast::<ReceiverInner<T>>()
                    .map_err(|_| RelayError::ChannelTypeMismatch {
                        name: name.to_string(),
                    })?;
                warn!(channel = %name, topic = %existing.definition().topic(), "Receiver already exists; reusing it");
                return Ok(Registration::Existing(Receiver::from_inner(inner)));
            }
        }

        let receiver = Receiver::from_inner(Arc::new(create()?));
        receivers.push(receiver.inner().clone());
        trace!(channel = %name, topic = %receiver.topic(), "Registered receiver");
        Ok(Registration::Created(receiver))
    }

    /// Every receiver, in registration order.
    ///
    /// A copy, so the dispatcher can walk it while new receivers are registered.
    pub(crate) fn receivers(&self) -> Vec<Arc<dyn ReceiverSlot>> {
        self.receivers.read().clone()
    }

    pub(crate) fn sender_definitions(&self) -> Vec<ChannelDefinition> {
        self.senders
            .read()
            .iter()
            .map(|entry| entry.definition.clone())
            .collect()
    }

    pub(crate) fn receiver_definitions(&self) -> Vec<ChannelDefinition> {
        self.receivers
            .read()
            .iter()
            .map(|slot| slot.definition().clone())
            .collect()
    }
}
