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

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use tokio::sync::oneshot;
use tracing::{error, trace};

use crate::address::TopicPattern;
use crate::channel::ChannelDefinition;
use crate::common::QoS;
use crate::message::{codec, Delivery, InboundMessage};

/// A registered callback. Persistent callbacks run on every match; one-shot
/// callbacks run once and are then dropped from the list.
enum Callback<T> {
    Persistent(Box<dyn FnMut(&Delivery<T>) + Send>),
    Once(Box<dyn FnOnce(&Delivery<T>) + Send>),
}

/// What the dispatcher and registry need from a receiver, whatever its payload type.
pub(crate) trait ReceiverSlot: Send + Sync {
    fn definition(&self) -> &ChannelDefinition;
    fn pattern(&self) -> &TopicPattern;
    fn qos(&self) -> QoS;
    fn mark_subscribed(&self, subscribed: bool);
    /// Decodes `message` and runs every callback. Never panics.
    fn deliver(&self, message: &InboundMessage);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct ReceiverInner<T> {
    definition: ChannelDefinition,
    pattern: TopicPattern,
    qos: QoS,
    subscribed: AtomicBool,
    callbacks: Mutex<Vec<Callback<T>>>,
}

impl<T> ReceiverInner<T> {
    pub(crate) fn new(definition: ChannelDefinition, pattern: TopicPattern, qos: QoS) -> Self {
        Self {
            definition,
            pattern,
            qos,
            subscribed: AtomicBool::new(false),
            callbacks: Mutex::new(Vec::new()),
        }
    }

    fn run_callbacks(&self, delivery: &Delivery<T>) {
        // Taken out of the lock so callbacks may register more callbacks.
        let pending = std::mem::take(&mut *self.callbacks.lock());
        let mut kept = Vec::with_capacity(pending.len());

        for callback in pending {
            match callback {
                Callback::Persistent(mut callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(delivery))).is_err() {
                        error!(channel = %self.definition.name(), topic = %delivery.topic, "Callback panicked");
                    }
                    kept.push(Callback::Persistent(callback));
                }
                Callback::Once(callback) => {
                    if catch_unwind(AssertUnwindSafe(|| callback(delivery))).is_err() {
                        error!(channel = %self.definition.name(), topic = %delivery.topic, "One-shot callback panicked");
                    }
                }
            }
        }

        let mut callbacks = self.callbacks.lock();
        let registered_meanwhile = std::mem::replace(&mut *callbacks, kept);
        callbacks.extend(registered_meanwhile);
    }
}

impl<T> ReceiverSlot for ReceiverInner<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn definition(&self) -> &ChannelDefinition {
        &self.definition
    }

    fn pattern(&self) -> &TopicPattern {
        &self.pattern
    }

    fn qos(&self) -> QoS {
        self.qos
    }

    fn mark_subscribed(&self, subscribed: bool) {
        self.subscribed.store(subscribed, Ordering::Release);
    }

    fn deliver(&self, message: &InboundMessage) {
        let payload = if message.payload.is_empty() {
            None
        } else {
            match codec::decode::<T>(&message.payload) {
                Ok(payload) => Some(payload),
                Err(e) => {
                    error!(
                        channel = %self.definition.name(),
                        topic = %message.topic,
                        bytes = message.payload.len(),
                        "Dropping undecodable message: {e}"
                    );
                    return;
                }
            }
        };
        trace!(channel = %self.definition.name(), topic = %message.topic, "Delivering");
        self.run_callbacks(&Delivery {
            topic: message.topic.clone(),
            payload,
        });
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Receives `T` values from every topic its pattern matches.
///
/// Obtained from [`Agent::create_receiver`](crate::common::Agent::create_receiver).
/// Callbacks run on the agent's dispatch task, one message at a time, in the
/// order they were registered. A callback that blocks stalls delivery of every
/// later message on the agent.
pub struct Receiver<T> {
    inner: Arc<ReceiverInner<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T> fmt::Debug for Receiver<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Receiver")
            .field("definition", &self.inner.definition)
            .field("qos", &self.inner.qos)
            .field("subscribed", &self.inner.subscribed.load(Ordering::Acquire))
            .field("callbacks", &self.inner.callbacks.lock().len())
            .finish()
    }
}

impl<T> Receiver<T> {
    pub(crate) const fn from_inner(inner: Arc<ReceiverInner<T>>) -> Self {
        Self { inner }
    }

    pub(crate) fn inner(&self) -> &Arc<ReceiverInner<T>> {
        &self.inner
    }

    /// The channel's definition. Its topic is the subscription pattern.
    #[must_use]
    pub fn definition(&self) -> &ChannelDefinition {
        &self.inner.definition
    }

    /// The channel name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.inner.definition.name()
    }

    /// The subscription pattern.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.inner.definition.topic()
    }

    /// QoS requested on subscribe.
    #[must_use]
    pub fn qos(&self) -> QoS {
        self.inner.qos
    }

    /// Whether the broker has acknowledged this receiver's subscription on the
    /// current connection.
    #[must_use]
    pub fn is_subscribed(&self) -> bool {
        self.inner.subscribed.load(Ordering::Acquire)
    }

    /// Whether a message on `topic` would be delivered to this receiver.
    #[must_use]
    pub fn matches(&self, topic: &str) -> bool {
        self.inner.pattern.matches(topic)
    }

    /// `true` if both handles refer to the same channel instance.
    #[must_use]
    pub fn same_channel(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of callbacks currently registered.
    #[must_use]
    pub fn callback_count(&self) -> usize {
        self.inner.callbacks.lock().len()
    }

    /// Runs `callback` for every matching message.
    pub fn on_message<F>(&self, callback: F)
    where
        F: FnMut(&Delivery<T>) + Send + 'static,
    {
        self.inner
            .callbacks
            .lock()
            .push(Callback::Persistent(Box::new(callback)));
    }

    /// Runs `callback` for the next matching message only.
    pub fn once<F>(&self, callback: F)
    where
        F: FnOnce(&Delivery<T>) + Send + 'static,
    {
        self.inner
            .callbacks
            .lock()
            .push(Callback::Once(Box::new(callback)));
    }
}

impl<T: Clone + Send + 'static> Receiver<T> {
    /// Resolves with the next matching message.
    ///
    /// The one-shot callback is registered when this is called, not when the
    /// future is first polled, so nothing published after the call is missed.
    /// Resolves to `None` only if the receiver is torn down first.
    pub fn next_message(&self) -> impl Future<Output = Option<Delivery<T>>> + Send + 'static {
        let (reply, response) = oneshot::channel();
        self.once(move |delivery| {
            let _ = reply.send(delivery.clone());
        });
        async move { response.await.ok() }
    }
}
