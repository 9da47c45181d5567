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

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, trace};

use crate::common::ChannelRegistry;
use crate::message::InboundMessage;

/// Routes inbound messages to matching receivers.
///
/// One dispatcher task runs per successful connection. Messages are handled one
/// at a time, in the order the transport delivered them.
pub(crate) struct Dispatcher {
    cancellation_token: CancellationToken,
    task: JoinHandle<()>,
}

impl Dispatcher {
    /// Spawns the dispatch loop for one connection's inbound hook.
    pub(crate) fn spawn(
        registry: Arc<ChannelRegistry>,
        inbound: mpsc::UnboundedReceiver<InboundMessage>,
        client_id: String,
    ) -> Self {
        let cancellation_token = CancellationToken::new();
        let task = tokio::spawn(run(
            registry,
            inbound,
            cancellation_token.clone(),
            client_id,
        ));
        Self {
            cancellation_token,
            task,
        }
    }

    /// Stops the loop after the message in progress, if any.
    pub(crate) fn stop(&self) {
        self.cancellation_token.cancel();
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.cancellation_token.cancel();
    }
}

#[instrument(skip(registry, inbound, cancellation_token))]
async fn run(
    registry: Arc<ChannelRegistry>,
    mut inbound: mpsc::UnboundedReceiver<InboundMessage>,
    cancellation_token: CancellationToken,
    client_id: String,
) {
    loop {
        tokio::select! {
            biased;
            () = cancellation_token.cancelled() => {
                trace!("Dispatcher cancelled");
                break;
            }
            message = inbound.recv() => {
                let Some(message) = message else {
                    debug!("Inbound hook closed; dispatcher stopping");
                    break;
                };
                dispatch(&registry, &message);
            }
        }
    }
}

/// Offers `message` to every registered receiver, in registration order, and
/// returns how many matched.
///
/// Every receiver is checked regardless of which subscription caused the
/// delivery, since broker subscriptions overlap.
pub(crate) fn dispatch(registry: &ChannelRegistry, message: &InboundMessage) -> usize {
    let mut matched = 0;
    for receiver in registry.receivers() {
        if receiver.pattern().matches(&message.topic) {
            matched += 1;
            receiver.deliver(message);
        }
    }
    if matched == 0 {
        debug!(topic = %message.topic, "No receiver matched inbound message");
    } else {
        trace!(topic = %message.topic, matched, "Dispatched inbound message");
    }
    matched
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::address::TopicPattern;
    use crate::channel::{ChannelDefinition, ChannelDirection, Receiver, ReceiverInner};
    use crate::common::{Registration, QoS, RelayError};
    use crate::message::codec;

    fn register(registry: &ChannelRegistry, name: &str, pattern: &str) -> Receiver<u32> {
        let registration = registry
            .receiver_or_insert_with::<u32, _>(name, true, || {
                Ok::<_, RelayError>(ReceiverInner::new(
                    ChannelDefinition::new(name, pattern, ChannelDirection::Receiver),
                    TopicPattern::parse(pattern)?,
                    QoS::AtLeastOnce,
                ))
            })
            .unwrap();
        match registration {
            Registration::Created(receiver) | Registration::Existing(receiver) => receiver,
        }
    }

    fn counter(receiver: &Receiver<u32>) -> Arc<AtomicUsize> {
        let count = Arc::new(AtomicUsize::new(0));
        let counted = count.clone();
        receiver.on_message(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        count
    }

    #[test]
    fn overlapping_receivers_all_get_the_message() {
        let registry = ChannelRegistry::new();
        let broad = counter(&register(&registry, "speed", "+/speed/#"));
        let narrow = counter(&register(&registry, "speed", "car/speed/#"));
        let other = counter(&register(&registry, "heading", "+/heading/#"));

        let message = InboundMessage::new("car/speed/1", codec::encode(&42u32).unwrap());
        assert_eq!(dispatch(&registry, &message), 2);
        assert_eq!(broad.load(Ordering::SeqCst), 1);
        assert_eq!(narrow.load(Ordering::SeqCst), 1);
        assert_eq!(other.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn one_bad_decode_does_not_block_other_receivers() {
        let registry = ChannelRegistry::new();
        let numbers = counter(&register(&registry, "speed", "+/speed/#"));
        let texts_registration = registry
            .receiver_or_insert_with::<String, _>("speed-text", true, || {
                Ok::<_, RelayError>(ReceiverInner::new(
                    ChannelDefinition::new("speed-text", "+/speed/#", ChannelDirection::Receiver),
                    TopicPattern::parse("+/speed/#")?,
                    QoS::AtLeastOnce,
                ))
            })
            .unwrap();
        let Registration::Created(texts) = texts_registration else {
            panic!("expected a new receiver");
        };
        let text_calls = Arc::new(AtomicUsize::new(0));
        {
            let text_calls = text_calls.clone();
            texts.on_message(move |_| {
                text_calls.fetch_add(1, Ordering::SeqCst);
            });
        }

        // A u32 does not decode as a String.
        let message = InboundMessage::new("car/speed", codec::encode(&7u32).unwrap());
        assert_eq!(dispatch(&registry, &message), 2);
        assert_eq!(numbers.load(Ordering::SeqCst), 1);
        assert_eq!(text_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn loop_runs_until_cancelled() {
        let registry = Arc::new(ChannelRegistry::new());
        let count = counter(&register(&registry, "speed", "+/speed/#"));
        let (sender, inbound) = mpsc::unbounded_channel();
        let dispatcher = Dispatcher::spawn(registry.clone(), inbound, "test".to_string());

        sender
            .send(InboundMessage::new("car/speed", codec::encode(&1u32).unwrap()))
            .unwrap();
        sender
            .send(InboundMessage::new("car/speed", codec::encode(&2u32).unwrap()))
            .unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while count.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        dispatcher.stop();
        tokio::time::timeout(std::time::Duration::from_secs(1), async {
            while !dispatcher.is_finished() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
