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

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    SubscribeReasonCode, Transport as WireTransport,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, trace, warn};

use crate::common::{BrokerOptions, PublishOptions, QoS};
use crate::message::InboundMessage;
use crate::traits::{Connection, Transport, TransportHandle};

const KEEP_ALIVE: Duration = Duration::from_secs(30);
const REQUEST_CAPACITY: usize = 64;

/// Pending subscribe acknowledgements, in request order.
type PendingAcks = Arc<Mutex<VecDeque<oneshot::Sender<anyhow::Result<()>>>>>;

/// Connects to an MQTT broker with `rumqttc`.
///
/// Supported protocols are `mqtt`/`tcp` and `ws`. The connection is not
/// re-established automatically once lost; the handle reports `is_live() == false`
/// and the owner decides whether to connect again.
#[derive(Debug, Clone, Default)]
pub struct MqttTransport;

impl MqttTransport {
    /// Creates the transport.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl From<QoS> for rumqttc::QoS {
    fn from(qos: QoS) -> Self {
        match qos {
            QoS::AtMostOnce => Self::AtMostOnce,
            QoS::AtLeastOnce => Self::AtLeastOnce,
            QoS::ExactlyOnce => Self::ExactlyOnce,
        }
    }
}

fn mqtt_options(options: &BrokerOptions, client_id: &str) -> anyhow::Result<MqttOptions> {
    let mut mqtt_options = match options.protocol.as_str() {
        "mqtt" | "tcp" => MqttOptions::new(client_id, options.host.as_str(), options.port),
        "ws" => {
            let mut ws = MqttOptions::new(client_id, options.uri(), options.port);
            ws.set_transport(WireTransport::Ws);
            ws
        }
        other => bail!("unsupported broker protocol \"{other}\""),
    };
    mqtt_options.set_keep_alive(KEEP_ALIVE);
    if !options.username.is_empty() {
        mqtt_options.set_credentials(options.username.as_str(), options.password.as_str());
    }
    Ok(mqtt_options)
}

async fn await_connack(event_loop: &mut EventLoop) -> anyhow::Result<()> {
    loop {
        match event_loop.poll().await.context("MQTT connect failed")? {
            Event::Incoming(Packet::ConnAck(ack)) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                bail!("broker refused connection: {:?}", ack.code);
            }
            event => trace!(?event, "Waiting for CONNACK"),
        }
    }
}

async fn poll_loop(
    mut event_loop: EventLoop,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    pending_acks: PendingAcks,
    live: Arc<AtomicBool>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                if inbound.send(message).is_err() {
                    debug!("Inbound hook dropped; stopping MQTT poll loop");
                    break;
                }
            }
            Ok(Event::Incoming(Packet::SubAck(ack))) => {
                let result = if ack
                    .return_codes
                    .iter()
                    .any(|code| matches!(code, SubscribeReasonCode::Failure))
                {
                    Err(anyhow!("broker rejected subscription (packet {})", ack.pkid))
                } else {
                    Ok(())
                };
                match pending_acks.lock().pop_front() {
                    Some(waiter) => {
                        let _ = waiter.send(result);
                    }
                    None => warn!(pkid = ack.pkid, "SUBACK with no pending subscription"),
                }
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                debug!("MQTT connection closed by client");
                break;
            }
            Ok(event) => trace!(?event, "MQTT event"),
            Err(e) => {
                error!("MQTT connection lost: {e}");
                break;
            }
        }
    }
    live.store(false, Ordering::Release);
    for waiter in pending_acks.lock().drain(..) {
        let _ = waiter.send(Err(anyhow!("connection closed before SUBACK")));
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&self, options: &BrokerOptions, client_id: &str) -> anyhow::Result<Connection> {
        let (client, mut event_loop) =
            AsyncClient::new(mqtt_options(options, client_id)?, REQUEST_CAPACITY);
        await_connack(&mut event_loop).await?;

        let live = Arc::new(AtomicBool::new(true));
        let pending_acks = PendingAcks::default();
        let (sender, inbound) = mpsc::unbounded_channel();
        tokio::spawn(poll_loop(event_loop, sender, pending_acks.clone(), live.clone()));

        Ok(Connection {
            handle: Arc::new(MqttHandle {
                client,
                live,
                pending_acks,
                subscribe_order: tokio::sync::Mutex::new(()),
            }),
            inbound,
        })
    }
}

/// A live MQTT connection.
struct MqttHandle {
    client: AsyncClient,
    live: Arc<AtomicBool>,
    pending_acks: PendingAcks,
    /// Keeps the pending-ack queue in the same order as the SUBSCRIBE packets.
    subscribe_order: tokio::sync::Mutex<()>,
}

impl std::fmt::Debug for MqttHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttHandle")
            .field("live", &self.live.load(Ordering::Acquire))
            .field("pending_acks", &self.pending_acks.lock().len())
            .finish()
    }
}

#[async_trait]
impl TransportHandle for MqttHandle {
    async fn subscribe(&self, pattern: &str, qos: QoS) -> anyhow::Result<()> {
        let (waiter, acked) = oneshot::channel();
        {
            let _order = self.subscribe_order.lock().await;
            self.pending_acks.lock().push_back(waiter);
            if let Err(e) = self.client.subscribe(pattern, qos.into()).await {
                self.pending_acks.lock().pop_back();
                return Err(e).context("failed to queue SUBSCRIBE");
            }
        }
        acked.await.context("poll loop ended before SUBACK")?
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>, options: PublishOptions) -> anyhow::Result<()> {
        self.client
            .publish(topic, options.qos.into(), options.retain, payload)
            .await
            .context("failed to queue PUBLISH")
    }

    async fn end(&self) -> anyhow::Result<()> {
        self.live.store(false, Ordering::Release);
        self.client
            .disconnect()
            .await
            .context("failed to queue DISCONNECT")
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }
}
