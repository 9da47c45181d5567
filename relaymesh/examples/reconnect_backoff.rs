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
//! Reconnecting with jittered exponential backoff.
//!
//! Agents never retry on their own. This demo builds an agent without
//! auto-connect against an in-process broker that is down at first, retries
//! `connect` with backoff until the broker comes up, then exchanges a few
//! messages over a receiver that was created before the connection existed.
//!
//! Run with `cargo run --example reconnect_backoff`.

use std::time::Duration;

use rand::Rng;
use relaymesh::prelude::*;

#[relay_message]
struct Heartbeat {
    sequence: u32,
}

const MAX_ATTEMPTS: u32 = 8;

async fn connect_with_backoff(agent: &Agent) -> anyhow::Result<()> {
    let mut delay = Duration::from_millis(20);
    for attempt in 1..=MAX_ATTEMPTS {
        match agent.connect().await {
            Ok(()) => {
                println!("connected on attempt {attempt}");
                return Ok(());
            }
            Err(e) => {
                let jitter = Duration::from_millis(rand::rng().random_range(0..20));
                println!("attempt {attempt} failed ({e}); retrying in {:?}", delay + jitter);
                tokio::time::sleep(delay + jitter).await;
                delay = (delay * 2).min(Duration::from_millis(500));
            }
        }
    }
    anyhow::bail!("gave up after {MAX_ATTEMPTS} attempts")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let broker = MemoryBroker::new();
    broker.set_available(false);

    let agent = Agent::builder("monitor")
        .instance_id("demo")
        .transport(broker.clone())
        .auto_connect(false)
        .build()
        .await?;

    // Registered now, subscribed on the first successful connect.
    let heartbeats = agent.create_receiver::<Heartbeat>("heartbeat").await?;
    heartbeats.on_message(|delivery| {
        if let Some(beat) = &delivery.payload {
            println!("heartbeat {} on {}", beat.sequence, delivery.topic);
        }
    });
    let sender = agent.create_sender::<Heartbeat>("heartbeat")?;

    let outage = broker.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(150)).await;
        outage.set_available(true);
    });

    connect_with_backoff(&agent).await?;
    for sequence in 0..3 {
        sender.send(&Heartbeat { sequence }).await?;
    }
    tokio::time::sleep(Duration::from_millis(50)).await;

    agent.disconnect().await;
    println!("state after disconnect: {}", agent.state());
    Ok(())
}
