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

use parking_lot::Mutex;
use relaymesh::prelude::*;

use crate::setup::*;

mod setup;

async fn wait_for_len<T>(seen: &Arc<Mutex<Vec<T>>>, len: usize) -> anyhow::Result<()> {
    within_a_second(async {
        while seen.lock().len() < len {
            tokio::task::yield_now().await;
        }
    })
    .await
}

#[tokio::test]
async fn overlapping_receivers_each_get_one_copy() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let agent = connected_agent(&broker, "brain").await?;
    let seen = Arc::new(Mutex::new(Vec::new()));

    let any_role = agent.create_receiver::<Note>("speed").await?;
    let car_only = agent
        .create_receiver_with::<Note>("speed", ChannelOptions::new().role("car").ignore_existing())
        .await?;
    let everything = agent
        .create_receiver_with::<Note>("all", ChannelOptions::new().override_topic("#"))
        .await?;
    for (label, receiver) in [("any", &any_role), ("car", &car_only), ("all", &everything)] {
        let seen = seen.clone();
        receiver.on_message(move |_| seen.lock().push(label));
    }

    broker.publish("car/speed/1", relaymesh::codec::encode(&Note("fast".into()))?, false);
    wait_for_len(&seen, 3).await?;
    settle().await;
    // Registration order, one delivery per matching receiver.
    assert_eq!(*seen.lock(), vec!["any", "car", "all"]);

    seen.lock().clear();
    broker.publish("bike/speed/1", relaymesh::codec::encode(&Note("slow".into()))?, false);
    wait_for_len(&seen, 2).await?;
    settle().await;
    assert_eq!(*seen.lock(), vec!["any", "all"]);
    Ok(())
}

#[tokio::test]
async fn undecodable_payload_only_affects_its_receiver() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let agent = connected_agent(&broker, "brain").await?;

    let as_reading = agent.create_receiver::<Reading>("mixed").await?;
    let as_note = agent
        .create_receiver_with::<Note>("mixed-notes", ChannelOptions::new().override_topic("+/mixed/#"))
        .await?;
    let readings = Arc::new(Mutex::new(Vec::new()));
    let notes = Arc::new(Mutex::new(Vec::new()));
    {
        let readings = readings.clone();
        as_reading.on_message(move |delivery| readings.lock().push(delivery.payload.clone()));
    }
    {
        let notes = notes.clone();
        as_note.on_message(move |delivery| notes.lock().push(delivery.payload.clone()));
    }

    broker.publish("x/mixed", relaymesh::codec::encode(&Note("text".into()))?, false);
    broker.publish("x/mixed", vec![0xc1, 0xc1], false);
    broker.publish("x/mixed", relaymesh::codec::encode(&Reading::new("s", 2.0))?, false);

    wait_for_len(&readings, 1).await?;
    wait_for_len(&notes, 1).await?;
    settle().await;
    assert_eq!(*readings.lock(), vec![Some(Reading::new("s", 2.0))]);
    assert_eq!(*notes.lock(), vec![Some(Note("text".to_string()))]);
    Ok(())
}

#[tokio::test]
async fn panicking_callback_does_not_stop_dispatch() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let agent = connected_agent(&broker, "brain").await?;
    let receiver = agent.create_receiver::<Note>("fragile").await?;
    let seen = Arc::new(Mutex::new(Vec::new()));

    receiver.on_message(|delivery| {
        if delivery.payload == Some(Note("bad".to_string())) {
            panic!("callback failure");
        }
    });
    {
        let seen = seen.clone();
        receiver.on_message(move |delivery| seen.lock().push(delivery.payload.clone()));
    }

    for text in ["bad", "good"] {
        broker.publish("x/fragile", relaymesh::codec::encode(&Note(text.into()))?, false);
    }
    wait_for_len(&seen, 2).await?;
    assert_eq!(
        *seen.lock(),
        vec![Some(Note("bad".to_string())), Some(Note("good".to_string()))]
    );
    Ok(())
}

#[tokio::test]
async fn messages_are_dispatched_in_arrival_order() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let agent = connected_agent(&broker, "brain").await?;
    let receiver = agent.create_receiver::<Reading>("ordered").await?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        receiver.on_message(move |delivery| {
            if let Some(reading) = &delivery.payload {
                seen.lock().push(reading.value);
            }
        });
    }

    let sender = agent.create_sender::<Reading>("ordered")?;
    for value in 0..50 {
        sender.send(&Reading::new("counter", f64::from(value))).await?;
    }
    wait_for_len(&seen, 50).await?;
    let expected: Vec<f64> = (0..50).map(f64::from).collect();
    assert_eq!(*seen.lock(), expected);
    Ok(())
}

#[tokio::test]
async fn unmatched_topics_are_ignored() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let agent = connected_agent(&broker, "brain").await?;
    let receiver = agent
        .create_receiver_with::<Note>("plug", ChannelOptions::new().instance_id("left"))
        .await?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        receiver.on_message(move |delivery| seen.lock().push(delivery.topic.clone()));
    }

    broker.publish("a/plug/right", relaymesh::codec::encode(&Note("no".into()))?, false);
    broker.publish("a/plug", relaymesh::codec::encode(&Note("no".into()))?, false);
    broker.publish("a/plug/left", relaymesh::codec::encode(&Note("yes".into()))?, false);
    wait_for_len(&seen, 1).await?;
    settle().await;
    assert_eq!(*seen.lock(), vec!["a/plug/left".to_string()]);
    Ok(())
}

#[tokio::test]
async fn dropping_the_agent_stops_dispatch() -> anyhow::Result<()> {
    initialize_tracing();
    let broker = MemoryBroker::new();
    let agent = connected_agent(&broker, "brain").await?;
    let receiver = agent.create_receiver::<Note>("plug").await?;
    let seen = Arc::new(Mutex::new(Vec::new()));
    {
        let seen = seen.clone();
        receiver.on_message(move |delivery| seen.lock().push(delivery.topic.clone()));
    }

    drop(agent);
    settle().await;
    broker.publish("a/plug", relaymesh::codec::encode(&Note("late".into()))?, false);
    settle().await;
    assert!(seen.lock().is_empty());
    Ok(())
}
