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
#![allow(dead_code)]

use std::future::Future;
use std::sync::Once;
use std::time::Duration;

use relaymesh::prelude::*;
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

// Re-export messages for easy access within tests.
pub use messages::*;

pub mod messages;

// Ensures tracing initialization happens only once across all tests.
static INIT: Once = Once::new();

/// Initializes the global tracing subscriber for tests.
///
/// Logs go to `logs/relaymesh_tests.txt`. `RUST_LOG` narrows the filter; the
/// default is `trace` for relaymesh and `info` for everything else.
pub fn initialize_tracing() {
    INIT.call_once(|| {
        std::fs::create_dir_all("logs").expect("could not create logs dir");

        let file_appender = RollingFileAppender::new(Rotation::NEVER, "logs", "relaymesh_tests.txt");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Leak the guard so the non-blocking writer is not dropped before process exit
        Box::leak(Box::new(guard));

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info").add_directive("relaymesh=trace".parse().unwrap()));

        let subscriber = FmtSubscriber::builder()
            .with_span_events(FmtSpan::NONE)
            .with_max_level(Level::TRACE)
            .compact()
            .with_line_number(true)
            .without_time()
            .with_target(true)
            .with_env_filter(filter)
            .with_writer(non_blocking)
            .finish();

        tracing::subscriber::set_global_default(subscriber)
            .expect("setting default subscriber failed");
    });
}

/// An agent on `broker` that is connected once built.
pub async fn connected_agent(broker: &MemoryBroker, role: &str) -> anyhow::Result<Agent> {
    Ok(Agent::builder(role).transport(broker.clone()).build().await?)
}

/// An agent on `broker` that never connects on its own.
pub async fn offline_agent(broker: &MemoryBroker, role: &str) -> anyhow::Result<Agent> {
    Ok(Agent::builder(role)
        .transport(broker.clone())
        .auto_connect(false)
        .build()
        .await?)
}

/// Awaits `future` for at most one second.
pub async fn within_a_second<F: Future>(future: F) -> anyhow::Result<F::Output> {
    Ok(tokio::time::timeout(Duration::from_secs(1), future).await?)
}

/// Lets the dispatch task drain whatever is queued.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
