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
use std::fs;

use relaymesh::prelude::*;
use tempfile::TempDir;

use crate::setup::*;

mod setup;

// One test function: XDG_CONFIG_HOME is process-wide.
#[tokio::test]
async fn load_reads_the_xdg_config_file() -> anyhow::Result<()> {
    initialize_tracing();
    let config_home = TempDir::new()?;
    std::env::set_var("XDG_CONFIG_HOME", config_home.path());
    std::env::set_var("XDG_CONFIG_DIRS", config_home.path().join("system"));

    // Nothing on disk yet.
    assert_eq!(RelayConfig::load(), RelayConfig::default());

    let config_dir = config_home.path().join("relaymesh");
    fs::create_dir_all(&config_dir)?;
    let config_path = config_dir.join("config.toml");
    fs::write(
        &config_path,
        r#"
        [broker]
        protocol = "ws"
        host = "broker.local"
        port = 15675
        path = "/ws"

        [channels]
        qos = 0
        retain = true

        [behavior]
        auto_connect = false
        "#,
    )?;

    let config = RelayConfig::load();
    assert_eq!(config.broker.uri(), "ws://broker.local:15675/ws");
    assert_eq!(config.channels.qos, QoS::AtMostOnce);
    assert!(config.channels.retain);
    assert!(!config.behavior.auto_connect);
    assert_eq!(RelayConfig::load_from(&config_path)?, config);

    // The loaded config drives the agent: no auto-connect, channel defaults applied.
    let broker = MemoryBroker::new();
    let agent = Agent::builder("configured")
        .config(config)
        .transport(broker.clone())
        .build()
        .await?;
    assert_eq!(agent.state(), ConnectionState::Initialised);
    assert_eq!(agent.broker_uri(), "ws://broker.local:15675/ws");
    let sender = agent.create_sender::<Note>("notes")?;
    assert_eq!(sender.publish_options().qos, QoS::AtMostOnce);
    assert!(sender.publish_options().retain);

    // A malformed file falls back to defaults.
    fs::write(&config_path, "[broker\nhost = ")?;
    assert_eq!(RelayConfig::load(), RelayConfig::default());
    assert!(matches!(
        RelayConfig::load_from(&config_path),
        Err(RelayError::Config(_))
    ));
    Ok(())
}
