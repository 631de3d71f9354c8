//! Embedded MQTT broker using rumqttd
//!
//! Lets a detector process on the same host publish frames without an
//! external broker.

use crate::infra::config::Config as AppConfig;
use anyhow::Context;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use tracing::{info, warn};

/// Detection frames are small; a generous cap still rejects garbage
const MAX_PAYLOAD_SIZE: usize = 1024 * 1024;

fn broker_config(listen: SocketAddr) -> Config {
    let router_config = RouterConfig {
        max_segment_size: 104857600,
        max_segment_count: 10,
        max_connections: 64,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size: MAX_PAYLOAD_SIZE,
                max_inflight_count: 200,
                auth: None,
                dynamic_filters: false,
                external_auth: None,
            },
        },
    );

    Config {
        id: 0,
        router: router_config,
        v4: Some(servers),
        v5: None,
        ws: None,
        prometheus: None,
        metrics: None,
        bridge: None,
        console: None,
        cluster: None,
    }
}

/// Start the embedded MQTT broker on its own thread
pub fn start_embedded_broker(app_config: &AppConfig) -> anyhow::Result<()> {
    let addr_str = format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen_addr: SocketAddr = addr_str
        .parse()
        .with_context(|| format!("invalid broker bind address {}", addr_str))?;

    let config = broker_config(listen_addr);

    thread::Builder::new()
        .name("mqtt-broker".to_string())
        .spawn(move || {
            let mut broker = Broker::new(config);
            // start() blocks for the lifetime of the broker
            if let Err(e) = broker.start() {
                warn!(error = %e, "broker_start_failed");
            }
        })
        .context("failed to spawn broker thread")?;

    // Give broker time to bind before the MQTT client connects
    thread::sleep(std::time::Duration::from_millis(100));
    info!(listen = %listen_addr, "broker_started");
    Ok(())
}
