//! Embedded MQTT broker using rumqttd
//!
//! Lets a single bridge process serve field devices without an
//! external broker deployment. Disabled via config when pointing at an
//! existing broker.

use crate::infra::config::Config as AppConfig;
use rumqttd::{Broker, Config, ConnectionSettings, RouterConfig, ServerSettings};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::thread;
use tracing::{info, warn};

/// Start the embedded MQTT broker if enabled in config
pub fn start_embedded_broker(app_config: &AppConfig) {
    if !app_config.broker_enabled() {
        info!("broker_disabled");
        return;
    }

    let addr_str =
        format!("{}:{}", app_config.broker_bind_address(), app_config.broker_port());
    let listen_addr: SocketAddr = match addr_str.parse() {
        Ok(addr) => addr,
        Err(e) => {
            warn!(error = %e, addr = %addr_str, "broker_invalid_bind_address");
            return;
        }
    };

    let router_config = RouterConfig {
        max_segment_size: 1048576,
        max_segment_count: 10,
        max_connections: 512,
        max_outgoing_packet_count: 200,
        initialized_filters: None,
        ..Default::default()
    };

    let mut servers = HashMap::new();
    servers.insert(
        "v4".to_string(),
        ServerSettings {
            name: "v4".to_string(),
            listen: listen_addr,
            tls: None,
            next_connection_delay_ms: 1,
            connections: ConnectionSettings {
                connection_timeout_ms: 5000,
                max_payload_size: 16384,
                max_inflight_count: 100,
                auth: None,
                dynamic_filters: false,
                external_auth: None,
            },
        },
    );

    let config = Config {
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
    };

    thread::spawn(move || {
        let mut broker = Broker::new(config);
        if let Err(e) = broker.start() {
            // start() blocks for the process lifetime on success
            warn!(error = %e, "broker_start_failed");
        }
    });

    // Give the broker time to bind before clients connect
    thread::sleep(std::time::Duration::from_millis(100));
    info!(addr = %addr_str, "broker_started");
}
