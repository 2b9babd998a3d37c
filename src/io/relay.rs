//! Command relay - publishes operator commands to device control topics
//!
//! Owns a dedicated MQTT connection (separate from the ingest
//! subscription) with a spawned eventloop task that tracks connection
//! state. `send` fails fast with `NotConnected` when the publish path
//! is down - no queuing, no retry; the caller decides what to do.
//!
//! The relay never touches `DeviceState`: the device's own state
//! report is the only accepted source of truth for actuator status, so
//! the dashboard waits for the echo rather than trusting the command.

use crate::domain::types::{Command, CommandTarget, DeviceId};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Command relay failure, surfaced synchronously to the caller
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("transport not connected")]
    NotConnected,
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

/// MQTT publisher for actuator commands
pub struct CommandRelay {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
    topic_prefix: String,
    metrics: Arc<Metrics>,
}

impl CommandRelay {
    /// Create the relay and spawn its eventloop task.
    ///
    /// The eventloop flips the shared connected flag on ConnAck and on
    /// connection errors; rumqttc reconnects on its own schedule.
    pub fn new(config: &Config, metrics: Arc<Metrics>) -> Self {
        let client_id = format!("firebridge-relay-{}", std::process::id());
        let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
        mqttoptions.set_keep_alive(Duration::from_secs(30));
        mqttoptions.set_clean_session(true);

        if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password())
        {
            mqttoptions.set_credentials(username, password);
        }

        let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
        let connected = Arc::new(AtomicBool::new(false));

        let flag = connected.clone();
        tokio::spawn(async move {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        flag.store(true, Ordering::SeqCst);
                        info!("relay_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        if flag.swap(false, Ordering::SeqCst) {
                            warn!(error = %e, "relay_disconnected");
                        }
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        });

        Self {
            client,
            connected,
            topic_prefix: config.topic_prefix().to_string(),
            metrics,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Publish one command and report the outcome to the caller.
    ///
    /// Ok means the command was accepted into the client's outgoing
    /// queue while the link was up; the QoS 1 PubAck is handled by the
    /// eventloop task, not awaited here. The device's own state report
    /// is the confirmation that matters, so the caller gets queue
    /// acceptance, not broker receipt.
    pub async fn send(&self, command: &Command) -> Result<(), RelayError> {
        if !self.is_connected() {
            self.metrics.record_command_failure();
            return Err(RelayError::NotConnected);
        }

        let topic = command_topic(&self.topic_prefix, &command.device_id, command.target);
        let token = command_token(command.desired_state);

        match self.client.publish(&topic, QoS::AtLeastOnce, false, token).await {
            Ok(()) => {
                self.metrics.record_command_sent();
                debug!(topic = %topic, token = %token, "command_published");
                Ok(())
            }
            Err(e) => {
                self.metrics.record_command_failure();
                warn!(topic = %topic, error = %e, "command_publish_failed");
                Err(RelayError::PublishFailed(e.to_string()))
            }
        }
    }

    /// Test constructor with a forced connection flag and no eventloop
    #[cfg(test)]
    pub fn for_test(config: &Config, metrics: Arc<Metrics>, connected: bool) -> Self {
        let mqttoptions = MqttOptions::new("firebridge-relay-test", "localhost", 1883);
        let (client, eventloop) = AsyncClient::new(mqttoptions, 100);
        // Keep the request channel open without polling it
        std::mem::forget(eventloop);
        Self {
            client,
            connected: Arc::new(AtomicBool::new(connected)),
            topic_prefix: config.topic_prefix().to_string(),
            metrics,
        }
    }
}

/// Control topic for a device actuator - a pure function of the address
pub fn command_topic(prefix: &str, device_id: &DeviceId, target: CommandTarget) -> String {
    format!("{}/{}/control/{}", prefix, device_id, target.as_str())
}

/// Wire token understood by the device firmware
pub fn command_token(desired_state: bool) -> &'static str {
    if desired_state {
        "ON"
    } else {
        "OFF"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buzzer_on() -> Command {
        Command {
            device_id: DeviceId::from("esp32_01"),
            target: CommandTarget::Buzzer,
            desired_state: true,
        }
    }

    #[test]
    fn test_command_topic() {
        assert_eq!(
            command_topic("fire_alarm", &DeviceId::from("esp32_01"), CommandTarget::Buzzer),
            "fire_alarm/esp32_01/control/buzzer"
        );
        assert_eq!(
            command_topic("fire_alarm", &DeviceId::from("esp32_02"), CommandTarget::Valve),
            "fire_alarm/esp32_02/control/valve"
        );
    }

    #[test]
    fn test_command_token() {
        assert_eq!(command_token(true), "ON");
        assert_eq!(command_token(false), "OFF");
    }

    #[tokio::test]
    async fn test_send_while_disconnected_fails_fast() {
        let config = Config::default();
        let metrics = Arc::new(Metrics::new());
        let relay = CommandRelay::for_test(&config, metrics, false);

        let result = relay.send(&buzzer_on()).await;
        assert!(matches!(result, Err(RelayError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_while_connected_accepts_command() {
        let config = Config::default();
        let metrics = Arc::new(Metrics::new());
        let relay = CommandRelay::for_test(&config, metrics, true);

        // The test client queues the publish locally; accepted is enough here
        let result = relay.send(&buzzer_on()).await;
        assert!(result.is_ok());
    }
}
