//! MQTT client for receiving device sensor reports
//!
//! Subscribes to the three sensor topics on every ConnAck (sessions
//! are clean, so the broker forgets the subscription set on every
//! reconnect) and feeds normalized reports into the bounded pipeline
//! channel. Reports are sent via try_send to avoid blocking the MQTT
//! eventloop; drops are counted in metrics and logged (rate-limited).
//! Reconnects are handled by rumqttc's own retry loop - delivery
//! during a disconnect is best-effort by design.

use crate::domain::types::{
    epoch_ms, DeviceId, IngestedReport, ReportBody, ReportKind, SensorPayload, SensorReading,
    StatePayload,
};
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Why an inbound payload produced no report
#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("unrecognized topic: {0}")]
    UnrecognizedTopic(String),
    #[error("malformed payload: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("payload and topic both lack a device id")]
    MissingDeviceId,
}

/// Start the ingest client and send normalized reports to the channel
pub async fn start_ingest_client(
    config: &Config,
    report_tx: mpsc::Sender<IngestedReport>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("firebridge-ingest-{}", std::process::id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let prefix = config.topic_prefix().to_string();
    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);

    info!(
        prefix = %prefix,
        host = %config.mqtt_host(),
        port = %config.mqtt_port(),
        "ingest_starting"
    );

    // Rate-limit drop warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("ingest_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let report = match normalize(&prefix, &publish.topic, &publish.payload, epoch_ms()) {
                            Ok(report) => report,
                            Err(NormalizeError::UnrecognizedTopic(topic)) => {
                                metrics.record_unrecognized_topic();
                                debug!(topic = %topic, "ingest_unrecognized_topic");
                                continue;
                            }
                            Err(e) => {
                                metrics.record_parse_failure();
                                warn!(topic = %publish.topic, error = %e, "ingest_payload_dropped");
                                continue;
                            }
                        };

                        debug!(
                            device_id = %report.device_id,
                            kind = %report.kind().as_str(),
                            "report_normalized"
                        );
                        metrics.record_report_received();

                        if let Err(e) = report_tx.try_send(report) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_channel_drop();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("report_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("report channel closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        // Clean session: the broker holds no subscription
                        // state across reconnects, so every ConnAck needs
                        // a fresh subscribe
                        for filter in sensor_filters(&prefix) {
                            if let Err(e) = client.subscribe(&filter, QoS::AtMostOnce).await {
                                error!(filter = %filter, error = %e, "ingest_subscribe_failed");
                            }
                        }
                        info!("ingest_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "ingest_mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}

/// Subscription filters covering the three sensor report topics
pub fn sensor_filters(prefix: &str) -> [String; 3] {
    ["flame", "gas", "state"].map(|leaf| format!("{}/+/sensor/{}", prefix, leaf))
}

/// Classify a topic into a report kind and extract its device segment.
///
/// Topics have the shape `<prefix>/<device_id>/sensor/<leaf>`; anything
/// else is Unrecognized.
pub fn classify_topic<'a>(prefix: &str, topic: &'a str) -> (ReportKind, Option<&'a str>) {
    let Some(rest) = topic.strip_prefix(prefix).and_then(|r| r.strip_prefix('/')) else {
        return (ReportKind::Unrecognized, None);
    };

    let mut segments = rest.split('/');
    let device = segments.next().filter(|s| !s.is_empty());
    let channel = segments.next();
    let leaf = segments.next();

    if channel != Some("sensor") || segments.next().is_some() {
        return (ReportKind::Unrecognized, device);
    }

    let kind = match leaf {
        Some("flame") => ReportKind::Flame,
        Some("gas") => ReportKind::Gas,
        Some("state") => ReportKind::CombinedState,
        _ => ReportKind::Unrecognized,
    };
    (kind, device)
}

/// Parse one raw payload into a normalized report.
///
/// The payload's own `device_id` wins; the topic segment is the
/// fallback for firmware that omits it.
pub fn normalize(
    prefix: &str,
    topic: &str,
    payload: &[u8],
    received_at: u64,
) -> Result<IngestedReport, NormalizeError> {
    let (kind, topic_device) = classify_topic(prefix, topic);

    let (device_id, device_timestamp, body) = match kind {
        ReportKind::Unrecognized => {
            return Err(NormalizeError::UnrecognizedTopic(topic.to_string()));
        }
        ReportKind::Flame | ReportKind::Gas => {
            let parsed: SensorPayload = serde_json::from_slice(payload)?;
            let reading = SensorReading { detected: parsed.do_state, reading: parsed.ao_value };
            let body = if kind == ReportKind::Flame {
                ReportBody::Flame(reading)
            } else {
                ReportBody::Gas(reading)
            };
            (parsed.device_id, parsed.timestamp, body)
        }
        ReportKind::CombinedState => {
            let parsed: StatePayload = serde_json::from_slice(payload)?;
            let body = ReportBody::Actuators(crate::domain::types::ActuatorFlags {
                buzzer: parsed.buzzer,
                valve: parsed.valve,
            });
            (parsed.device_id, parsed.timestamp, body)
        }
    };

    let device_id = device_id
        .or_else(|| topic_device.map(DeviceId::from))
        .ok_or(NormalizeError::MissingDeviceId)?;

    Ok(IngestedReport {
        device_id,
        topic: topic.to_string(),
        received_at,
        device_timestamp,
        body,
    })
}
