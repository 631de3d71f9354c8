//! MQTT client for receiving detection frames

use crate::domain::types::DetectionFrame;
use crate::infra::config::Config;
use crate::infra::metrics::Metrics;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Parse one frame payload (`{"frame": n, "detections": [...]}`)
///
/// `received_at` is stamped at parse time for latency measurement.
pub fn parse_frame(payload: &[u8]) -> Result<DetectionFrame, serde_json::Error> {
    serde_json::from_slice(payload)
}

/// Start the MQTT client and send parsed frames to the channel
///
/// Frames are sent via try_send to avoid blocking the MQTT eventloop.
/// Dropped frames are counted in metrics and logged (rate-limited).
pub async fn start_mqtt_client(
    config: &Config,
    frame_tx: mpsc::Sender<DetectionFrame>,
    metrics: Arc<Metrics>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let client_id = format!("{}-ingest", config.site_id());
    let mut mqttoptions = MqttOptions::new(client_id, config.mqtt_host(), config.mqtt_port());
    mqttoptions.set_keep_alive(Duration::from_secs(30));

    // Set credentials if configured
    if let (Some(username), Some(password)) = (config.mqtt_username(), config.mqtt_password()) {
        mqttoptions.set_credentials(username, password);
    }

    let (client, mut eventloop) = AsyncClient::new(mqttoptions, 100);
    client.subscribe(config.mqtt_topic(), QoS::AtMostOnce).await?;

    info!(topic = %config.mqtt_topic(), host = %config.mqtt_host(), port = %config.mqtt_port(), "mqtt_subscribed");

    // Rate-limit warnings to 1 per second
    let mut last_drop_warn = Instant::now() - Duration::from_secs(2);
    let mut last_parse_warn = Instant::now() - Duration::from_secs(2);

    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!("mqtt_shutdown");
                    return Ok(());
                }
            }
            result = eventloop.poll() => {
                match result {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let frame = match parse_frame(&publish.payload) {
                            Ok(frame) => frame,
                            Err(e) => {
                                metrics.record_frame_malformed();
                                if last_parse_warn.elapsed() > Duration::from_secs(1) {
                                    warn!(topic = %publish.topic, error = %e, "frame_parse_failed");
                                    last_parse_warn = Instant::now();
                                }
                                continue;
                            }
                        };

                        debug!(topic = %publish.topic, frame = ?frame.frame, detections = %frame.detections.len(), "frame_received");
                        metrics.record_frame_received();
                        if let Err(e) = frame_tx.try_send(frame) {
                            match e {
                                TrySendError::Full(_) => {
                                    metrics.record_frame_dropped();
                                    if last_drop_warn.elapsed() > Duration::from_secs(1) {
                                        warn!("frame_dropped: channel full");
                                        last_drop_warn = Instant::now();
                                    }
                                }
                                TrySendError::Closed(_) => {
                                    warn!("frame_channel_closed");
                                    return Ok(());
                                }
                            }
                        }
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!("mqtt_connected");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, "mqtt_error");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        }
    }
}
