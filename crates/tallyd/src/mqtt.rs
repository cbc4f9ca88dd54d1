//! MQTT transport: frame ingest loop and result publishing.
//!
//! Subscribes to the frame topic and drives the pipeline on a spawned
//! task per frame, so a slow durable append never backs up the broker
//! connection. Every processed frame publishes exactly one result.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rumqttc::{AsyncClient, Event, MqttOptions, Packet, QoS};
use tally_core::{AttendancePipeline, InboundFrame, OutboundResult};
use uuid::Uuid;

use crate::config::Config;
use crate::sink::SqliteEventSink;

const POLL_RETRY_DELAY: Duration = Duration::from_secs(3);

/// Shared connection state for the health endpoint.
#[derive(Default)]
pub struct TransportStatus {
    connected: AtomicBool,
}

impl TransportStatus {
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set(&self, up: bool) {
        self.connected.store(up, Ordering::SeqCst);
    }
}

/// Connect to the broker and spawn the ingest loop.
pub fn spawn(
    config: &Config,
    pipeline: Arc<AttendancePipeline<SqliteEventSink>>,
) -> Arc<TransportStatus> {
    let client_id = format!("tallyd-{}", Uuid::new_v4());
    let mut options = MqttOptions::new(&client_id, &config.mqtt_host, config.mqtt_port);
    options.set_keep_alive(Duration::from_secs(config.mqtt_keepalive_secs));
    if !config.mqtt_username.is_empty() {
        options.set_credentials(&config.mqtt_username, &config.mqtt_password);
    }

    let (client, mut event_loop) = AsyncClient::new(options, 100);
    let status = Arc::new(TransportStatus::default());

    let topic_frame = config.topic_frame.clone();
    let topic_result = config.topic_result.clone();
    let loop_status = status.clone();

    tokio::spawn(async move {
        tracing::info!(client_id = %client_id, "mqtt ingest loop started");
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    loop_status.set(true);
                    tracing::info!(topic = %topic_frame, "connected to broker; subscribing");
                    // Subscribing on every ConnAck covers reconnects too
                    if let Err(err) = client.subscribe(&topic_frame, QoS::AtLeastOnce).await {
                        tracing::error!(error = %err, "frame topic subscribe failed");
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    tracing::debug!(
                        topic = %publish.topic,
                        bytes = publish.payload.len(),
                        "frame received"
                    );
                    let frame = InboundFrame {
                        payload: publish.payload.clone(),
                        received_at: Utc::now(),
                        source: Some(publish.topic.clone()),
                    };
                    let pipeline = pipeline.clone();
                    let client = client.clone();
                    let topic_result = topic_result.clone();
                    tokio::spawn(async move {
                        let result = pipeline.process(frame).await;
                        publish_result(&client, &topic_result, &result).await;
                    });
                }
                Ok(Event::Incoming(Packet::Disconnect)) => {
                    loop_status.set(false);
                    tracing::warn!("broker disconnected; will reconnect");
                }
                Ok(_) => {}
                Err(err) => {
                    loop_status.set(false);
                    tracing::warn!(error = %err, "mqtt poll error; retrying");
                    tokio::time::sleep(POLL_RETRY_DELAY).await;
                }
            }
        }
    });

    status
}

async fn publish_result(client: &AsyncClient, topic: &str, result: &OutboundResult) {
    match serde_json::to_vec(result) {
        Ok(payload) => {
            if let Err(err) = client.publish(topic, QoS::AtLeastOnce, false, payload).await {
                tracing::error!(error = %err, "result publish failed");
            }
        }
        Err(err) => tracing::error!(error = %err, "result serialization failed"),
    }
}
