//! The push fabric.
//!
//! Two logical channels ride on long-lived WebSocket connections: `jobs`
//! streams job lifecycle events, `performance` streams the shared
//! performance-control state and accepts control commands. Every connection
//! starts with a snapshot, after which incremental events follow; a client
//! that falls behind the bus is told to `resync` and re-request a snapshot,
//! giving at-least-once delivery overall.
//!
//! Client commands never mutate state directly: they re-enter through the
//! coordinator, and only the authoritative post-commit state is broadcast,
//! to the sender like everyone else.

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::Result;
use crate::events::{BusMessage, EventBus};
use crate::models::PerformanceControlPatch;
use crate::services::coordinator::Coordinator;
use crate::services::job_store::JobStore;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

/// One outbound frame: `{ "type": ..., "payload": ... }`.
#[derive(Debug, Serialize)]
struct Frame {
    #[serde(rename = "type")]
    frame_type: String,
    payload: serde_json::Value,
}

impl Frame {
    fn new(frame_type: &str, payload: serde_json::Value) -> Self {
        Self {
            frame_type: frame_type.to_string(),
            payload,
        }
    }

    fn resync() -> Self {
        Self::new("resync", json!({}))
    }

    fn to_message(&self) -> Message {
        Message::Text(serde_json::to_string(self).expect("frame serializes"))
    }
}

/// Inbound client frame on the performance channel.
#[derive(Debug, Deserialize)]
struct ClientFrame {
    #[serde(rename = "type")]
    frame_type: String,
    #[serde(default)]
    payload: serde_json::Value,
}

pub struct PushHub {
    coordinator: Arc<Coordinator>,
    jobs: Arc<JobStore>,
    bus: EventBus,
    job_retention: Duration,
    next_session: AtomicU64,
}

impl PushHub {
    pub fn new(
        coordinator: Arc<Coordinator>,
        jobs: Arc<JobStore>,
        bus: EventBus,
        job_retention: Duration,
    ) -> Self {
        Self {
            coordinator,
            jobs,
            bus,
            job_retention,
            next_session: AtomicU64::new(1),
        }
    }

    fn open_session(&self, channel: &str) -> u64 {
        let session = self.next_session.fetch_add(1, Ordering::Relaxed);
        tracing::info!(session, channel, "push session opened");
        session
    }

    /// Serve one `jobs` channel connection until it closes or idles out.
    pub async fn serve_jobs(&self, socket: WebSocket) {
        let session = self.open_session("jobs");
        // Subscribe before the snapshot: events committed after the snapshot
        // query are then never lost, only possibly duplicated.
        let mut sub = self.bus.subscribe("job.*");

        let (mut tx, mut rx) = socket.split();

        match self.jobs.snapshot_jobs(self.job_retention).await {
            Ok(jobs) => {
                let frame = Frame::new("snapshot", json!(jobs));
                if tx.send(frame.to_message()).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::error!(session, error = %e, "jobs snapshot failed");
                return;
            }
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await; // immediate first tick
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                incoming = rx.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            tracing::warn!(session, frame = %text, "unexpected frame on jobs channel");
                        }
                        Some(Ok(_)) => last_activity = Instant::now(),
                        Some(Err(_)) => break,
                    }
                }
                bus_msg = sub.recv() => {
                    let frame = match bus_msg {
                        Some(BusMessage::Event(event)) => {
                            Frame::new(event.frame_type(), event.frame_payload())
                        }
                        Some(BusMessage::Lost(_)) => Frame::resync(),
                        None => break,
                    };
                    if tx.send(frame.to_message()).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if last_activity.elapsed() > IDLE_TIMEOUT {
                        tracing::info!(session, "dropping idle jobs connection");
                        break;
                    }
                    if tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(session, "push session closed");
    }

    /// Serve one `performance` channel connection.
    pub async fn serve_performance(&self, socket: WebSocket) {
        let session = self.open_session("performance");
        let mut sub = self.bus.subscribe("performance.*");

        let (mut tx, mut rx) = socket.split();

        let state = self.coordinator.performance_state().await;
        let frame = Frame::new("state", json!(state));
        if tx.send(frame.to_message()).await.is_err() {
            return;
        }

        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut last_activity = Instant::now();

        loop {
            tokio::select! {
                incoming = rx.next() => {
                    match incoming {
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(Message::Text(text))) => {
                            last_activity = Instant::now();
                            if let Err(e) = self.handle_command(session, &text).await {
                                tracing::warn!(session, error = %e, "performance command rejected");
                            }
                        }
                        Some(Ok(_)) => last_activity = Instant::now(),
                        Some(Err(_)) => break,
                    }
                }
                bus_msg = sub.recv() => {
                    let frame = match bus_msg {
                        Some(BusMessage::Event(event)) => {
                            Frame::new(event.frame_type(), event.frame_payload())
                        }
                        Some(BusMessage::Lost(_)) => Frame::resync(),
                        None => break,
                    };
                    if tx.send(frame.to_message()).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if last_activity.elapsed() > IDLE_TIMEOUT {
                        tracing::info!(session, "dropping idle performance connection");
                        break;
                    }
                    if tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                }
            }
        }

        tracing::info!(session, "push session closed");
    }

    /// Translate a client command into a coordinator call. Unknown commands
    /// are ignored with a warning.
    async fn handle_command(&self, session: u64, raw: &str) -> Result<()> {
        let frame: ClientFrame = match serde_json::from_str(raw) {
            Ok(frame) => frame,
            Err(_) => {
                tracing::warn!(session, frame = %raw, "unparseable client frame ignored");
                return Ok(());
            }
        };

        match frame.frame_type.as_str() {
            "update_control" => {
                let patch: PerformanceControlPatch = serde_json::from_value(frame.payload)?;
                self.coordinator.update_performance_control(&patch).await?;
            }
            "play" => {
                self.coordinator.playback_play().await?;
            }
            "pause" => {
                self.coordinator.playback_pause().await?;
            }
            "seek" => {
                let position_ms = frame
                    .payload
                    .get("positionMs")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| crate::error::AppError::missing("positionMs"))?;
                self.coordinator.playback_seek(position_ms).await?;
            }
            other => {
                tracing::warn!(session, command = other, "unknown client command ignored");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_serialize_with_type_and_payload() {
        let frame = Frame::new("snapshot", json!([]));
        let text = serde_json::to_string(&frame).unwrap();
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "snapshot");
        assert!(value["payload"].is_array());
    }

    #[test]
    fn client_frames_tolerate_missing_payload() {
        let frame: ClientFrame = serde_json::from_str(r#"{"type":"play"}"#).unwrap();
        assert_eq!(frame.frame_type, "play");
        assert!(frame.payload.is_null());
    }
}
