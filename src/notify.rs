//! Host-platform notification delivery.
//!
//! The detector enqueues [`MotionAction`]s; the notifier drains the queue and
//! delivers them through a [`MotionSink`]. Delivery is fire-and-forget from
//! the event pipeline's point of view: a failed notification is logged and
//! never retried here, and never affects the local episode state.

use crate::config::HostConfig;
use crate::event::Classification;
use crate::motion::MotionAction;
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// Errors surfaced by a motion sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Notification transport error: {0}")]
    Transport(String),

    #[error("Host platform rejected notification: {0}")]
    Rejected(String),
}

/// Capability for the host platform's two motion signals.
#[async_trait::async_trait]
pub trait MotionSink: Send + Sync {
    /// Signal the start of a motion episode, optionally classified.
    async fn notify_motion_start(
        &self,
        classification: Option<Classification>,
    ) -> Result<(), SinkError>;

    /// Signal the end of the current motion episode.
    async fn notify_motion_stop(&self) -> Result<(), SinkError>;
}

/// Drains the detector's action queue into a sink.
pub struct MotionNotifier {
    sink: Arc<dyn MotionSink>,
}

impl MotionNotifier {
    pub fn new(sink: Arc<dyn MotionSink>) -> Self {
        Self { sink }
    }

    /// Deliver actions until the queue closes.
    ///
    /// The queue closes when the detector is dropped, which happens after the
    /// supervisor loop exits; this task then drains what is left and returns.
    pub async fn run(self, mut actions: mpsc::Receiver<MotionAction>) {
        while let Some(action) = actions.recv().await {
            let result = match action {
                MotionAction::Start(classification) => {
                    self.sink.notify_motion_start(classification).await
                }
                MotionAction::Stop => self.sink.notify_motion_stop().await,
            };

            if let Err(e) = result {
                error!(action = ?action, error = %e, "Motion notification failed");
            } else {
                debug!(action = ?action, "Motion notification delivered");
            }
        }

        debug!("Notification queue closed, notifier exiting");
    }
}

/// Sink that POSTs motion signals to a configured webhook URL as JSON.
pub struct WebhookMotionSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookMotionSink {
    pub fn new(config: &HostConfig, url: String) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder()
            .timeout(config.notify_timeout())
            .build()
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        Ok(Self { client, url })
    }

    async fn post(&self, body: serde_json::Value) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| SinkError::Transport(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SinkError::Rejected(format!(
                "HTTP {} from {}",
                response.status(),
                self.url
            )));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl MotionSink for WebhookMotionSink {
    async fn notify_motion_start(
        &self,
        classification: Option<Classification>,
    ) -> Result<(), SinkError> {
        self.post(json!({
            "event": "motion_start",
            "classification": classification.and_then(|c| c.label()),
        }))
        .await
    }

    async fn notify_motion_stop(&self) -> Result<(), SinkError> {
        self.post(json!({ "event": "motion_stop" })).await
    }
}

/// Fallback sink used when no webhook URL is configured.
pub struct LogMotionSink;

#[async_trait::async_trait]
impl MotionSink for LogMotionSink {
    async fn notify_motion_start(
        &self,
        classification: Option<Classification>,
    ) -> Result<(), SinkError> {
        info!(classification = ?classification, "motion start (no sink configured)");
        Ok(())
    }

    async fn notify_motion_stop(&self) -> Result<(), SinkError> {
        info!("motion stop (no sink configured)");
        Ok(())
    }
}
