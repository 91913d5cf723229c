//! Event client capability and its SecuritySpy HTTP implementation.
//!
//! The bridge consumes the camera server through two narrow traits:
//! [`EventClient`] opens a session, [`EventSession`] performs the baseline
//! refresh, delivers raw updates over a serialized single-consumer queue, and
//! tears the connection down. Each session is owned by exactly one supervisor
//! iteration and is never reused across reconnect cycles.

use crate::config::ServerConfig;
use crate::event::RawUpdate;
use futures::StreamExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Capacity of the per-session update queue.
const UPDATE_QUEUE_SIZE: usize = 64;

/// Errors that can occur against the camera server.
#[derive(Debug, Error)]
pub enum EventClientError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Handshake refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Subscription failed: {0}")]
    SubscriptionFailed(String),

    #[error("Event stream closed unexpectedly")]
    Disconnected,
}

/// Opens sessions against the camera server.
#[async_trait::async_trait]
pub trait EventClient: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn EventSession>, EventClientError>;
}

/// One live connection to the camera server's event feed.
#[async_trait::async_trait]
pub trait EventSession: Send {
    /// Synchronous state refresh against the server, establishing a
    /// consistent baseline before subscribing.
    async fn refresh(&mut self) -> Result<(), EventClientError>;

    /// Begin update delivery. The returned queue closes when the underlying
    /// transport fails or the session is torn down.
    async fn subscribe(&mut self) -> Result<mpsc::Receiver<RawUpdate>, EventClientError>;

    /// Tear down the subscription and release the connection.
    async fn disconnect(&mut self);
}

/// SecuritySpy server client speaking the HTTP event API.
pub struct SecuritySpyClient {
    config: ServerConfig,
    client: reqwest::Client,
}

impl SecuritySpyClient {
    pub fn new(config: ServerConfig) -> Result<Self, EventClientError> {
        // No global request timeout: the event stream is a deliberately
        // long-lived response. Only connection establishment is bounded.
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .build()
            .map_err(|e| EventClientError::ConnectionFailed(e.to_string()))?;

        Ok(Self { config, client })
    }
}

#[async_trait::async_trait]
impl EventClient for SecuritySpyClient {
    async fn connect(&self) -> Result<Box<dyn EventSession>, EventClientError> {
        Ok(Box::new(SecuritySpySession {
            config: self.config.clone(),
            client: self.client.clone(),
            reader: None,
        }))
    }
}

/// A live SecuritySpy session: the handshake endpoint plus the streaming
/// event endpoint, read by a spawned forwarder task.
struct SecuritySpySession {
    config: ServerConfig,
    client: reqwest::Client,
    reader: Option<JoinHandle<()>>,
}

#[async_trait::async_trait]
impl EventSession for SecuritySpySession {
    async fn refresh(&mut self) -> Result<(), EventClientError> {
        let url = system_info_url(&self.config);
        debug!(url = %url, "Refreshing server baseline");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .timeout(self.config.request_timeout())
            .send()
            .await
            .map_err(|e| EventClientError::RefreshFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EventClientError::RefreshFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        // Body content is irrelevant; the round trip is the baseline.
        let _ = response.bytes().await;
        Ok(())
    }

    async fn subscribe(&mut self) -> Result<mpsc::Receiver<RawUpdate>, EventClientError> {
        let url = event_stream_url(&self.config);
        info!(url = %url, "Subscribing to event stream");

        let response = self
            .client
            .get(&url)
            .basic_auth(&self.config.username, Some(&self.config.password))
            .send()
            .await
            .map_err(|e| EventClientError::SubscriptionFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(EventClientError::SubscriptionFailed(format!(
                "HTTP {}",
                response.status()
            )));
        }

        let (tx, rx) = mpsc::channel(UPDATE_QUEUE_SIZE);
        self.reader = Some(tokio::spawn(forward_updates(response, tx)));
        Ok(rx)
    }

    async fn disconnect(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        debug!("Event session disconnected");
    }
}

impl Drop for SecuritySpySession {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Read the streaming response line by line and forward parsed records.
///
/// Ends on transport error or when the receiver is dropped; either way the
/// closed queue is the supervisor's signal to rebuild the session.
async fn forward_updates(response: reqwest::Response, tx: mpsc::Sender<RawUpdate>) {
    let mut stream = response.bytes_stream();
    let mut lines = LineBuffer::default();

    while let Some(chunk) = stream.next().await {
        let chunk = match chunk {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!(error = %e, "Event stream read failed");
                return;
            }
        };

        for update in lines.push(&chunk) {
            if tx.send(update).await.is_err() {
                return;
            }
        }
    }

    info!("Event stream ended");
}

/// Accumulates stream chunks and yields one `RawUpdate` per complete line.
/// Lines that are not valid JSON objects are dropped silently.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<RawUpdate> {
        self.pending.extend_from_slice(chunk);

        let mut updates = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            if let Ok(text) = std::str::from_utf8(&line) {
                if let Some(update) = RawUpdate::from_json_line(text.trim()) {
                    updates.push(update);
                }
            }
        }
        updates
    }
}

fn system_info_url(config: &ServerConfig) -> String {
    format!("http://{}:{}/systemInfo", config.host, config.port)
}

fn event_stream_url(config: &ServerConfig) -> String {
    format!("http://{}:{}/eventStream?format=json", config.host, config.port)
}
