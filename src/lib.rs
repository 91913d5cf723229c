//! secspy-bridge - SecuritySpy motion events for a host surveillance platform
//!
//! This library bridges a SecuritySpy server's proprietary event feed to a
//! normalized motion-detection protocol. It maintains a long-running
//! subscription to the server's event stream, translates vendor motion
//! notifications into an object-classification model, and guarantees
//! exactly-once start/stop transitions per motion episode despite duplicate
//! upstream emissions and periodic forced reconnects.
//!
//! # Architecture
//!
//! ```text
//! Event stream -> EventClient -> EventNormalizer -> MotionDetector -> MotionSink
//!                       ^                                                  |
//!                       +--- SessionSupervisor (reconnect loop)    host platform
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use secspy_bridge::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = BridgeConfig::load()?;
//!     let channel = CameraChannel(config.camera.number);
//!
//!     let client = Arc::new(SecuritySpyClient::new(config.server.clone())?);
//!     let (detector, actions) = MotionDetector::new(channel, config.host.notify_queue_size);
//!     tokio::spawn(MotionNotifier::new(Arc::new(LogMotionSink)).run(actions));
//!
//!     let supervisor = SessionSupervisor::new(
//!         client,
//!         EventNormalizer::new(channel),
//!         Arc::new(detector),
//!         config.session.clone(),
//!         CancellationToken::new(),
//!     );
//!     supervisor.run().await;
//!     Ok(())
//! }
//! ```

pub mod camera;
pub mod client;
pub mod config;
pub mod event;
pub mod motion;
pub mod notify;
pub mod session;

// Re-export main types
pub use client::{EventClient, EventClientError, EventSession, SecuritySpyClient};
pub use config::{BridgeConfig, ConfigValidationError, HostConfig, ServerConfig, SessionConfig};
pub use event::{CameraChannel, Classification, EventNormalizer, MotionEdge, RawUpdate};
pub use motion::{MotionAction, MotionDetector, MotionState, MotionStats};
pub use notify::{LogMotionSink, MotionNotifier, MotionSink, SinkError, WebhookMotionSink};
pub use session::SessionSupervisor;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::client::{EventClient, EventSession, SecuritySpyClient};
    pub use crate::config::BridgeConfig;
    pub use crate::event::{CameraChannel, Classification, EventNormalizer, MotionEdge, RawUpdate};
    pub use crate::motion::{MotionAction, MotionDetector, MotionState};
    pub use crate::notify::{LogMotionSink, MotionNotifier, MotionSink, WebhookMotionSink};
    pub use crate::session::SessionSupervisor;
}
