//! SecuritySpy motion bridge
//!
//! Long-running service that subscribes to a SecuritySpy server's event
//! stream and forwards normalized motion start/stop signals for one camera
//! channel to the host surveillance platform.
//!
//! # Configuration
//!
//! Configuration is loaded from:
//! 1. Configuration files (config/default.toml, config/{env}.toml)
//! 2. Environment variables (prefixed with BRIDGE_)
//!
//! See `config.rs` for detailed configuration options.

use anyhow::Context;
use secspy_bridge::config::{BridgeConfig, LoggingConfig};
use secspy_bridge::{
    CameraChannel, EventNormalizer, LogMotionSink, MotionDetector, MotionNotifier, MotionSink,
    SecuritySpyClient, SessionSupervisor, WebhookMotionSink,
};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    init_logging(&config.logging)?;

    info!(
        service = "secspy-bridge",
        version = env!("CARGO_PKG_VERSION"),
        server = %config.server.host,
        camera = config.camera.number,
        "Starting motion bridge"
    );

    config.validate().context("Invalid configuration")?;

    let channel = CameraChannel(config.camera.number);
    let client = Arc::new(
        SecuritySpyClient::new(config.server.clone()).context("Failed to build event client")?,
    );

    let sink: Arc<dyn MotionSink> = match &config.host.notify_url {
        Some(url) => {
            info!(url = %url, "Delivering motion notifications via webhook");
            Arc::new(
                WebhookMotionSink::new(&config.host, url.clone())
                    .context("Failed to build webhook sink")?,
            )
        }
        None => {
            warn!("No notify_url configured, motion notifications are log-only");
            Arc::new(LogMotionSink)
        }
    };

    let (detector, actions) = MotionDetector::new(channel, config.host.notify_queue_size);
    let detector = Arc::new(detector);
    let notifier_handle = tokio::spawn(MotionNotifier::new(sink).run(actions));

    let shutdown = CancellationToken::new();
    let supervisor = SessionSupervisor::new(
        client,
        EventNormalizer::new(channel),
        detector.clone(),
        config.session.clone(),
        shutdown.clone(),
    );
    let supervisor_handle = tokio::spawn(supervisor.run());

    signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;
    info!("Received shutdown signal");

    shutdown.cancel();
    supervisor_handle
        .await
        .context("Supervisor task panicked")?;

    let stats = detector.stats();
    info!(
        starts = stats.starts_emitted,
        stops = stats.stops_emitted,
        suppressed = stats.duplicates_suppressed,
        dropped = stats.actions_dropped,
        "Final motion stats"
    );

    // Closing the detector's queue lets the notifier drain and exit.
    drop(detector);
    notifier_handle.await.context("Notifier task panicked")?;

    info!("Shutdown complete");
    Ok(())
}

/// Load and validate configuration.
fn load_config() -> anyhow::Result<BridgeConfig> {
    // Try loading from files first, fall back to environment
    let config = BridgeConfig::load().or_else(|e| {
        eprintln!("Failed to load config from files ({e}), trying environment");
        BridgeConfig::from_env()
    })?;

    Ok(config)
}

/// Initialize the tracing/logging subsystem.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = match config.level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env()
        .add_directive(format!("secspy_bridge={}", level).parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("hyper=warn".parse()?);

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber.with(fmt::layer().pretty()).init();
    }

    Ok(())
}
