//! Thin camera I/O helpers: still-image snapshots and stream URLs.
//!
//! These wrap the server's per-camera HTTP image endpoint and RTSP stream
//! endpoint. They carry no bridge logic; the host platform calls them when it
//! wants a preview image or a live stream source.

use crate::config::ServerConfig;
use crate::event::CameraChannel;
use std::path::Path;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Errors from snapshot retrieval.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Snapshot request failed: {0}")]
    Request(String),

    #[error("Snapshot request returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("Failed to write snapshot file: {0}")]
    Io(#[from] std::io::Error),
}

/// URL of the still-image endpoint for one camera.
pub fn snapshot_url(config: &ServerConfig, channel: CameraChannel) -> String {
    format!(
        "http://{}:{}/image?cameraNum={}",
        config.host, config.port, channel
    )
}

/// RTSP URL of the camera's live stream.
pub fn stream_url(config: &ServerConfig, channel: CameraChannel) -> String {
    format!(
        "rtsp://{}:{}/stream?cameraNum={}",
        config.host, config.rtsp_port, channel
    )
}

/// Fetch a snapshot and write it to `path`.
pub async fn fetch_snapshot(
    client: &reqwest::Client,
    config: &ServerConfig,
    channel: CameraChannel,
    path: &Path,
) -> Result<(), SnapshotError> {
    let url = snapshot_url(config, channel);
    debug!(url = %url, path = %path.display(), "Fetching snapshot");

    let response = client
        .get(&url)
        .basic_auth(&config.username, Some(&config.password))
        .timeout(config.request_timeout())
        .send()
        .await
        .map_err(|e| SnapshotError::Request(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SnapshotError::Status(response.status()));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| SnapshotError::Request(e.to_string()))?;

    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(&bytes).await?;
    file.flush().await?;

    Ok(())
}
