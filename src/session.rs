//! Session supervision: the outer reconnect loop of the bridge.
//!
//! One supervisor iteration owns one [`EventSession`]: connect, refresh the
//! server baseline, subscribe, and drive updates through the normalizer and
//! the motion detector until the session dies or ages out. Sessions are
//! deliberately bounded in lifetime; reaching the ceiling forces a reconnect
//! to bound resource growth and recover from silent upstream staleness.
//! The loop never terminates on its own, only through the shutdown token.

use crate::client::{EventClient, EventClientError, EventSession};
use crate::config::SessionConfig;
use crate::event::{EventNormalizer, RawUpdate};
use crate::motion::MotionDetector;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionEnd {
    /// Shutdown was requested.
    Cancelled,
    /// The session lifetime ceiling was reached; reconnect, not an error.
    DeadlineReached,
    /// The update queue closed underneath us.
    TransportClosed,
}

/// Runs the event pipeline forever, rebuilding the session on any failure.
pub struct SessionSupervisor {
    client: Arc<dyn EventClient>,
    normalizer: EventNormalizer,
    detector: Arc<MotionDetector>,
    config: SessionConfig,
    shutdown: CancellationToken,
}

impl SessionSupervisor {
    pub fn new(
        client: Arc<dyn EventClient>,
        normalizer: EventNormalizer,
        detector: Arc<MotionDetector>,
        config: SessionConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            client,
            normalizer,
            detector,
            config,
            shutdown,
        }
    }

    /// Run until shutdown. Each iteration starts from a clean `Idle` episode
    /// state and a freshly established session.
    pub async fn run(self) {
        let mut iteration = 0u64;

        while !self.shutdown.is_cancelled() {
            iteration += 1;
            self.detector.reset();

            let (mut session, mut updates) = match self.establish().await {
                Some(pair) => pair,
                None => break, // cancelled while retrying
            };

            info!(iteration, "Session established");
            let end = self.drive(&mut updates).await;
            session.disconnect().await;

            let stats = self.detector.stats();
            info!(
                iteration,
                end = ?end,
                starts = stats.starts_emitted,
                stops = stats.stops_emitted,
                suppressed = stats.duplicates_suppressed,
                "Session ended"
            );

            match end {
                SessionEnd::Cancelled => break,
                SessionEnd::DeadlineReached => {
                    info!(iteration, "Session ceiling reached, forcing reconnect");
                }
                SessionEnd::TransportClosed => {
                    warn!(iteration, "Event transport closed, reconnecting");
                }
            }
        }

        info!("Session supervisor stopped");
    }

    /// Connect, refresh and subscribe under capped exponential backoff.
    /// Returns `None` only when shutdown is requested mid-retry.
    async fn establish(
        &self,
    ) -> Option<(Box<dyn EventSession>, mpsc::Receiver<RawUpdate>)> {
        let mut backoff = ExponentialBackoff {
            initial_interval: self.config.retry_base_delay(),
            max_interval: self.config.retry_max_delay(),
            max_elapsed_time: None,
            ..Default::default()
        };

        loop {
            if self.shutdown.is_cancelled() {
                return None;
            }

            match self.try_establish().await {
                Ok(pair) => return Some(pair),
                Err(e) => {
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| self.config.retry_max_delay());
                    warn!(
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Session establishment failed, retrying"
                    );
                    tokio::select! {
                        _ = self.shutdown.cancelled() => return None,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    async fn try_establish(
        &self,
    ) -> Result<(Box<dyn EventSession>, mpsc::Receiver<RawUpdate>), EventClientError> {
        let mut session = self.client.connect().await?;

        if let Err(e) = session.refresh().await {
            session.disconnect().await;
            return Err(e);
        }

        match session.subscribe().await {
            Ok(updates) => Ok((session, updates)),
            Err(e) => {
                session.disconnect().await;
                Err(e)
            }
        }
    }

    /// Pump updates through the pipeline until the session ends.
    async fn drive(&self, updates: &mut mpsc::Receiver<RawUpdate>) -> SessionEnd {
        let deadline = tokio::time::sleep(self.config.max_session());
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => return SessionEnd::Cancelled,
                _ = &mut deadline => return SessionEnd::DeadlineReached,
                update = updates.recv() => match update {
                    Some(update) => self.process(update),
                    None => return SessionEnd::TransportClosed,
                },
            }
        }
    }

    fn process(&self, update: RawUpdate) {
        match self.normalizer.normalize(&update) {
            Some((classification, edge)) => {
                debug!(classification = ?classification, edge = ?edge, "Normalized update");
                self.detector.apply(classification, edge);
            }
            None => trace!("Irrelevant update discarded"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{CameraChannel, Classification};
    use crate::motion::MotionAction;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::time::Duration;

    fn human(on: bool) -> RawUpdate {
        match json!({
            "event_object": "Human",
            "event_type": "motion",
            "event_on": on,
            "live_stream": "stream-1",
        }) {
            serde_json::Value::Object(map) => RawUpdate(map),
            _ => unreachable!(),
        }
    }

    /// Scripted client: each `connect` pops the next session's updates; an
    /// exhausted script cancels the shutdown token so `run` returns.
    struct ScriptedClient {
        sessions: Mutex<VecDeque<SessionScript>>,
        shutdown: CancellationToken,
    }

    struct SessionScript {
        updates: Vec<RawUpdate>,
        /// Keep the sender alive after delivering, so the session only ends
        /// via the deadline or cancellation.
        hold_open: bool,
    }

    struct ScriptedSession {
        script: Option<SessionScript>,
        held: Option<mpsc::Sender<RawUpdate>>,
    }

    #[async_trait::async_trait]
    impl EventClient for ScriptedClient {
        async fn connect(&self) -> Result<Box<dyn EventSession>, EventClientError> {
            match self.sessions.lock().pop_front() {
                Some(script) => Ok(Box::new(ScriptedSession {
                    script: Some(script),
                    held: None,
                })),
                None => {
                    self.shutdown.cancel();
                    Err(EventClientError::ConnectionFailed("script ended".into()))
                }
            }
        }
    }

    #[async_trait::async_trait]
    impl EventSession for ScriptedSession {
        async fn refresh(&mut self) -> Result<(), EventClientError> {
            Ok(())
        }

        async fn subscribe(&mut self) -> Result<mpsc::Receiver<RawUpdate>, EventClientError> {
            let script = self.script.take().expect("subscribe called twice");
            let (tx, rx) = mpsc::channel(16);
            for update in script.updates {
                tx.send(update).await.expect("receiver alive");
            }
            if script.hold_open {
                self.held = Some(tx);
            }
            Ok(rx)
        }

        async fn disconnect(&mut self) {
            self.held = None;
        }
    }

    fn supervisor(
        sessions: Vec<SessionScript>,
        session_config: SessionConfig,
    ) -> (SessionSupervisor, mpsc::Receiver<MotionAction>, CancellationToken) {
        let shutdown = CancellationToken::new();
        let client = Arc::new(ScriptedClient {
            sessions: Mutex::new(sessions.into()),
            shutdown: shutdown.clone(),
        });
        let (detector, actions) = MotionDetector::new(CameraChannel(1), 16);
        let supervisor = SessionSupervisor::new(
            client,
            EventNormalizer::new(CameraChannel(1)),
            Arc::new(detector),
            session_config,
            shutdown.clone(),
        );
        (supervisor, actions, shutdown)
    }

    fn fast_config() -> SessionConfig {
        SessionConfig {
            max_session_secs: 3600,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 50,
        }
    }

    fn drain(rx: &mut mpsc::Receiver<MotionAction>) -> Vec<MotionAction> {
        let mut actions = Vec::new();
        while let Ok(action) = rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    #[tokio::test(start_paused = true)]
    async fn test_updates_flow_through_pipeline() {
        let sessions = vec![SessionScript {
            updates: vec![human(true), human(true), human(false)],
            hold_open: false,
        }];
        let (supervisor, mut actions, _shutdown) = supervisor(sessions, fast_config());

        supervisor.run().await;

        assert_eq!(
            drain(&mut actions),
            vec![
                MotionAction::Start(Some(Classification::Person)),
                MotionAction::Stop,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_resets_episode_state() {
        // Session 1 ends (transport close) while motion is active; session 2
        // must start from Idle and emit a fresh start immediately.
        let sessions = vec![
            SessionScript {
                updates: vec![human(true)],
                hold_open: false,
            },
            SessionScript {
                updates: vec![human(true)],
                hold_open: false,
            },
        ];
        let (supervisor, mut actions, _shutdown) = supervisor(sessions, fast_config());

        supervisor.run().await;

        assert_eq!(
            drain(&mut actions),
            vec![
                MotionAction::Start(Some(Classification::Person)),
                MotionAction::Start(Some(Classification::Person)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_ceiling_forces_reconnect() {
        // Both sessions stay open; only the ceiling can end them.
        let sessions = vec![
            SessionScript {
                updates: vec![human(true)],
                hold_open: true,
            },
            SessionScript {
                updates: vec![human(true)],
                hold_open: true,
            },
        ];
        let (supervisor, mut actions, _shutdown) = supervisor(sessions, fast_config());

        supervisor.run().await;

        // Two sessions, two resets, two fresh starts.
        assert_eq!(
            drain(&mut actions),
            vec![
                MotionAction::Start(Some(Classification::Person)),
                MotionAction::Start(Some(Classification::Person)),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_prompt_during_session() {
        let sessions = vec![SessionScript {
            updates: vec![],
            hold_open: true,
        }];
        let (supervisor, _actions, shutdown) = supervisor(sessions, fast_config());

        let handle = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor must stop promptly")
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_is_prompt_during_retry() {
        // Empty script: every connect fails, leaving the supervisor in its
        // retry sleep, where cancellation must still be prompt.
        let shutdown = CancellationToken::new();
        let client = Arc::new(ScriptedClient {
            sessions: Mutex::new(VecDeque::new()),
            shutdown: CancellationToken::new(), // script-end does not cancel here
        });
        let (detector, _actions) = MotionDetector::new(CameraChannel(1), 16);
        let supervisor = SessionSupervisor::new(
            client,
            EventNormalizer::new(CameraChannel(1)),
            Arc::new(detector),
            SessionConfig {
                max_session_secs: 3600,
                retry_base_delay_ms: 60_000,
                retry_max_delay_ms: 60_000,
            },
            shutdown.clone(),
        );

        let handle = tokio::spawn(supervisor.run());
        tokio::time::sleep(Duration::from_millis(5)).await;
        shutdown.cancel();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("supervisor must stop promptly")
            .unwrap();
    }
}
