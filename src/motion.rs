//! Per-channel motion state machine.
//!
//! This module tracks whether a motion episode is in progress for the bridge's
//! camera channel and turns normalized edges into host-platform actions while
//! enforcing idempotence: exactly one start per `Idle -> Active` transition and
//! exactly one stop per `Active -> Idle` transition, with redundant edges
//! silently absorbed. Actions are handed to the notifier over a bounded queue
//! so event delivery never blocks on host-platform I/O.

use crate::event::{CameraChannel, Classification, MotionEdge};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Current episode state for the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionState {
    Idle,
    Active(Classification),
}

/// An action to deliver to the host platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionAction {
    /// Motion started; `None` when the episode carries no object type.
    Start(Option<Classification>),
    /// Motion ended.
    Stop,
}

/// Counters for episode transitions and notification dispatch.
#[derive(Debug, Default, Clone)]
pub struct MotionStats {
    pub starts_emitted: u64,
    pub stops_emitted: u64,
    pub duplicates_suppressed: u64,
    pub actions_dropped: u64,
    pub episodes_discarded: u64,
}

struct DetectorInner {
    state: MotionState,
    stats: MotionStats,
}

/// The per-channel motion state machine.
///
/// `apply` serializes the state check, the transition and the action enqueue
/// under one lock, so concurrent deliveries for the same channel cannot both
/// observe `Idle` and both emit a start.
pub struct MotionDetector {
    channel: CameraChannel,
    inner: Mutex<DetectorInner>,
    actions: mpsc::Sender<MotionAction>,
}

impl MotionDetector {
    /// Create a detector and the receiving end of its action queue.
    pub fn new(channel: CameraChannel, queue_size: usize) -> (Self, mpsc::Receiver<MotionAction>) {
        let (tx, rx) = mpsc::channel(queue_size);
        let detector = Self {
            channel,
            inner: Mutex::new(DetectorInner {
                state: MotionState::Idle,
                stats: MotionStats::default(),
            }),
            actions: tx,
        };
        (detector, rx)
    }

    /// Current episode state.
    pub fn state(&self) -> MotionState {
        self.inner.lock().state
    }

    /// Current counters.
    pub fn stats(&self) -> MotionStats {
        self.inner.lock().stats.clone()
    }

    /// Consume one normalized edge, emitting at most one action.
    pub fn apply(&self, classification: Classification, edge: MotionEdge) {
        let mut inner = self.inner.lock();
        match (inner.state, edge) {
            (MotionState::Idle, MotionEdge::On) => {
                inner.state = MotionState::Active(classification);
                inner.stats.starts_emitted += 1;
                info!(
                    channel = %self.channel,
                    classification = ?classification,
                    "Motion episode started"
                );
                let payload = match classification {
                    Classification::Unspecified => None,
                    c => Some(c),
                };
                self.dispatch(MotionAction::Start(payload), &mut inner);
            }
            (MotionState::Active(current), MotionEdge::On) => {
                inner.stats.duplicates_suppressed += 1;
                debug!(
                    channel = %self.channel,
                    current = ?current,
                    "Duplicate start edge suppressed"
                );
            }
            (MotionState::Active(_), MotionEdge::Off) => {
                inner.state = MotionState::Idle;
                inner.stats.stops_emitted += 1;
                info!(channel = %self.channel, "Motion episode ended");
                self.dispatch(MotionAction::Stop, &mut inner);
            }
            (MotionState::Idle, MotionEdge::Off) => {
                inner.stats.duplicates_suppressed += 1;
                debug!(channel = %self.channel, "Stop edge while idle suppressed");
            }
        }
    }

    /// Reset to `Idle` at the start of a session iteration.
    ///
    /// An episode left open by the previous session is discarded rather than
    /// closed: its stop edge was lost with the old subscription, and the host
    /// platform handles the missing boundary on its side.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        if let MotionState::Active(classification) = inner.state {
            inner.stats.episodes_discarded += 1;
            info!(
                channel = %self.channel,
                classification = ?classification,
                "Discarding in-flight episode on session restart"
            );
        }
        inner.state = MotionState::Idle;
    }

    fn dispatch(&self, action: MotionAction, inner: &mut DetectorInner) {
        match self.actions.try_send(action) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(action)) => {
                inner.stats.actions_dropped += 1;
                warn!(
                    channel = %self.channel,
                    action = ?action,
                    "Notification queue full, dropping action"
                );
            }
            Err(mpsc::error::TrySendError::Closed(action)) => {
                inner.stats.actions_dropped += 1;
                warn!(
                    channel = %self.channel,
                    action = ?action,
                    "Notifier is gone, dropping action"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> (MotionDetector, mpsc::Receiver<MotionAction>) {
        MotionDetector::new(CameraChannel(1), 16)
    }

    fn drain(rx: &mut mpsc::Receiver<MotionAction>) -> Vec<MotionAction> {
        let mut actions = Vec::new();
        while let Ok(action) = rx.try_recv() {
            actions.push(action);
        }
        actions
    }

    #[test]
    fn test_start_emitted_once() {
        let (detector, mut rx) = detector();
        for _ in 0..5 {
            detector.apply(Classification::Person, MotionEdge::On);
        }
        assert_eq!(
            drain(&mut rx),
            vec![MotionAction::Start(Some(Classification::Person))]
        );
        assert_eq!(detector.state(), MotionState::Active(Classification::Person));
        let stats = detector.stats();
        assert_eq!(stats.starts_emitted, 1);
        assert_eq!(stats.duplicates_suppressed, 4);
    }

    #[test]
    fn test_stop_without_start_absorbed() {
        let (detector, mut rx) = detector();
        detector.apply(Classification::Person, MotionEdge::Off);
        detector.apply(Classification::Person, MotionEdge::Off);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(detector.state(), MotionState::Idle);
        assert_eq!(detector.stats().stops_emitted, 0);
    }

    #[test]
    fn test_episode_round_trip_ordering() {
        let (detector, mut rx) = detector();
        detector.apply(Classification::Person, MotionEdge::On);
        detector.apply(Classification::Person, MotionEdge::Off);
        detector.apply(Classification::Vehicle, MotionEdge::On);
        detector.apply(Classification::Vehicle, MotionEdge::Off);
        assert_eq!(
            drain(&mut rx),
            vec![
                MotionAction::Start(Some(Classification::Person)),
                MotionAction::Stop,
                MotionAction::Start(Some(Classification::Vehicle)),
                MotionAction::Stop,
            ]
        );
    }

    #[test]
    fn test_unspecified_start_carries_no_label() {
        let (detector, mut rx) = detector();
        detector.apply(Classification::Unspecified, MotionEdge::On);
        assert_eq!(drain(&mut rx), vec![MotionAction::Start(None)]);
    }

    #[test]
    fn test_redundant_off_after_episode() {
        let (detector, mut rx) = detector();
        detector.apply(Classification::Animal, MotionEdge::On);
        detector.apply(Classification::Animal, MotionEdge::Off);
        detector.apply(Classification::Animal, MotionEdge::Off);
        assert_eq!(
            drain(&mut rx),
            vec![
                MotionAction::Start(Some(Classification::Animal)),
                MotionAction::Stop,
            ]
        );
        assert_eq!(detector.stats().stops_emitted, 1);
    }

    #[test]
    fn test_reset_discards_active_episode() {
        let (detector, mut rx) = detector();
        detector.apply(Classification::Person, MotionEdge::On);
        detector.reset();
        assert_eq!(detector.state(), MotionState::Idle);
        assert_eq!(detector.stats().episodes_discarded, 1);

        // The next start edge produces a fresh start, not a leaked wait.
        detector.apply(Classification::Vehicle, MotionEdge::On);
        assert_eq!(
            drain(&mut rx),
            vec![
                MotionAction::Start(Some(Classification::Person)),
                MotionAction::Start(Some(Classification::Vehicle)),
            ]
        );
    }

    #[test]
    fn test_reset_while_idle_is_noop() {
        let (detector, _rx) = detector();
        detector.reset();
        assert_eq!(detector.state(), MotionState::Idle);
        assert_eq!(detector.stats().episodes_discarded, 0);
    }

    #[test]
    fn test_full_queue_drops_action() {
        let (detector, mut rx) = MotionDetector::new(CameraChannel(1), 1);
        detector.apply(Classification::Person, MotionEdge::On);
        detector.apply(Classification::Person, MotionEdge::Off);
        // Queue capacity is 1: the stop is dropped, the state still advanced.
        assert_eq!(
            drain(&mut rx),
            vec![MotionAction::Start(Some(Classification::Person))]
        );
        assert_eq!(detector.state(), MotionState::Idle);
        assert_eq!(detector.stats().actions_dropped, 1);
    }
}
