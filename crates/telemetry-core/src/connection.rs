//! Connection session state and the trackers that drive it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::config::ReconnectPolicy;

/// Lifecycle of the outbound streaming session.
///
/// `Idle -> Connecting -> Streaming -> Degraded (reconnecting) -> Closed`, with
/// `Failed` once the reconnect budget is spent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Streaming,
    Degraded,
    Closed,
    Failed,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Failed)
    }

    pub fn is_transitioning(&self) -> bool {
        matches!(
            self,
            ConnectionState::Connecting | ConnectionState::Degraded
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Degraded => "degraded",
            ConnectionState::Closed => "closed",
            ConnectionState::Failed => "failed",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only view of one streaming session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Opaque id assigned by the collector or generated locally.
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub state: ConnectionState,
    pub records_sent: u64,
    pub records_dropped: u64,
    pub reconnect_attempts: u32,
}

/// Reconnect bookkeeping for the streaming supervisor.
#[derive(Debug, Clone)]
pub struct ReconnectTracker {
    policy: ReconnectPolicy,
    attempts: u32,
    state: ConnectionState,
}

impl ReconnectTracker {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            state: ConnectionState::Idle,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn mark_connecting(&mut self) {
        if !self.state.is_terminal() {
            self.state = ConnectionState::Connecting;
        }
    }

    /// Connection established; the attempt budget starts over.
    pub fn mark_connected(&mut self) {
        self.attempts = 0;
        self.state = ConnectionState::Streaming;
    }

    /// Link dropped or a connect attempt failed.
    ///
    /// Returns the backoff before the next attempt, or `None` when the budget is
    /// spent and the state moved to `Failed`.
    pub fn next_attempt(&mut self) -> Option<Duration> {
        if self.state.is_terminal() {
            return None;
        }
        if self.policy.is_exhausted(self.attempts) {
            self.state = ConnectionState::Failed;
            return None;
        }
        self.attempts += 1;
        self.state = ConnectionState::Degraded;
        Some(self.policy.delay_for_attempt(self.attempts))
    }

    pub fn mark_closed(&mut self) {
        if self.state != ConnectionState::Failed {
            self.state = ConnectionState::Closed;
        }
    }
}

/// Detects a source that went silent.
#[derive(Debug, Clone)]
pub struct StalenessTracker {
    timeout: Duration,
    last_data: Option<Instant>,
}

impl StalenessTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_data: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn record_data_received(&mut self) {
        self.record_data_at(Instant::now());
    }

    pub fn record_data_at(&mut self, now: Instant) {
        self.last_data = Some(now);
    }

    /// Start the timeout window without having seen data yet.
    pub fn arm(&mut self) {
        self.last_data = Some(Instant::now());
    }

    pub fn reset(&mut self) {
        self.last_data = None;
    }

    pub fn is_timed_out(&self) -> bool {
        self.is_timed_out_at(Instant::now())
    }

    pub fn is_timed_out_at(&self, now: Instant) -> bool {
        match self.last_data {
            Some(last) => now.saturating_duration_since(last) > self.timeout,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    fn policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            base_delay_ms: 100,
            max_delay_ms: 250,
        }
    }

    #[test]
    fn test_connection_state_predicates() -> TestResult {
        assert!(ConnectionState::Streaming.is_connected());
        assert!(!ConnectionState::Degraded.is_connected());
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Connecting.is_transitioning());
        assert_eq!(ConnectionState::default(), ConnectionState::Idle);
        Ok(())
    }

    #[test]
    fn test_reconnect_budget_ends_in_failed() -> TestResult {
        let mut tracker = ReconnectTracker::new(policy(3));
        tracker.mark_connecting();
        tracker.mark_connected();
        assert_eq!(tracker.state(), ConnectionState::Streaming);

        let delays: Vec<Duration> = std::iter::from_fn(|| tracker.next_attempt()).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(250)
            ]
        );
        assert_eq!(tracker.state(), ConnectionState::Failed);
        assert_eq!(tracker.attempts(), 3);

        tracker.mark_closed();
        assert_eq!(tracker.state(), ConnectionState::Failed);
        Ok(())
    }

    #[test]
    fn test_successful_connect_resets_attempts() -> TestResult {
        let mut tracker = ReconnectTracker::new(policy(3));
        assert!(tracker.next_attempt().is_some());
        assert!(tracker.next_attempt().is_some());
        assert_eq!(tracker.state(), ConnectionState::Degraded);

        tracker.mark_connected();
        assert_eq!(tracker.attempts(), 0);
        assert_eq!(tracker.next_attempt(), Some(Duration::from_millis(100)));
        Ok(())
    }

    #[test]
    fn test_staleness_tracker() -> TestResult {
        let mut tracker = StalenessTracker::new(Duration::from_millis(50));
        let start = Instant::now();
        assert!(!tracker.is_timed_out_at(start));

        tracker.record_data_at(start);
        assert!(!tracker.is_timed_out_at(start + Duration::from_millis(50)));
        assert!(tracker.is_timed_out_at(start + Duration::from_millis(51)));

        tracker.reset();
        assert!(!tracker.is_timed_out_at(start + Duration::from_secs(10)));
        Ok(())
    }

    #[test]
    fn test_session_snapshot_serializes_state_in_snake_case() -> TestResult {
        let snapshot = SessionSnapshot {
            session_id: "abc".to_string(),
            created_at: Utc::now(),
            state: ConnectionState::Streaming,
            records_sent: 12,
            records_dropped: 1,
            reconnect_attempts: 0,
        };
        let json = serde_json::to_value(&snapshot)?;
        assert_eq!(json["state"], "streaming");
        assert_eq!(json["records_sent"], 12);
        let back: SessionSnapshot = serde_json::from_value(json)?;
        assert_eq!(back, snapshot);
        Ok(())
    }
}
