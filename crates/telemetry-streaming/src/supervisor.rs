//! Connection supervision on its own task.
//!
//! The sampler hands records to [`StreamingHandle::submit`], which never
//! blocks: records go into a bounded queue and the newest one is dropped when
//! the queue is full. The supervisor task drains the queue into the
//! [`StreamingClient`], reconnects with the configured backoff when the link
//! drops, and gives up with a terminal `Failed` state once the reconnect
//! budget is spent.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use racing_telemetry_core::{
    CaptureConfig, ConnectionState, ReconnectTracker, SessionSnapshot, StreamingError,
    TelemetryRecord,
};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::StreamingClient;
use crate::session::{SessionClient, local_session_id};

/// Slack on top of the session-end timeout when joining the supervisor.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Connection state shared between the supervisor (writer) and status
/// queries (readers). `records_dropped` is the only field the sampler side
/// writes.
#[derive(Debug)]
pub struct StreamingStatus {
    created_at: DateTime<Utc>,
    state: RwLock<ConnectionState>,
    session_id: RwLock<Option<String>>,
    records_sent: AtomicU64,
    records_dropped: AtomicU64,
    reconnect_attempts: AtomicU32,
}

impl Default for StreamingStatus {
    fn default() -> Self {
        Self {
            created_at: Utc::now(),
            state: RwLock::new(ConnectionState::Idle),
            session_id: RwLock::new(None),
            records_sent: AtomicU64::new(0),
            records_dropped: AtomicU64::new(0),
            reconnect_attempts: AtomicU32::new(0),
        }
    }
}

impl StreamingStatus {
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn session_id(&self) -> Option<String> {
        self.session_id.read().clone()
    }

    pub fn records_sent(&self) -> u64 {
        self.records_sent.load(Ordering::Relaxed)
    }

    pub fn records_dropped(&self) -> u64 {
        self.records_dropped.load(Ordering::Relaxed)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts.load(Ordering::Relaxed)
    }

    pub fn is_failed(&self) -> bool {
        self.state() == ConnectionState::Failed
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.session_id().unwrap_or_default(),
            created_at: self.created_at,
            state: self.state(),
            records_sent: self.records_sent(),
            records_dropped: self.records_dropped(),
            reconnect_attempts: self.reconnect_attempts(),
        }
    }

    fn publish(&self, tracker: &ReconnectTracker) {
        *self.state.write() = tracker.state();
        self.reconnect_attempts
            .store(tracker.attempts(), Ordering::Relaxed);
    }

    fn count_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }
}

/// Non-blocking producer side of the hand-off queue.
#[derive(Debug, Clone)]
pub struct RecordSender {
    queue: mpsc::Sender<TelemetryRecord>,
    status: Arc<StreamingStatus>,
}

impl RecordSender {
    /// Hand one record to the network side without waiting.
    ///
    /// Returns `false` and counts a drop when the queue is full or the
    /// supervisor is gone.
    pub fn submit(&self, record: TelemetryRecord) -> bool {
        match self.queue.try_send(record) {
            Ok(()) => true,
            Err(TrySendError::Full(_) | TrySendError::Closed(_)) => {
                self.status.count_dropped();
                false
            }
        }
    }
}

/// Owner of the streaming task.
#[derive(Debug)]
pub struct StreamingHandle {
    queue: mpsc::Sender<TelemetryRecord>,
    status: Arc<StreamingStatus>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    join_timeout: Duration,
}

impl StreamingHandle {
    /// Spawn the supervisor on the current runtime.
    pub fn spawn(config: &CaptureConfig) -> Result<Self, StreamingError> {
        let session = if config.session.handshake {
            Some(SessionClient::new(config)?)
        } else {
            None
        };

        let status = Arc::new(StreamingStatus::default());
        if session.is_none() {
            *status.session_id.write() = Some(local_session_id());
        }

        let (queue, records) = mpsc::channel(config.buffer_size.max(1));
        let cancel = CancellationToken::new();

        let mut client = StreamingClient::new(config);
        client.set_session_id(status.session_id());

        let supervisor = Supervisor {
            client,
            session,
            tracker: ReconnectTracker::new(config.reconnect.clone()),
            records,
            status: Arc::clone(&status),
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        Ok(Self {
            queue,
            status,
            cancel,
            task: Some(task),
            join_timeout: config.session.end_timeout() + SHUTDOWN_GRACE,
        })
    }

    pub fn sender(&self) -> RecordSender {
        RecordSender {
            queue: self.queue.clone(),
            status: Arc::clone(&self.status),
        }
    }

    pub fn submit(&self, record: TelemetryRecord) -> bool {
        self.sender().submit(record)
    }

    pub fn status(&self) -> &Arc<StreamingStatus> {
        &self.status
    }

    /// Stop the supervisor: ends the session (bounded) and closes the link.
    /// Idempotent.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        let Some(mut task) = self.task.take() else {
            return;
        };

        match tokio::time::timeout(self.join_timeout, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Streaming supervisor task failed"),
            Err(_elapsed) => {
                warn!("Streaming supervisor did not stop in time; aborting");
                task.abort();
            }
        }
    }
}

impl Drop for StreamingHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Supervisor {
    client: StreamingClient,
    session: Option<SessionClient>,
    tracker: ReconnectTracker,
    records: mpsc::Receiver<TelemetryRecord>,
    status: Arc<StreamingStatus>,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(mut self) {
        'supervise: loop {
            if !self.establish().await {
                break;
            }

            loop {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => break 'supervise,
                    _ = self.client.closed() => {
                        warn!("Collector connection dropped");
                        break;
                    }
                    next = self.records.recv() => {
                        let Some(record) = next else { break 'supervise };
                        if self.client.send(&record).await {
                            self.status.records_sent.fetch_add(1, Ordering::Relaxed);
                        } else {
                            self.status.count_dropped();
                            break;
                        }
                    }
                }
            }

            self.client.disconnect().await;
        }

        if self.tracker.state() == ConnectionState::Failed {
            self.drain_until_cancelled().await;
        }
        self.finish().await;
    }

    /// Connect, retrying with backoff. `false` on stop or when the budget is spent.
    async fn establish(&mut self) -> bool {
        let cancel = self.cancel.clone();
        loop {
            self.tracker.mark_connecting();
            self.status.publish(&self.tracker);

            let attempt = tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                result = self.try_establish() => result,
            };

            let failure = match attempt {
                Ok(()) => {
                    self.tracker.mark_connected();
                    self.status.publish(&self.tracker);
                    info!(session_id = ?self.client.session_id(), "Streaming to collector");
                    return true;
                }
                Err(e) => e,
            };

            let Some(delay) = self.tracker.next_attempt() else {
                self.status.publish(&self.tracker);
                error!(
                    error = %failure,
                    "{}",
                    StreamingError::StreamingFailed {
                        attempts: self.tracker.attempts()
                    }
                );
                return false;
            };
            self.status.publish(&self.tracker);
            warn!(
                attempt = self.tracker.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                error = %failure,
                "Reconnecting to collector"
            );

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return false,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn try_establish(&mut self) -> Result<(), StreamingError> {
        if let Some(session) = &self.session
            && self.client.session_id().is_none()
        {
            let session_id = session.begin().await?;
            *self.status.session_id.write() = Some(session_id.clone());
            self.client.set_session_id(Some(session_id));
        }
        self.client.try_connect().await
    }

    /// After a terminal failure, keep counting submitted records as dropped
    /// until the capture stops.
    async fn drain_until_cancelled(&mut self) {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                next = self.records.recv() => match next {
                    Some(_) => self.status.count_dropped(),
                    None => return,
                },
            }
        }
    }

    async fn finish(&mut self) {
        self.records.close();
        self.client.disconnect().await;

        if let Some(session) = &self.session
            && let Some(session_id) = self.client.session_id()
        {
            match session.end(session_id).await {
                Ok(()) => debug!(session_id, "Collector notified of session end"),
                Err(e) => warn!(session_id, error = %e, "Session end notification failed"),
            }
        }

        self.tracker.mark_closed();
        self.status.publish(&self.tracker);
        debug!("Streaming supervisor stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::test_server::{ServerEvent, next_text, spawn};
    use racing_telemetry_core::{RecordTimestamp, ReconnectPolicy, SourceTitle};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    const WAIT: Duration = Duration::from_secs(5);

    fn config_for(endpoint: String) -> CaptureConfig {
        CaptureConfig {
            endpoint_url: endpoint,
            credential: "k".to_string(),
            buffer_size: 16,
            connect_timeout_ms: 500,
            reconnect: ReconnectPolicy {
                max_attempts: 3,
                base_delay_ms: 10,
                max_delay_ms: 20,
            },
            ..CaptureConfig::default()
        }
    }

    fn unreachable_endpoint() -> Result<String, std::io::Error> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);
        Ok(format!("ws://{addr}/ws"))
    }

    fn record() -> TelemetryRecord {
        TelemetryRecord::new(SourceTitle::AssettoCorsa, RecordTimestamp::now())
    }

    async fn wait_for(status: &StreamingStatus, check: impl Fn(&StreamingStatus) -> bool) -> TestResult {
        tokio::time::timeout(WAIT, async {
            while !check(status) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_records_are_delivered_in_order() -> TestResult {
        let (addr, mut events) = spawn(Vec::new()).await?;
        let mut handle = StreamingHandle::spawn(&config_for(format!("ws://{addr}/ws")))?;
        wait_for(handle.status(), |s| s.state() == ConnectionState::Streaming).await?;

        let mut expected = Vec::new();
        for i in 0..5u64 {
            let record = TelemetryRecord::new(
                SourceTitle::AssettoCorsa,
                RecordTimestamp::at(i + 1, Utc::now()),
            );
            expected.push(record.timestamp.monotonic_ns);
            assert!(handle.submit(record));
        }

        let mut seen = Vec::new();
        while seen.len() < expected.len() {
            let text = tokio::time::timeout(WAIT, next_text(&mut events))
                .await?
                .ok_or("server closed")?;
            let value: serde_json::Value = serde_json::from_str(&text)?;
            let record: TelemetryRecord = serde_json::from_value(value["data"].clone())?;
            seen.push(record.timestamp.monotonic_ns);
        }
        assert_eq!(seen, expected);
        wait_for(handle.status(), |s| s.records_sent() == 5).await?;

        let session_id = handle.status().session_id().ok_or("missing session id")?;
        assert!(uuid::Uuid::parse_str(&session_id).is_ok());

        handle.shutdown().await;
        assert_eq!(handle.status().state(), ConnectionState::Closed);
        handle.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_fails_after_budget() -> TestResult {
        let mut handle = StreamingHandle::spawn(&config_for(unreachable_endpoint()?))?;
        wait_for(handle.status(), StreamingStatus::is_failed).await?;

        assert_eq!(handle.status().reconnect_attempts(), 3);
        assert!(!handle.status().state().is_connected());

        handle.submit(record());
        wait_for(handle.status(), |s| s.records_dropped() == 1).await?;
        assert_eq!(handle.status().records_sent(), 0);

        handle.shutdown().await;
        assert_eq!(handle.status().state(), ConnectionState::Failed);
        Ok(())
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() -> TestResult {
        let mut config = config_for(unreachable_endpoint()?);
        config.buffer_size = 2;
        config.reconnect.base_delay_ms = 60_000;
        config.reconnect.max_delay_ms = 60_000;
        let mut handle = StreamingHandle::spawn(&config)?;

        assert!(handle.submit(record()));
        assert!(handle.submit(record()));
        assert!(!handle.submit(record()));
        assert!(!handle.submit(record()));
        assert_eq!(handle.status().records_dropped(), 2);

        handle.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() -> TestResult {
        let mut config = config_for(unreachable_endpoint()?);
        config.reconnect.base_delay_ms = 60_000;
        config.reconnect.max_delay_ms = 60_000;
        let mut handle = StreamingHandle::spawn(&config)?;
        wait_for(handle.status(), |s| s.state() == ConnectionState::Degraded).await?;

        let started = std::time::Instant::now();
        handle.shutdown().await;
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(handle.status().state(), ConnectionState::Closed);
        Ok(())
    }

    #[tokio::test]
    async fn test_reconnects_after_server_drop() -> TestResult {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let (accepted_tx, mut accepted) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            let mut first = true;
            while let Ok((stream, _)) = listener.accept().await {
                let Ok(mut socket) = tokio_tungstenite::accept_async(stream).await else {
                    continue;
                };
                if accepted_tx.send(()).is_err() {
                    return;
                }
                if first {
                    first = false;
                    let _closed = socket.close(None).await;
                } else {
                    tokio::spawn(async move {
                        use futures_util::StreamExt;
                        while let Some(Ok(_)) = socket.next().await {}
                    });
                }
            }
        });

        let mut handle = StreamingHandle::spawn(&config_for(format!("ws://{addr}/ws")))?;
        for _ in 0..2 {
            tokio::time::timeout(WAIT, accepted.recv())
                .await?
                .ok_or("listener stopped")?;
        }
        wait_for(handle.status(), |s| s.state() == ConnectionState::Streaming).await?;
        assert_eq!(handle.status().reconnect_attempts(), 0);

        handle.shutdown().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_session_handshake_precedes_streaming() -> TestResult {
        let api = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "session_id": "abc" })),
            )
            .expect(1)
            .mount(&api)
            .await;
        Mock::given(method("POST"))
            .and(path("/sessions/abc/end"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&api)
            .await;

        let (addr, mut events) = spawn(Vec::new()).await?;
        let mut config = config_for(format!("ws://{addr}/ws"));
        config.api_url = api.uri();
        config.session.handshake = true;

        let mut handle = StreamingHandle::spawn(&config)?;
        match tokio::time::timeout(WAIT, events.recv()).await? {
            Some(ServerEvent::Connected { uri }) => assert!(uri.contains("session_id=abc")),
            other => return Err(format!("unexpected event {other:?}").into()),
        }
        wait_for(handle.status(), |s| s.state() == ConnectionState::Streaming).await?;
        assert_eq!(handle.status().session_id().as_deref(), Some("abc"));

        handle.shutdown().await;
        api.verify().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_session_begin_consumes_reconnect_budget() -> TestResult {
        let api = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/sessions"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&api)
            .await;

        let (addr, _events) = spawn(Vec::new()).await?;
        let mut config = config_for(format!("ws://{addr}/ws"));
        config.api_url = api.uri();
        config.session.handshake = true;

        let mut handle = StreamingHandle::spawn(&config)?;
        wait_for(handle.status(), StreamingStatus::is_failed).await?;
        assert_eq!(handle.status().session_id(), None);

        handle.shutdown().await;
        Ok(())
    }
}
