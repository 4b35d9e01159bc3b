//! Start/stop/status control surface.
//!
//! `start` validates the configuration, spawns the streaming supervisor and
//! the sampling loop, and returns immediately. The sampling loop owns the
//! [`SourceSelector`]; the supervisor owns the network link. The controller
//! only reads their published state.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;
use racing_telemetry_adapters::{
    Normalizer, OsRegionProvider, RegionProvider, SourceAdapter, default_adapters,
};
use racing_telemetry_core::{
    CaptureConfig, ConnectionState, RecordTimestamp, SourceConfig, SourceTitle, StartError,
};
use racing_telemetry_streaming::{RecordSender, StreamingHandle, StreamingStatus};
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::scheduler::TickScheduler;
use crate::selector::SourceSelector;

/// Upper bound on waiting for the sampling loop to release its source.
const SAMPLER_STOP_TIMEOUT: Duration = Duration::from_secs(1);

/// Builds the adapters for one capture run, in probe priority order.
pub type AdapterBuilder =
    Arc<dyn Fn(&SourceConfig, Arc<dyn RegionProvider>) -> Vec<Box<dyn SourceAdapter>> + Send + Sync>;

/// Read-only view of a capture, safe to poll from any thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CaptureStatus {
    pub running: bool,
    pub active_source: Option<SourceTitle>,
    pub connected: bool,
    pub connection_state: ConnectionState,
    pub records_sent: u64,
    pub records_dropped: u64,
    pub reconnect_attempts: u32,
    /// Reconnect budget spent; the network side gave up.
    pub streaming_failed: bool,
    pub session_id: Option<String>,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        Self {
            running: false,
            active_source: None,
            connected: false,
            connection_state: ConnectionState::Idle,
            records_sent: 0,
            records_dropped: 0,
            reconnect_attempts: 0,
            streaming_failed: false,
            session_id: None,
        }
    }
}

/// State the sampling loop publishes. Written by the loop only.
#[derive(Debug, Default)]
struct SamplerState {
    active_source: RwLock<Option<SourceTitle>>,
    records_sampled: AtomicU64,
}

struct CaptureRun {
    streaming: StreamingHandle,
    cancel: CancellationToken,
    sampler: JoinHandle<()>,
}

pub struct CaptureController {
    regions: Arc<dyn RegionProvider>,
    adapters: AdapterBuilder,
    run: Option<CaptureRun>,
    sampler_state: Arc<SamplerState>,
    streaming_status: Option<Arc<StreamingStatus>>,
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("regions", &self.regions)
            .field("status", &self.status())
            .finish()
    }
}

impl Default for CaptureController {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureController {
    /// Controller over the operating system's shared-memory regions.
    pub fn new() -> Self {
        Self::with_region_provider(Arc::new(OsRegionProvider))
    }

    pub fn with_region_provider(regions: Arc<dyn RegionProvider>) -> Self {
        Self {
            regions,
            adapters: Arc::new(default_adapters),
            run: None,
            sampler_state: Arc::new(SamplerState::default()),
            streaming_status: None,
        }
    }

    /// Replace the adapter set built on each `start`.
    pub fn with_adapters(mut self, adapters: AdapterBuilder) -> Self {
        self.adapters = adapters;
        self
    }

    /// Validate `config` and begin capturing. Must be called from within a
    /// Tokio runtime; the work runs on spawned tasks.
    pub fn start(&mut self, config: CaptureConfig) -> Result<(), StartError> {
        config.validate()?;
        if self.is_running() {
            return Err(StartError::AlreadyRunning);
        }
        if let Some(previous) = self.run.take() {
            debug!("Discarding finished capture run");
            previous.cancel.cancel();
        }

        let streaming = StreamingHandle::spawn(&config)?;
        let sampler_state = Arc::new(SamplerState::default());
        let cancel = CancellationToken::new();

        let selector = SourceSelector::new((self.adapters)(
            &config.sources,
            Arc::clone(&self.regions),
        ));
        info!(
            sources = ?selector.titles(),
            rate_hz = config.sample_rate_hz,
            buffer = config.buffer_size,
            endpoint = %config.endpoint_url,
            "Capture starting"
        );

        let sampler = tokio::spawn(sample_loop(
            selector,
            streaming.sender(),
            TickScheduler::new(config.sample_rate_hz),
            Arc::clone(&sampler_state),
            cancel.clone(),
        ));

        self.streaming_status = Some(Arc::clone(streaming.status()));
        self.sampler_state = sampler_state;
        self.run = Some(CaptureRun {
            streaming,
            cancel,
            sampler,
        });
        Ok(())
    }

    /// Stop capturing: halts sampling, releases the source, ends the session
    /// (bounded) and closes the link. Safe to call when not running.
    pub async fn stop(&mut self) {
        let Some(mut run) = self.run.take() else {
            return;
        };

        run.cancel.cancel();
        match tokio::time::timeout(SAMPLER_STOP_TIMEOUT, &mut run.sampler).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Sampling loop ended abnormally"),
            Err(_elapsed) => {
                warn!("Sampling loop did not stop in time; aborting");
                run.sampler.abort();
            }
        }
        *self.sampler_state.active_source.write() = None;

        run.streaming.shutdown().await;
        info!(
            records_sampled = self.sampler_state.records_sampled.load(Ordering::Relaxed),
            "Capture stopped"
        );
    }

    /// `true` while the sampling loop is alive.
    pub fn is_running(&self) -> bool {
        self.run
            .as_ref()
            .is_some_and(|run| !run.sampler.is_finished())
    }

    pub fn status(&self) -> CaptureStatus {
        let running = self.is_running();
        let mut status = CaptureStatus {
            running,
            active_source: if running {
                *self.sampler_state.active_source.read()
            } else {
                None
            },
            ..CaptureStatus::default()
        };

        if let Some(streaming) = &self.streaming_status {
            let state = streaming.state();
            status.connected = state.is_connected();
            status.connection_state = state;
            status.records_sent = streaming.records_sent();
            status.records_dropped = streaming.records_dropped();
            status.reconnect_attempts = streaming.reconnect_attempts();
            status.streaming_failed = streaming.is_failed();
            status.session_id = streaming.session_id();
        }
        status
    }

    /// Records produced by the sampling loop in the current or last run.
    pub fn records_sampled(&self) -> u64 {
        self.sampler_state.records_sampled.load(Ordering::Relaxed)
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        if let Some(run) = &self.run {
            run.cancel.cancel();
        }
    }
}

async fn sample_loop(
    mut selector: SourceSelector,
    sender: RecordSender,
    mut scheduler: TickScheduler,
    state: Arc<SamplerState>,
    cancel: CancellationToken,
) {
    let mut normalizer = Normalizer::new();
    let mut published: Option<SourceTitle> = None;

    loop {
        scheduler.begin_tick();

        let sample = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sample = selector.tick() => sample,
        };

        let active = selector.active_source();
        if active != published {
            normalizer.reset();
            *state.active_source.write() = active;
            published = active;
        }

        if let Some(sample) = sample {
            match normalizer.normalize(&sample, RecordTimestamp::now()) {
                Ok(record) => {
                    state.records_sampled.fetch_add(1, Ordering::Relaxed);
                    if !sender.submit(record) {
                        trace!("Hand-off queue full; record dropped");
                    }
                }
                Err(e) => debug!(error = %e, "Normalizer rejected sample"),
            }
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = scheduler.wait_next_tick() => {}
        }
    }

    selector.stop().await;
    *state.active_source.write() = None;
    debug!(
        ticks = scheduler.ticks(),
        overruns = scheduler.overruns(),
        "Sampling loop stopped"
    );
}

/// One probe cycle over every title, for diagnostics. Whatever answered is
/// released again before returning.
pub async fn probe_sources(
    sources: &SourceConfig,
    regions: Arc<dyn RegionProvider>,
) -> Option<SourceTitle> {
    let mut selector = SourceSelector::new(default_adapters(sources, regions));
    let found = selector.probe_cycle().await;
    selector.stop().await;
    found
}
