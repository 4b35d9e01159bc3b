//! Active-source detection and failover.
//!
//! `NoActiveSource` probes every adapter in priority order once per tick and
//! activates the first that answers. `Active` reads from that adapter only; a
//! lost or unavailable source is disconnected and the selector falls back to
//! probing. `Stopped` is terminal.

use racing_telemetry_adapters::{SourceAdapter, TitleSample};
use racing_telemetry_core::{SourceError, SourceTitle};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "source", rename_all = "snake_case")]
pub enum SelectorState {
    NoActiveSource,
    Active(SourceTitle),
    Stopped,
}

impl SelectorState {
    pub fn active_source(&self) -> Option<SourceTitle> {
        match self {
            SelectorState::Active(title) => Some(*title),
            SelectorState::NoActiveSource | SelectorState::Stopped => None,
        }
    }
}

pub struct SourceSelector {
    adapters: Vec<Box<dyn SourceAdapter>>,
    active: Option<usize>,
    stopped: bool,
}

impl std::fmt::Debug for SourceSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceSelector")
            .field("adapters", &self.titles())
            .field("state", &self.state())
            .finish()
    }
}

impl SourceSelector {
    /// `adapters` must already be in probe priority order.
    pub fn new(adapters: Vec<Box<dyn SourceAdapter>>) -> Self {
        Self {
            adapters,
            active: None,
            stopped: false,
        }
    }

    pub fn titles(&self) -> Vec<SourceTitle> {
        self.adapters.iter().map(|adapter| adapter.title()).collect()
    }

    pub fn state(&self) -> SelectorState {
        if self.stopped {
            return SelectorState::Stopped;
        }
        match self.active_adapter() {
            Some(adapter) => SelectorState::Active(adapter.title()),
            None => SelectorState::NoActiveSource,
        }
    }

    pub fn active_source(&self) -> Option<SourceTitle> {
        self.state().active_source()
    }

    fn active_adapter(&self) -> Option<&dyn SourceAdapter> {
        self.active
            .and_then(|index| self.adapters.get(index))
            .map(|adapter| adapter.as_ref())
    }

    /// One pass over the adapters in priority order. Activates and returns the
    /// first title that answers.
    pub async fn probe_cycle(&mut self) -> Option<SourceTitle> {
        if self.stopped {
            return None;
        }
        if let Some(title) = self.active_source() {
            return Some(title);
        }

        for (index, adapter) in self.adapters.iter_mut().enumerate() {
            if adapter.probe_and_connect().await {
                let title = adapter.title();
                info!(source = %title, "Source activated");
                self.active = Some(index);
                return Some(title);
            }
            trace!(source = %adapter.title(), "Probe found nothing");
        }
        None
    }

    /// Run one tick: probe when idle, then read from the active source.
    ///
    /// `None` covers "no source", "no new data" and skipped ticks alike.
    pub async fn tick(&mut self) -> Option<TitleSample> {
        if self.stopped {
            return None;
        }
        if self.active.is_none() {
            self.probe_cycle().await?;
        }

        let index = self.active?;
        let adapter = self.adapters.get_mut(index)?;

        match adapter.read_once().await {
            Ok(sample) => sample,
            Err(SourceError::Decode { title, source }) => {
                debug!(source = %title, error = %source, "Decode failed; skipping tick");
                None
            }
            Err(error) => {
                warn!(source = %adapter.title(), %error, "Source lost; returning to probing");
                adapter.disconnect().await;
                self.active = None;
                None
            }
        }
    }

    /// Disconnect whatever is active and refuse further work.
    pub async fn stop(&mut self) {
        if let Some(index) = self.active.take()
            && let Some(adapter) = self.adapters.get_mut(index)
        {
            adapter.disconnect().await;
            debug!(source = %adapter.title(), "Source released on stop");
        }
        self.stopped = true;
    }
}
