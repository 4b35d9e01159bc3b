//! Per-title decoders and source adapters.
//!
//! Each supported title has a decoder that turns raw bytes into a typed
//! struct and an adapter implementing [`SourceAdapter`] over it. The
//! [`normalize`] module maps those structs into the canonical record.

#![deny(static_mut_refs)]

use std::sync::Arc;

use async_trait::async_trait;
use racing_telemetry_core::{SourceConfig, SourceError, SourceTitle};

pub mod ac;
pub mod acc;
pub mod lmu;
pub mod normalize;
pub mod reader;
pub mod shared_memory;

pub use ac::{AcAdapter, AcFrame};
pub use acc::{AccAdapter, AccSnapshot};
pub use lmu::{LmuAdapter, LmuTelemetry};
pub use normalize::{Normalizer, normalize};
pub use shared_memory::{InMemoryRegions, OsRegionProvider, RegionProvider};

/// A decoded sample from one title.
#[derive(Debug, Clone, PartialEq)]
pub enum TitleSample {
    Ac(Box<AcFrame>),
    Acc(Box<AccSnapshot>),
    Lmu(Box<LmuTelemetry>),
}

impl TitleSample {
    pub fn title(&self) -> SourceTitle {
        match self {
            TitleSample::Ac(_) => SourceTitle::AssettoCorsa,
            TitleSample::Acc(_) => SourceTitle::AssettoCorsaCompetizione,
            TitleSample::Lmu(_) => SourceTitle::LeMansUltimate,
        }
    }
}

/// Uniform lifecycle over one title's transport.
#[async_trait]
pub trait SourceAdapter: Send {
    fn title(&self) -> SourceTitle;

    /// Best-effort, bounded attempt to attach to the title. Returns `false`
    /// when the title is not running; never fails otherwise.
    async fn probe_and_connect(&mut self) -> bool;

    /// `Ok(None)` means no new data since the previous read.
    /// `Err` with [`SourceError::is_source_lost`] means the title went away.
    async fn read_once(&mut self) -> Result<Option<TitleSample>, SourceError>;

    /// Release the transport. Safe to call when not connected.
    async fn disconnect(&mut self);
}

/// Builds one adapter from the source configuration.
pub type AdapterFactory = fn(&SourceConfig, Arc<dyn RegionProvider>) -> Box<dyn SourceAdapter>;

fn new_ac_adapter(config: &SourceConfig, regions: Arc<dyn RegionProvider>) -> Box<dyn SourceAdapter> {
    Box::new(AcAdapter::new(regions, config.stale_timeout()))
}

fn new_acc_adapter(config: &SourceConfig, _regions: Arc<dyn RegionProvider>) -> Box<dyn SourceAdapter> {
    Box::new(AccAdapter::new(config.acc.clone(), config.stale_timeout()))
}

fn new_lmu_adapter(config: &SourceConfig, regions: Arc<dyn RegionProvider>) -> Box<dyn SourceAdapter> {
    Box::new(LmuAdapter::new(regions, config.stale_timeout()))
}

/// Adapter factories in probe priority order.
pub fn adapter_factories() -> &'static [(SourceTitle, AdapterFactory)] {
    &[
        (SourceTitle::AssettoCorsa, new_ac_adapter),
        (SourceTitle::AssettoCorsaCompetizione, new_acc_adapter),
        (SourceTitle::LeMansUltimate, new_lmu_adapter),
    ]
}

/// One adapter per supported title, in probe priority order.
pub fn default_adapters(
    config: &SourceConfig,
    regions: Arc<dyn RegionProvider>,
) -> Vec<Box<dyn SourceAdapter>> {
    adapter_factories()
        .iter()
        .map(|(_, factory)| factory(config, Arc::clone(&regions)))
        .collect()
}
