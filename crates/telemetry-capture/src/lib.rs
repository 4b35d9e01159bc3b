//! Capture orchestration: which source is live, how often it is sampled, and
//! the start/stop/status surface collaborators drive.

#![deny(static_mut_refs)]

pub mod controller;
pub mod scheduler;
pub mod selector;

pub use controller::{AdapterBuilder, CaptureController, CaptureStatus, probe_sources};
pub use scheduler::{TickScheduler, sleep_duration};
pub use selector::{SelectorState, SourceSelector};
