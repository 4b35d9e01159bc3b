//! Command implementations

pub mod config;
pub mod decode;
pub mod probe;
pub mod run;

pub use decode::DecodeTitle;
