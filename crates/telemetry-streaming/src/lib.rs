//! Outbound streaming to the remote collector.
//!
//! - [`protocol`] - tagged JSON envelopes
//! - [`client`] - one websocket link with automatic ping answers
//! - [`session`] - optional begin/end REST exchange
//! - [`supervisor`] - bounded hand-off queue and reconnect supervision

#![deny(static_mut_refs)]

pub mod client;
pub mod protocol;
pub mod session;
pub mod supervisor;

pub use client::StreamingClient;
pub use protocol::{InboundMessage, OutboundMessage};
pub use session::{SessionClient, local_session_id};
pub use supervisor::{RecordSender, StreamingHandle, StreamingStatus};
