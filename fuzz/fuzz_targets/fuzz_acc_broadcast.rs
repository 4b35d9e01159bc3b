//! Fuzzes the ACC broadcast message parser and session state.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_acc_broadcast
#![no_main]
use libfuzzer_sys::fuzz_target;
use racing_telemetry_adapters::acc::{AccSessionState, parse_inbound_message};
use racing_telemetry_adapters::{TitleSample, normalize};
use racing_telemetry_core::RecordTimestamp;

fuzz_target!(|data: &[u8]| {
    let mut state = AccSessionState::default();
    // Treat the input as a run of packets separated by 0xFF.
    for packet in data.split(|b| *b == 0xFF) {
        if let Ok(message) = parse_inbound_message(packet) {
            state.apply(message);
        }
    }
    if let Some(snapshot) = state.latest() {
        let _record = normalize(
            &TitleSample::Acc(Box::new(snapshot.clone())),
            RecordTimestamp::now(),
        );
    }
});
