//! Fuzzes the Assetto Corsa physics/graphics page decoder and normalizer.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_ac_frame
#![no_main]
use libfuzzer_sys::fuzz_target;
use racing_telemetry_adapters::{TitleSample, ac, normalize};
use racing_telemetry_core::RecordTimestamp;

fuzz_target!(|data: &[u8]| {
    // Arbitrary split point between the two pages.
    let split = data.first().map_or(0, |b| usize::from(*b) * data.len() / 256);
    let (physics, graphics) = data.split_at(split.min(data.len()));
    if let Ok(frame) = ac::decode_frame(physics, graphics) {
        let _record = normalize(&TitleSample::Ac(Box::new(frame)), RecordTimestamp::now());
    }
});
