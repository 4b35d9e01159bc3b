//! Fuzzes the Le Mans Ultimate telemetry block decoder.
//!
//! Run with:
//!   cargo +nightly fuzz run fuzz_lmu_telemetry
#![no_main]
use libfuzzer_sys::fuzz_target;
use racing_telemetry_adapters::{TitleSample, lmu, normalize};
use racing_telemetry_core::RecordTimestamp;

fuzz_target!(|data: &[u8]| {
    if let Ok(telemetry) = lmu::decode(data) {
        let _record = normalize(&TitleSample::Lmu(Box::new(telemetry)), RecordTimestamp::now());
    }
});
