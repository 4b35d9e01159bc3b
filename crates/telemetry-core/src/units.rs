//! Unit conversions and value sanitizers used by the normalizer.

/// Standard gravity in m/s².
pub const STANDARD_GRAVITY: f32 = 9.80665;
pub const KMH_PER_MS: f32 = 3.6;
pub const KPA_PER_PSI: f32 = 6.894_757;
pub const KELVIN_OFFSET: f32 = 273.15;

/// `Some(value)` when finite.
pub fn finite(value: f32) -> Option<f32> {
    value.is_finite().then_some(value)
}

pub fn finite_f64(value: f64) -> Option<f32> {
    finite(value as f32)
}

/// Clamp into 0.0..=1.0; non-finite is absent.
pub fn unit_interval(value: f32) -> Option<f32> {
    finite(value).map(|v| v.clamp(0.0, 1.0))
}

/// Clamp into -1.0..=1.0; non-finite is absent.
pub fn signed_unit_interval(value: f32) -> Option<f32> {
    finite(value).map(|v| v.clamp(-1.0, 1.0))
}

pub fn ms_to_kmh(speed_ms: f32) -> f32 {
    finite(speed_ms * KMH_PER_MS).map_or(0.0, f32::abs)
}

pub fn accel_to_g(accel_ms2: f32) -> f32 {
    finite(accel_ms2 / STANDARD_GRAVITY).unwrap_or(0.0)
}

pub fn psi_to_kpa(psi: f32) -> Option<f32> {
    finite(psi * KPA_PER_PSI)
}

pub fn kelvin_to_celsius(kelvin: f32) -> Option<f32> {
    finite(kelvin - KELVIN_OFFSET)
}

/// Integer millisecond lap time; zero, negative and `i32::MAX` mean "no time".
pub fn lap_ms_from_i32(raw: i32) -> Option<u32> {
    if raw <= 0 || raw == i32::MAX {
        None
    } else {
        u32::try_from(raw).ok()
    }
}

/// Seconds as `f64` to milliseconds; non-positive means "no time".
pub fn lap_ms_from_seconds(seconds: f64) -> Option<u32> {
    if !seconds.is_finite() || seconds <= 0.0 {
        return None;
    }
    let millis = (seconds * 1000.0).round();
    if millis > f64::from(u32::MAX) {
        None
    } else {
        Some(millis as u32)
    }
}

/// Non-negative RPM as an integer.
pub fn rpm_from_f64(rpm: f64) -> Option<u32> {
    if !rpm.is_finite() {
        return None;
    }
    Some(rpm.clamp(0.0, f64::from(u32::MAX)).round() as u32)
}
