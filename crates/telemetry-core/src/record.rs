//! Canonical telemetry record.
//!
//! Every title maps into [`TelemetryRecord`]. The shape never changes per title:
//! a field the title does not publish is `None` (serialized as `null`), and
//! title-only data goes into [`TelemetryRecord::extensions`].
//!
//! Axis convention for vectors: `x` lateral, `y` vertical (up), `z` longitudinal.
//! Units are SI unless the field name carries a unit suffix.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::source::{SessionType, SourceTitle};
use crate::telemetry_now_ns;

/// Three-component vector.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    /// Build a vector, replacing non-finite components with zero.
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        let clean = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            x: clean(x),
            y: clean(y),
            z: clean(z),
        }
    }

    pub fn from_f64(x: f64, y: f64, z: f64) -> Self {
        Self::new(x as f32, y as f32, z as f32)
    }

    pub fn scale(self, factor: f32) -> Self {
        Self::new(self.x * factor, self.y * factor, self.z * factor)
    }

    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

/// Car orientation in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Orientation {
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
}

/// Position and movement of the player car.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionState {
    /// World position in meters.
    pub position: Option<Vec3>,
    /// World-frame velocity in m/s.
    pub velocity: Option<Vec3>,
    /// Car-frame velocity in m/s.
    pub local_velocity: Option<Vec3>,
    /// Car-frame acceleration in g.
    pub acceleration_g: Option<Vec3>,
    pub orientation: Option<Orientation>,
}

/// Engine, gearbox and driver inputs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Powertrain {
    /// -1 reverse, 0 neutral, 1.. forward gears.
    pub gear: i32,
    pub rpm: Option<u32>,
    pub max_rpm: Option<u32>,
    pub speed_kmh: f32,
    /// 0.0 released, 1.0 fully pressed.
    pub throttle: Option<f32>,
    /// 0.0 released, 1.0 fully pressed.
    pub brake: Option<f32>,
    /// 0.0 released, 1.0 fully pressed.
    pub clutch: Option<f32>,
    /// -1.0 full left, 1.0 full right.
    pub steering: Option<f32>,
    pub fuel_liters: Option<f32>,
}

/// Per-wheel state. Wheel order is FL, FR, RL, RR.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct WheelState {
    pub pressure_kpa: Option<f32>,
    pub temp_core_c: Option<f32>,
    pub temp_inner_c: Option<f32>,
    pub temp_middle_c: Option<f32>,
    pub temp_outer_c: Option<f32>,
    pub load_n: Option<f32>,
    /// Title-reported slip, unitless.
    pub slip: Option<f32>,
    /// Fraction of available grip in use, 0.0-1.0.
    pub grip_fraction: Option<f32>,
    /// Remaining tread, 1.0 new, 0.0 worn out.
    pub wear_remaining: Option<f32>,
    pub brake_temp_c: Option<f32>,
}

/// Lap and session bookkeeping.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LapInfo {
    pub lap_number: u32,
    pub current_lap_ms: Option<u32>,
    pub last_lap_ms: Option<u32>,
    pub best_lap_ms: Option<u32>,
    /// Zero-based index of the sector the car is in.
    pub sector_index: Option<u32>,
    /// Sector times of the last completed lap.
    pub sector_times_ms: [Option<u32>; 3],
    pub in_pit: bool,
    pub race_position: Option<u32>,
    pub session_type: SessionType,
}

/// Weather and track conditions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Environment {
    pub air_temp_c: Option<f32>,
    pub track_temp_c: Option<f32>,
    pub wind_speed_ms: Option<f32>,
    pub wind_direction_deg: Option<f32>,
}

/// Extension value for title-specific data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum TelemetryValue {
    Float(f32),
    Integer(i64),
    Boolean(bool),
    String(String),
}

impl From<f32> for TelemetryValue {
    fn from(value: f32) -> Self {
        TelemetryValue::Float(if value.is_finite() { value } else { 0.0 })
    }
}

impl From<f64> for TelemetryValue {
    fn from(value: f64) -> Self {
        TelemetryValue::from(value as f32)
    }
}

impl From<i32> for TelemetryValue {
    fn from(value: i32) -> Self {
        TelemetryValue::Integer(i64::from(value))
    }
}

impl From<u32> for TelemetryValue {
    fn from(value: u32) -> Self {
        TelemetryValue::Integer(i64::from(value))
    }
}

impl From<u16> for TelemetryValue {
    fn from(value: u16) -> Self {
        TelemetryValue::Integer(i64::from(value))
    }
}

impl From<u8> for TelemetryValue {
    fn from(value: u8) -> Self {
        TelemetryValue::Integer(i64::from(value))
    }
}

impl From<bool> for TelemetryValue {
    fn from(value: bool) -> Self {
        TelemetryValue::Boolean(value)
    }
}

impl From<String> for TelemetryValue {
    fn from(value: String) -> Self {
        TelemetryValue::String(value)
    }
}

impl From<&str> for TelemetryValue {
    fn from(value: &str) -> Self {
        TelemetryValue::String(value.to_string())
    }
}

/// Capture time of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTimestamp {
    /// Nanoseconds on the process-local monotonic clock.
    pub monotonic_ns: u64,
    pub wall_clock: DateTime<Utc>,
}

impl RecordTimestamp {
    pub fn now() -> Self {
        Self {
            monotonic_ns: telemetry_now_ns(),
            wall_clock: Utc::now(),
        }
    }

    pub fn at(monotonic_ns: u64, wall_clock: DateTime<Utc>) -> Self {
        Self {
            monotonic_ns,
            wall_clock,
        }
    }
}

/// The single normalized record all titles map into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub source: SourceTitle,
    pub timestamp: RecordTimestamp,
    pub motion: MotionState,
    pub powertrain: Powertrain,
    pub wheels: [WheelState; 4],
    pub lap: LapInfo,
    pub environment: Environment,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, TelemetryValue>,
}

impl TelemetryRecord {
    /// Empty record for `source`; every optional field starts absent.
    pub fn new(source: SourceTitle, timestamp: RecordTimestamp) -> Self {
        Self {
            source,
            timestamp,
            motion: MotionState::default(),
            powertrain: Powertrain::default(),
            wheels: [WheelState::default(); 4],
            lap: LapInfo::default(),
            environment: Environment::default(),
            extensions: BTreeMap::new(),
        }
    }

    /// Insert a title-specific value.
    pub fn extend(&mut self, key: &str, value: impl Into<TelemetryValue>) {
        self.extensions.insert(key.to_string(), value.into());
    }

    pub fn extension(&self, key: &str) -> Option<&TelemetryValue> {
        self.extensions.get(key)
    }
}
