//! Assetto Corsa shared memory (`acpmf_physics` / `acpmf_graphics`).
//!
//! Both pages are `#pragma pack(4)` structs of 4-byte little-endian fields.
//! `wchar_t` strings are UTF-16LE. Physics `packetId` is the update key.

use async_trait::async_trait;
use racing_telemetry_core::{DecodeError, SourceError, SourceTitle, StalenessTracker};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, trace};

use crate::reader::LayoutReader;
use crate::shared_memory::{RegionProvider, SharedRegion, StableRead, read_stable};
use crate::{SourceAdapter, TitleSample};

pub const PHYSICS_REGION: &str = "acpmf_physics";
pub const GRAPHICS_REGION: &str = "acpmf_graphics";
pub const PHYSICS_SIZE: usize = 580;
pub const GRAPHICS_SIZE: usize = 296;

const PHYSICS_LAYOUT: &str = "AC physics";
const GRAPHICS_LAYOUT: &str = "AC graphics";

// SPageFilePhysics
const OFF_PACKET_ID: usize = 0;
const OFF_GAS: usize = 4;
const OFF_BRAKE: usize = 8;
const OFF_FUEL: usize = 12;
const OFF_GEAR: usize = 16;
const OFF_RPMS: usize = 20;
const OFF_STEER_ANGLE: usize = 24;
const OFF_SPEED_KMH: usize = 28;
const OFF_VELOCITY: usize = 32;
const OFF_ACC_G: usize = 44;
const OFF_WHEEL_SLIP: usize = 56;
const OFF_WHEEL_LOAD: usize = 72;
const OFF_WHEELS_PRESSURE: usize = 88;
const OFF_WHEEL_ANGULAR_SPEED: usize = 104;
const OFF_TYRE_WEAR: usize = 120;
const OFF_TYRE_DIRTY_LEVEL: usize = 136;
const OFF_TYRE_CORE_TEMP: usize = 152;
const OFF_CAMBER_RAD: usize = 168;
const OFF_SUSPENSION_TRAVEL: usize = 184;
const OFF_DRS: usize = 200;
const OFF_TC: usize = 204;
const OFF_HEADING: usize = 208;
const OFF_PITCH: usize = 212;
const OFF_ROLL: usize = 216;
const OFF_CG_HEIGHT: usize = 220;
const OFF_CAR_DAMAGE: usize = 224;
const OFF_TYRES_OUT: usize = 244;
const OFF_PIT_LIMITER_ON: usize = 248;
const OFF_ABS: usize = 252;
const OFF_KERS_CHARGE: usize = 256;
const OFF_KERS_INPUT: usize = 260;
const OFF_AUTO_SHIFTER_ON: usize = 264;
const OFF_RIDE_HEIGHT: usize = 268;
const OFF_TURBO_BOOST: usize = 276;
const OFF_BALLAST: usize = 280;
const OFF_AIR_DENSITY: usize = 284;
const OFF_AIR_TEMP: usize = 288;
const OFF_ROAD_TEMP: usize = 292;
const OFF_LOCAL_ANGULAR_VEL: usize = 296;
const OFF_FINAL_FF: usize = 308;
const OFF_PERFORMANCE_METER: usize = 312;
const OFF_ENGINE_BRAKE: usize = 316;
const OFF_ERS_RECOVERY_LEVEL: usize = 320;
const OFF_ERS_POWER_LEVEL: usize = 324;
const OFF_ERS_HEAT_CHARGING: usize = 328;
const OFF_ERS_IS_CHARGING: usize = 332;
const OFF_KERS_CURRENT_KJ: usize = 336;
const OFF_DRS_AVAILABLE: usize = 340;
const OFF_DRS_ENABLED: usize = 344;
const OFF_BRAKE_TEMP: usize = 348;
const OFF_CLUTCH: usize = 364;
const OFF_TYRE_TEMP_I: usize = 368;
const OFF_TYRE_TEMP_M: usize = 384;
const OFF_TYRE_TEMP_O: usize = 400;
const OFF_IS_AI_CONTROLLED: usize = 416;
const OFF_TYRE_CONTACT_POINT: usize = 420;
const OFF_TYRE_CONTACT_NORMAL: usize = 468;
const OFF_TYRE_CONTACT_HEADING: usize = 516;
const OFF_BRAKE_BIAS: usize = 564;
const OFF_LOCAL_VELOCITY: usize = 568;

// SPageFileGraphic
const OFF_G_PACKET_ID: usize = 0;
const OFF_G_STATUS: usize = 4;
const OFF_G_SESSION: usize = 8;
const OFF_G_CURRENT_TIME: usize = 12;
const OFF_G_LAST_TIME: usize = 42;
const OFF_G_BEST_TIME: usize = 72;
const OFF_G_SPLIT: usize = 102;
const OFF_G_COMPLETED_LAPS: usize = 132;
const OFF_G_POSITION: usize = 136;
const OFF_G_I_CURRENT_TIME: usize = 140;
const OFF_G_I_LAST_TIME: usize = 144;
const OFF_G_I_BEST_TIME: usize = 148;
const OFF_G_SESSION_TIME_LEFT: usize = 152;
const OFF_G_DISTANCE_TRAVELED: usize = 156;
const OFF_G_IS_IN_PIT: usize = 160;
const OFF_G_CURRENT_SECTOR: usize = 164;
const OFF_G_LAST_SECTOR_TIME: usize = 168;
const OFF_G_NUMBER_OF_LAPS: usize = 172;
const OFF_G_TYRE_COMPOUND: usize = 176;
// tyreCompound ends at 242; two bytes of padding align the next float.
const OFF_G_REPLAY_TIME_MULTIPLIER: usize = 244;
const OFF_G_NORMALIZED_POSITION: usize = 248;
const OFF_G_CAR_COORDINATES: usize = 252;
const OFF_G_PENALTY_TIME: usize = 264;
const OFF_G_FLAG: usize = 268;
const OFF_G_IDEAL_LINE_ON: usize = 272;
const OFF_G_IS_IN_PIT_LANE: usize = 276;
const OFF_G_SURFACE_GRIP: usize = 280;
const OFF_G_MANDATORY_PIT_DONE: usize = 284;
const OFF_G_WIND_SPEED: usize = 288;
const OFF_G_WIND_DIRECTION: usize = 292;

const TIME_STRING_CHARS: usize = 15;
const TYRE_COMPOUND_CHARS: usize = 33;

/// `SPageFilePhysics`. Wheel arrays are FL, FR, RL, RR.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcPhysics {
    pub packet_id: i32,
    pub gas: f32,
    pub brake: f32,
    pub fuel: f32,
    /// 0 reverse, 1 neutral, 2 first gear.
    pub gear: i32,
    pub rpms: i32,
    /// Normalized -1.0..=1.0.
    pub steer_angle: f32,
    pub speed_kmh: f32,
    pub velocity: [f32; 3],
    pub acc_g: [f32; 3],
    pub wheel_slip: [f32; 4],
    pub wheel_load: [f32; 4],
    /// psi
    pub wheels_pressure: [f32; 4],
    pub wheel_angular_speed: [f32; 4],
    /// Percent of tread remaining.
    pub tyre_wear: [f32; 4],
    pub tyre_dirty_level: [f32; 4],
    pub tyre_core_temperature: [f32; 4],
    pub camber_rad: [f32; 4],
    pub suspension_travel: [f32; 4],
    pub drs: f32,
    pub tc: f32,
    pub heading: f32,
    pub pitch: f32,
    pub roll: f32,
    pub cg_height: f32,
    /// Front, rear, left, right, center.
    pub car_damage: [f32; 5],
    pub number_of_tyres_out: i32,
    pub pit_limiter_on: bool,
    pub abs: f32,
    pub kers_charge: f32,
    pub kers_input: f32,
    pub auto_shifter_on: bool,
    pub ride_height: [f32; 2],
    pub turbo_boost: f32,
    pub ballast: f32,
    pub air_density: f32,
    pub air_temp: f32,
    pub road_temp: f32,
    pub local_angular_vel: [f32; 3],
    pub final_ff: f32,
    pub performance_meter: f32,
    pub engine_brake: i32,
    pub ers_recovery_level: i32,
    pub ers_power_level: i32,
    pub ers_heat_charging: bool,
    pub ers_is_charging: bool,
    pub kers_current_kj: f32,
    pub drs_available: bool,
    pub drs_enabled: bool,
    pub brake_temp: [f32; 4],
    pub clutch: f32,
    pub tyre_temp_i: [f32; 4],
    pub tyre_temp_m: [f32; 4],
    pub tyre_temp_o: [f32; 4],
    pub is_ai_controlled: bool,
    pub tyre_contact_point: [[f32; 3]; 4],
    pub tyre_contact_normal: [[f32; 3]; 4],
    pub tyre_contact_heading: [[f32; 3]; 4],
    pub brake_bias: f32,
    pub local_velocity: [f32; 3],
}

/// `AC_STATUS`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcStatus {
    #[default]
    Off,
    Replay,
    Live,
    Pause,
    Unknown(i32),
}

impl AcStatus {
    pub fn from_raw(raw: i32) -> Self {
        match raw {
            0 => AcStatus::Off,
            1 => AcStatus::Replay,
            2 => AcStatus::Live,
            3 => AcStatus::Pause,
            other => AcStatus::Unknown(other),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AcStatus::Off => "off",
            AcStatus::Replay => "replay",
            AcStatus::Live => "live",
            AcStatus::Pause => "pause",
            AcStatus::Unknown(_) => "unknown",
        }
    }
}

/// `AC_FLAG_TYPE`
pub fn flag_name(raw: i32) -> &'static str {
    match raw {
        0 => "none",
        1 => "blue",
        2 => "yellow",
        3 => "black",
        4 => "white",
        5 => "checkered",
        6 => "penalty",
        _ => "unknown",
    }
}

/// `SPageFileGraphic`
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcGraphics {
    pub packet_id: i32,
    pub status: AcStatus,
    /// Raw `AC_SESSION_TYPE`.
    pub session: i32,
    pub current_time: String,
    pub last_time: String,
    pub best_time: String,
    pub split: String,
    pub completed_laps: i32,
    pub position: i32,
    pub i_current_time: i32,
    pub i_last_time: i32,
    pub i_best_time: i32,
    pub session_time_left: f32,
    pub distance_traveled: f32,
    pub is_in_pit: bool,
    pub current_sector_index: i32,
    pub last_sector_time: i32,
    pub number_of_laps: i32,
    pub tyre_compound: String,
    pub replay_time_multiplier: f32,
    pub normalized_car_position: f32,
    pub car_coordinates: [f32; 3],
    pub penalty_time: f32,
    pub flag: i32,
    pub ideal_line_on: bool,
    pub is_in_pit_lane: bool,
    pub surface_grip: f32,
    pub mandatory_pit_done: bool,
    pub wind_speed: f32,
    pub wind_direction: f32,
}

/// One consistent physics copy plus the graphics page read alongside it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AcFrame {
    pub physics: AcPhysics,
    pub graphics: AcGraphics,
}

fn bool_i32(reader: &LayoutReader<'_>, offset: usize) -> Result<bool, DecodeError> {
    Ok(reader.i32(offset)? != 0)
}

fn wheel_vectors(reader: &LayoutReader<'_>, offset: usize) -> Result<[[f32; 3]; 4], DecodeError> {
    Ok([
        reader.f32_array(offset)?,
        reader.f32_array(offset + 12)?,
        reader.f32_array(offset + 24)?,
        reader.f32_array(offset + 36)?,
    ])
}

/// Decode `SPageFilePhysics`.
pub fn decode_physics(data: &[u8]) -> Result<AcPhysics, DecodeError> {
    let r = LayoutReader::new(PHYSICS_LAYOUT, data, PHYSICS_SIZE)?;

    Ok(AcPhysics {
        packet_id: r.i32(OFF_PACKET_ID)?,
        gas: r.f32(OFF_GAS)?,
        brake: r.f32(OFF_BRAKE)?,
        fuel: r.f32(OFF_FUEL)?,
        gear: r.i32(OFF_GEAR)?,
        rpms: r.i32(OFF_RPMS)?,
        steer_angle: r.f32(OFF_STEER_ANGLE)?,
        speed_kmh: r.f32(OFF_SPEED_KMH)?,
        velocity: r.f32_array(OFF_VELOCITY)?,
        acc_g: r.f32_array(OFF_ACC_G)?,
        wheel_slip: r.f32_array(OFF_WHEEL_SLIP)?,
        wheel_load: r.f32_array(OFF_WHEEL_LOAD)?,
        wheels_pressure: r.f32_array(OFF_WHEELS_PRESSURE)?,
        wheel_angular_speed: r.f32_array(OFF_WHEEL_ANGULAR_SPEED)?,
        tyre_wear: r.f32_array(OFF_TYRE_WEAR)?,
        tyre_dirty_level: r.f32_array(OFF_TYRE_DIRTY_LEVEL)?,
        tyre_core_temperature: r.f32_array(OFF_TYRE_CORE_TEMP)?,
        camber_rad: r.f32_array(OFF_CAMBER_RAD)?,
        suspension_travel: r.f32_array(OFF_SUSPENSION_TRAVEL)?,
        drs: r.f32(OFF_DRS)?,
        tc: r.f32(OFF_TC)?,
        heading: r.f32(OFF_HEADING)?,
        pitch: r.f32(OFF_PITCH)?,
        roll: r.f32(OFF_ROLL)?,
        cg_height: r.f32(OFF_CG_HEIGHT)?,
        car_damage: r.f32_array(OFF_CAR_DAMAGE)?,
        number_of_tyres_out: r.i32(OFF_TYRES_OUT)?,
        pit_limiter_on: bool_i32(&r, OFF_PIT_LIMITER_ON)?,
        abs: r.f32(OFF_ABS)?,
        kers_charge: r.f32(OFF_KERS_CHARGE)?,
        kers_input: r.f32(OFF_KERS_INPUT)?,
        auto_shifter_on: bool_i32(&r, OFF_AUTO_SHIFTER_ON)?,
        ride_height: r.f32_array(OFF_RIDE_HEIGHT)?,
        turbo_boost: r.f32(OFF_TURBO_BOOST)?,
        ballast: r.f32(OFF_BALLAST)?,
        air_density: r.f32(OFF_AIR_DENSITY)?,
        air_temp: r.f32(OFF_AIR_TEMP)?,
        road_temp: r.f32(OFF_ROAD_TEMP)?,
        local_angular_vel: r.f32_array(OFF_LOCAL_ANGULAR_VEL)?,
        final_ff: r.f32(OFF_FINAL_FF)?,
        performance_meter: r.f32(OFF_PERFORMANCE_METER)?,
        engine_brake: r.i32(OFF_ENGINE_BRAKE)?,
        ers_recovery_level: r.i32(OFF_ERS_RECOVERY_LEVEL)?,
        ers_power_level: r.i32(OFF_ERS_POWER_LEVEL)?,
        ers_heat_charging: bool_i32(&r, OFF_ERS_HEAT_CHARGING)?,
        ers_is_charging: bool_i32(&r, OFF_ERS_IS_CHARGING)?,
        kers_current_kj: r.f32(OFF_KERS_CURRENT_KJ)?,
        drs_available: bool_i32(&r, OFF_DRS_AVAILABLE)?,
        drs_enabled: bool_i32(&r, OFF_DRS_ENABLED)?,
        brake_temp: r.f32_array(OFF_BRAKE_TEMP)?,
        clutch: r.f32(OFF_CLUTCH)?,
        tyre_temp_i: r.f32_array(OFF_TYRE_TEMP_I)?,
        tyre_temp_m: r.f32_array(OFF_TYRE_TEMP_M)?,
        tyre_temp_o: r.f32_array(OFF_TYRE_TEMP_O)?,
        is_ai_controlled: bool_i32(&r, OFF_IS_AI_CONTROLLED)?,
        tyre_contact_point: wheel_vectors(&r, OFF_TYRE_CONTACT_POINT)?,
        tyre_contact_normal: wheel_vectors(&r, OFF_TYRE_CONTACT_NORMAL)?,
        tyre_contact_heading: wheel_vectors(&r, OFF_TYRE_CONTACT_HEADING)?,
        brake_bias: r.f32(OFF_BRAKE_BIAS)?,
        local_velocity: r.f32_array(OFF_LOCAL_VELOCITY)?,
    })
}

/// Decode `SPageFileGraphic`.
pub fn decode_graphics(data: &[u8]) -> Result<AcGraphics, DecodeError> {
    let r = LayoutReader::new(GRAPHICS_LAYOUT, data, GRAPHICS_SIZE)?;

    Ok(AcGraphics {
        packet_id: r.i32(OFF_G_PACKET_ID)?,
        status: AcStatus::from_raw(r.i32(OFF_G_STATUS)?),
        session: r.i32(OFF_G_SESSION)?,
        current_time: r.utf16_string(OFF_G_CURRENT_TIME, TIME_STRING_CHARS)?,
        last_time: r.utf16_string(OFF_G_LAST_TIME, TIME_STRING_CHARS)?,
        best_time: r.utf16_string(OFF_G_BEST_TIME, TIME_STRING_CHARS)?,
        split: r.utf16_string(OFF_G_SPLIT, TIME_STRING_CHARS)?,
        completed_laps: r.i32(OFF_G_COMPLETED_LAPS)?,
        position: r.i32(OFF_G_POSITION)?,
        i_current_time: r.i32(OFF_G_I_CURRENT_TIME)?,
        i_last_time: r.i32(OFF_G_I_LAST_TIME)?,
        i_best_time: r.i32(OFF_G_I_BEST_TIME)?,
        session_time_left: r.f32(OFF_G_SESSION_TIME_LEFT)?,
        distance_traveled: r.f32(OFF_G_DISTANCE_TRAVELED)?,
        is_in_pit: bool_i32(&r, OFF_G_IS_IN_PIT)?,
        current_sector_index: r.i32(OFF_G_CURRENT_SECTOR)?,
        last_sector_time: r.i32(OFF_G_LAST_SECTOR_TIME)?,
        number_of_laps: r.i32(OFF_G_NUMBER_OF_LAPS)?,
        tyre_compound: r.utf16_string(OFF_G_TYRE_COMPOUND, TYRE_COMPOUND_CHARS)?,
        replay_time_multiplier: r.f32(OFF_G_REPLAY_TIME_MULTIPLIER)?,
        normalized_car_position: r.f32(OFF_G_NORMALIZED_POSITION)?,
        car_coordinates: r.f32_array(OFF_G_CAR_COORDINATES)?,
        penalty_time: r.f32(OFF_G_PENALTY_TIME)?,
        flag: r.i32(OFF_G_FLAG)?,
        ideal_line_on: bool_i32(&r, OFF_G_IDEAL_LINE_ON)?,
        is_in_pit_lane: bool_i32(&r, OFF_G_IS_IN_PIT_LANE)?,
        surface_grip: r.f32(OFF_G_SURFACE_GRIP)?,
        mandatory_pit_done: bool_i32(&r, OFF_G_MANDATORY_PIT_DONE)?,
        wind_speed: r.f32(OFF_G_WIND_SPEED)?,
        wind_direction: r.f32(OFF_G_WIND_DIRECTION)?,
    })
}

/// Decode a physics and graphics dump pair.
pub fn decode_frame(physics: &[u8], graphics: &[u8]) -> Result<AcFrame, DecodeError> {
    Ok(AcFrame {
        physics: decode_physics(physics)?,
        graphics: decode_graphics(graphics)?,
    })
}

/// Pull adapter over the two AC pages.
#[derive(Debug)]
pub struct AcAdapter {
    regions: Arc<dyn RegionProvider>,
    physics: Option<Arc<dyn SharedRegion>>,
    graphics: Option<Arc<dyn SharedRegion>>,
    last_packet_id: Option<i32>,
    staleness: StalenessTracker,
}

impl AcAdapter {
    pub fn new(regions: Arc<dyn RegionProvider>, stale_timeout: Duration) -> Self {
        Self {
            regions,
            physics: None,
            graphics: None,
            last_packet_id: None,
            staleness: StalenessTracker::new(stale_timeout),
        }
    }

    fn lost(&self, reason: impl Into<String>) -> SourceError {
        SourceError::lost(SourceTitle::AssettoCorsa, reason)
    }

    fn decode_error(source: DecodeError) -> SourceError {
        SourceError::Decode {
            title: SourceTitle::AssettoCorsa,
            source,
        }
    }
}

#[async_trait]
impl SourceAdapter for AcAdapter {
    fn title(&self) -> SourceTitle {
        SourceTitle::AssettoCorsa
    }

    async fn probe_and_connect(&mut self) -> bool {
        if self.physics.is_some() && self.graphics.is_some() {
            return true;
        }

        let Some(physics) = self.regions.open(&[PHYSICS_REGION], PHYSICS_SIZE) else {
            trace!("AC physics page not present");
            self.last_packet_id = None;
            return false;
        };
        let Some(graphics) = self.regions.open(&[GRAPHICS_REGION], GRAPHICS_SIZE) else {
            trace!("AC graphics page not present");
            self.last_packet_id = None;
            return false;
        };

        info!(
            physics = physics.name(),
            graphics = graphics.name(),
            "Connected to Assetto Corsa shared memory"
        );
        self.physics = Some(physics);
        self.graphics = Some(graphics);
        self.staleness.arm();
        true
    }

    async fn read_once(&mut self) -> Result<Option<TitleSample>, SourceError> {
        let (Some(physics_region), Some(graphics_region)) = (&self.physics, &self.graphics) else {
            return Err(SourceError::unavailable(
                SourceTitle::AssettoCorsa,
                "not connected",
            ));
        };

        let physics_raw = match read_stable(physics_region.as_ref(), OFF_PACKET_ID, 4) {
            StableRead::Stable(raw) => raw,
            StableRead::Torn => {
                debug!("AC physics page changed during every copy; skipping tick");
                return Ok(None);
            }
            StableRead::Gone => return Err(self.lost("physics page closed")),
        };

        let physics = decode_physics(&physics_raw).map_err(Self::decode_error)?;

        if self.last_packet_id == Some(physics.packet_id) {
            if self.staleness.is_timed_out() {
                return Err(self.lost(format!(
                    "packetId {} unchanged for {}ms",
                    physics.packet_id,
                    self.staleness.timeout().as_millis()
                )));
            }
            return Ok(None);
        }

        let Some(graphics_raw) = graphics_region.snapshot() else {
            return Err(self.lost("graphics page closed"));
        };
        let graphics = decode_graphics(&graphics_raw).map_err(Self::decode_error)?;

        self.last_packet_id = Some(physics.packet_id);
        self.staleness.record_data_received();

        Ok(Some(TitleSample::Ac(Box::new(AcFrame { physics, graphics }))))
    }

    async fn disconnect(&mut self) {
        if self.physics.take().is_some() {
            debug!("Released Assetto Corsa shared memory");
        }
        // The dedup key survives a reconnect to the same pages; it is only
        // dropped once the pages are gone.
        self.graphics = None;
        self.staleness.reset();
    }
}

/// Byte builders for AC pages, shared by tests and simulated feeds.
pub mod fixture {
    use super::*;

    fn put_f32(buf: &mut [u8], offset: usize, value: f32) {
        if let Some(slot) = buf.get_mut(offset..offset + 4) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn put_i32(buf: &mut [u8], offset: usize, value: i32) {
        if let Some(slot) = buf.get_mut(offset..offset + 4) {
            slot.copy_from_slice(&value.to_le_bytes());
        }
    }

    fn put_f32s(buf: &mut [u8], offset: usize, values: &[f32]) {
        for (i, value) in values.iter().enumerate() {
            put_f32(buf, offset + i * 4, *value);
        }
    }

    fn put_utf16(buf: &mut [u8], offset: usize, chars: usize, value: &str) {
        for (i, unit) in value.encode_utf16().take(chars.saturating_sub(1)).enumerate() {
            if let Some(slot) = buf.get_mut(offset + i * 2..offset + i * 2 + 2) {
                slot.copy_from_slice(&unit.to_le_bytes());
            }
        }
    }

    /// A physics page for a car in third gear at 180 km/h.
    pub fn physics_bytes(packet_id: i32) -> Vec<u8> {
        let mut buf = vec![0u8; PHYSICS_SIZE];
        put_i32(&mut buf, OFF_PACKET_ID, packet_id);
        put_f32(&mut buf, OFF_GAS, 0.85);
        put_f32(&mut buf, OFF_BRAKE, 0.0);
        put_f32(&mut buf, OFF_FUEL, 42.5);
        put_i32(&mut buf, OFF_GEAR, 4);
        put_i32(&mut buf, OFF_RPMS, 7250);
        put_f32(&mut buf, OFF_STEER_ANGLE, -0.125);
        put_f32(&mut buf, OFF_SPEED_KMH, 180.0);
        put_f32s(&mut buf, OFF_VELOCITY, &[1.0, 0.0, 50.0]);
        put_f32s(&mut buf, OFF_ACC_G, &[0.5, 1.0, -0.25]);
        put_f32s(&mut buf, OFF_WHEEL_SLIP, &[0.01, 0.02, 0.03, 0.04]);
        put_f32s(&mut buf, OFF_WHEEL_LOAD, &[3000.0, 3100.0, 3500.0, 3600.0]);
        put_f32s(&mut buf, OFF_WHEELS_PRESSURE, &[27.5, 27.5, 26.0, 26.0]);
        put_f32s(&mut buf, OFF_TYRE_WEAR, &[98.0, 97.5, 99.0, 99.5]);
        put_f32s(&mut buf, OFF_TYRE_CORE_TEMP, &[85.0, 86.0, 80.0, 81.0]);
        put_f32s(&mut buf, OFF_CAMBER_RAD, &[-0.05, -0.05, -0.03, -0.03]);
        put_f32s(&mut buf, OFF_SUSPENSION_TRAVEL, &[0.02, 0.021, 0.03, 0.031]);
        put_f32(&mut buf, OFF_TC, 0.2);
        put_f32(&mut buf, OFF_HEADING, 1.5);
        put_f32(&mut buf, OFF_PITCH, 0.01);
        put_f32(&mut buf, OFF_ROLL, -0.02);
        put_f32s(&mut buf, OFF_CAR_DAMAGE, &[0.0, 0.0, 1.5, 0.0, 0.0]);
        put_i32(&mut buf, OFF_PIT_LIMITER_ON, 0);
        put_f32(&mut buf, OFF_ABS, 0.3);
        put_f32s(&mut buf, OFF_RIDE_HEIGHT, &[0.05, 0.07]);
        put_f32(&mut buf, OFF_TURBO_BOOST, 1.2);
        put_f32(&mut buf, OFF_AIR_TEMP, 24.0);
        put_f32(&mut buf, OFF_ROAD_TEMP, 31.0);
        put_i32(&mut buf, OFF_DRS_AVAILABLE, 1);
        put_f32s(&mut buf, OFF_BRAKE_TEMP, &[400.0, 410.0, 300.0, 305.0]);
        put_f32(&mut buf, OFF_CLUTCH, 0.0);
        put_f32s(&mut buf, OFF_TYRE_TEMP_I, &[90.0, 91.0, 84.0, 85.0]);
        put_f32s(&mut buf, OFF_TYRE_TEMP_M, &[88.0, 89.0, 82.0, 83.0]);
        put_f32s(&mut buf, OFF_TYRE_TEMP_O, &[86.0, 87.0, 80.0, 81.0]);
        put_f32s(&mut buf, OFF_TYRE_CONTACT_POINT + 36, &[7.0, 8.0, 9.0]);
        put_f32(&mut buf, OFF_BRAKE_BIAS, 0.58);
        put_f32s(&mut buf, OFF_LOCAL_VELOCITY, &[0.5, 0.0, 49.9]);
        buf
    }

    /// A graphics page for lap 6 of a live race.
    pub fn graphics_bytes(packet_id: i32) -> Vec<u8> {
        let mut buf = vec![0u8; GRAPHICS_SIZE];
        put_i32(&mut buf, OFF_G_PACKET_ID, packet_id);
        put_i32(&mut buf, OFF_G_STATUS, 2);
        put_i32(&mut buf, OFF_G_SESSION, 2);
        put_utf16(&mut buf, OFF_G_CURRENT_TIME, TIME_STRING_CHARS, "0:41:120");
        put_utf16(&mut buf, OFF_G_LAST_TIME, TIME_STRING_CHARS, "1:52:004");
        put_utf16(&mut buf, OFF_G_BEST_TIME, TIME_STRING_CHARS, "1:51:337");
        put_i32(&mut buf, OFF_G_COMPLETED_LAPS, 5);
        put_i32(&mut buf, OFF_G_POSITION, 3);
        put_i32(&mut buf, OFF_G_I_CURRENT_TIME, 41_120);
        put_i32(&mut buf, OFF_G_I_LAST_TIME, 112_004);
        put_i32(&mut buf, OFF_G_I_BEST_TIME, 111_337);
        put_i32(&mut buf, OFF_G_CURRENT_SECTOR, 1);
        put_i32(&mut buf, OFF_G_NUMBER_OF_LAPS, 20);
        put_utf16(&mut buf, OFF_G_TYRE_COMPOUND, TYRE_COMPOUND_CHARS, "Semislick");
        put_f32(&mut buf, OFF_G_REPLAY_TIME_MULTIPLIER, 1.0);
        put_f32(&mut buf, OFF_G_NORMALIZED_POSITION, 0.42);
        put_f32s(&mut buf, OFF_G_CAR_COORDINATES, &[-120.5, 12.0, 340.25]);
        put_i32(&mut buf, OFF_G_FLAG, 2);
        put_f32(&mut buf, OFF_G_SURFACE_GRIP, 0.98);
        put_f32(&mut buf, OFF_G_WIND_SPEED, 3.5);
        put_f32(&mut buf, OFF_G_WIND_DIRECTION, 270.0);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::fixture::{graphics_bytes, physics_bytes};
    use super::*;
    use crate::shared_memory::InMemoryRegions;
    use proptest::prelude::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn test_physics_fixture_fields() -> TestResult {
        let physics = decode_physics(&physics_bytes(1234))?;
        assert_eq!(physics.packet_id, 1234);
        assert_eq!(physics.gear, 4);
        assert_eq!(physics.rpms, 7250);
        assert_eq!(physics.speed_kmh, 180.0);
        assert_eq!(physics.steer_angle, -0.125);
        assert_eq!(physics.acc_g, [0.5, 1.0, -0.25]);
        assert_eq!(physics.wheels_pressure, [27.5, 27.5, 26.0, 26.0]);
        assert_eq!(physics.tyre_temp_o, [86.0, 87.0, 80.0, 81.0]);
        assert_eq!(physics.tyre_contact_point[3], [7.0, 8.0, 9.0]);
        assert!(physics.drs_available);
        assert!(!physics.pit_limiter_on);
        assert_eq!(physics.brake_bias, 0.58);
        assert_eq!(physics.local_velocity, [0.5, 0.0, 49.9]);
        Ok(())
    }

    #[test]
    fn test_graphics_fixture_fields() -> TestResult {
        let graphics = decode_graphics(&graphics_bytes(77))?;
        assert_eq!(graphics.packet_id, 77);
        assert_eq!(graphics.status, AcStatus::Live);
        assert_eq!(graphics.current_time, "0:41:120");
        assert_eq!(graphics.best_time, "1:51:337");
        assert_eq!(graphics.split, "");
        assert_eq!(graphics.completed_laps, 5);
        assert_eq!(graphics.i_last_time, 112_004);
        assert_eq!(graphics.tyre_compound, "Semislick");
        assert_eq!(graphics.replay_time_multiplier, 1.0);
        assert_eq!(graphics.car_coordinates, [-120.5, 12.0, 340.25]);
        assert_eq!(flag_name(graphics.flag), "yellow");
        assert_eq!(graphics.wind_direction, 270.0);
        Ok(())
    }

    #[test]
    fn test_padding_before_replay_multiplier_is_honoured() -> TestResult {
        let mut raw = graphics_bytes(1);
        // Garbage in the alignment gap must not leak into neighbouring fields.
        raw[242] = 0xAA;
        raw[243] = 0xBB;
        let graphics = decode_graphics(&raw)?;
        assert_eq!(graphics.tyre_compound, "Semislick");
        assert_eq!(graphics.replay_time_multiplier, 1.0);
        Ok(())
    }

    #[test]
    fn test_short_buffers_are_size_mismatch() -> TestResult {
        assert_eq!(
            decode_physics(&[0u8; 100]),
            Err(DecodeError::SizeMismatch {
                layout: "AC physics",
                expected: PHYSICS_SIZE,
                actual: 100
            })
        );
        assert!(matches!(
            decode_graphics(&[]),
            Err(DecodeError::SizeMismatch { actual: 0, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_larger_mapping_is_accepted() -> TestResult {
        let mut raw = physics_bytes(9);
        raw.resize(4096, 0xFF);
        assert_eq!(decode_physics(&raw)?.packet_id, 9);
        Ok(())
    }

    #[tokio::test]
    async fn test_adapter_dedups_on_packet_id() -> TestResult {
        let regions = InMemoryRegions::new();
        let physics = regions.create(PHYSICS_REGION, PHYSICS_SIZE);
        let graphics = regions.create(GRAPHICS_REGION, GRAPHICS_SIZE);
        physics.replace(&physics_bytes(1));
        graphics.replace(&graphics_bytes(1));

        let mut adapter = AcAdapter::new(Arc::new(regions.clone()), Duration::from_secs(2));
        assert!(adapter.probe_and_connect().await);

        assert!(adapter.read_once().await?.is_some());
        assert!(adapter.read_once().await?.is_none());

        physics.replace(&physics_bytes(2));
        let sample = adapter.read_once().await?.ok_or("expected new sample")?;
        match sample {
            TitleSample::Ac(frame) => assert_eq!(frame.physics.packet_id, 2),
            other => return Err(format!("unexpected sample {other:?}").into()),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_probe_fails_without_regions() -> TestResult {
        let mut adapter = AcAdapter::new(Arc::new(InMemoryRegions::new()), Duration::from_secs(2));
        assert!(!adapter.probe_and_connect().await);
        assert!(adapter.read_once().await.is_err());
        Ok(())
    }

    #[tokio::test]
    async fn test_closed_region_reports_lost() -> TestResult {
        let regions = InMemoryRegions::new();
        regions.create(PHYSICS_REGION, PHYSICS_SIZE).replace(&physics_bytes(1));
        regions.create(GRAPHICS_REGION, GRAPHICS_SIZE).replace(&graphics_bytes(1));

        let mut adapter = AcAdapter::new(Arc::new(regions.clone()), Duration::from_secs(2));
        assert!(adapter.probe_and_connect().await);
        regions.remove(PHYSICS_REGION);

        let err = adapter.read_once().await.err().ok_or("expected loss")?;
        assert!(err.is_source_lost());
        Ok(())
    }

    #[tokio::test]
    async fn test_frozen_packet_id_times_out() -> TestResult {
        let regions = InMemoryRegions::new();
        regions.create(PHYSICS_REGION, PHYSICS_SIZE).replace(&physics_bytes(5));
        regions.create(GRAPHICS_REGION, GRAPHICS_SIZE).replace(&graphics_bytes(5));

        let mut adapter = AcAdapter::new(Arc::new(regions), Duration::from_millis(20));
        assert!(adapter.probe_and_connect().await);
        assert!(adapter.read_once().await?.is_some());
        assert!(adapter.read_once().await?.is_none());

        std::thread::sleep(Duration::from_millis(40));
        let err = adapter.read_once().await.err().ok_or("expected stale source")?;
        assert!(matches!(err, SourceError::Lost { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_reconnect_to_frozen_pages_does_not_replay_frame() -> TestResult {
        let regions = InMemoryRegions::new();
        let physics = regions.create(PHYSICS_REGION, PHYSICS_SIZE);
        physics.replace(&physics_bytes(5));
        regions.create(GRAPHICS_REGION, GRAPHICS_SIZE).replace(&graphics_bytes(5));

        let mut adapter = AcAdapter::new(Arc::new(regions.clone()), Duration::from_millis(20));
        assert!(adapter.probe_and_connect().await);
        assert!(adapter.read_once().await?.is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(adapter.read_once().await.is_err());
        adapter.disconnect().await;

        assert!(adapter.probe_and_connect().await);
        assert!(adapter.read_once().await?.is_none());

        physics.replace(&physics_bytes(6));
        assert!(adapter.read_once().await?.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_recreated_pages_emit_the_same_packet_id_again() -> TestResult {
        let regions = InMemoryRegions::new();
        regions.create(PHYSICS_REGION, PHYSICS_SIZE).replace(&physics_bytes(5));
        regions.create(GRAPHICS_REGION, GRAPHICS_SIZE).replace(&graphics_bytes(5));

        let mut adapter = AcAdapter::new(Arc::new(regions.clone()), Duration::from_secs(2));
        assert!(adapter.probe_and_connect().await);
        assert!(adapter.read_once().await?.is_some());

        regions.remove(PHYSICS_REGION);
        regions.remove(GRAPHICS_REGION);
        assert!(adapter.read_once().await.is_err());
        adapter.disconnect().await;
        assert!(!adapter.probe_and_connect().await);

        regions.create(PHYSICS_REGION, PHYSICS_SIZE).replace(&physics_bytes(5));
        regions.create(GRAPHICS_REGION, GRAPHICS_SIZE).replace(&graphics_bytes(5));
        assert!(adapter.probe_and_connect().await);
        assert!(adapter.read_once().await?.is_some());
        Ok(())
    }

    proptest! {
        #[test]
        fn prop_physics_never_panics(data in proptest::collection::vec(any::<u8>(), 0..700)) {
            let result = decode_physics(&data);
            prop_assert_eq!(result.is_ok(), data.len() >= PHYSICS_SIZE);
        }

        #[test]
        fn prop_graphics_never_panics(data in proptest::collection::vec(any::<u8>(), 0..400)) {
            let result = decode_graphics(&data);
            prop_assert_eq!(result.is_ok(), data.len() >= GRAPHICS_SIZE);
        }
    }
}
