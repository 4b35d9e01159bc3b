//! Title structs to [`TelemetryRecord`].
//!
//! Mapping functions are pure. [`Normalizer`] only adds the monotonic
//! timestamp check on top of [`normalize`].

use racing_telemetry_core::units::{
    finite, finite_f64, kelvin_to_celsius, lap_ms_from_i32, lap_ms_from_seconds, ms_to_kmh,
    psi_to_kpa, rpm_from_f64, signed_unit_interval, unit_interval, STANDARD_GRAVITY,
};
use racing_telemetry_core::{
    NormalizeError, Orientation, RecordTimestamp, SessionType, SourceTitle, TelemetryRecord,
    Vec3, WheelState,
};

use crate::TitleSample;
use crate::ac::{AcFrame, flag_name};
use crate::acc::AccSnapshot;
use crate::lmu::LmuTelemetry;

const WHEEL_NAMES: [&str; 4] = ["fl", "fr", "rl", "rr"];

/// Map any title sample into the canonical record.
pub fn normalize(sample: &TitleSample, timestamp: RecordTimestamp) -> TelemetryRecord {
    match sample {
        TitleSample::Ac(frame) => normalize_ac(frame, timestamp),
        TitleSample::Acc(snapshot) => normalize_acc(snapshot, timestamp),
        TitleSample::Lmu(telemetry) => normalize_lmu(telemetry, timestamp),
    }
}

/// Rejects records whose monotonic timestamp does not advance.
#[derive(Debug, Default)]
pub struct Normalizer {
    previous_ns: Option<u64>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn normalize(
        &mut self,
        sample: &TitleSample,
        timestamp: RecordTimestamp,
    ) -> Result<TelemetryRecord, NormalizeError> {
        let current_ns = timestamp.monotonic_ns;
        if let Some(previous_ns) = self.previous_ns
            && current_ns <= previous_ns
        {
            return Err(NormalizeError::OutOfOrder {
                previous_ns,
                current_ns,
            });
        }
        self.previous_ns = Some(current_ns);
        Ok(normalize(sample, timestamp))
    }

    /// Forget the previous timestamp, e.g. after a source switch.
    pub fn reset(&mut self) {
        self.previous_ns = None;
    }
}

fn positive_u32(raw: i32) -> Option<u32> {
    u32::try_from(raw).ok().filter(|v| *v > 0)
}

fn vec3([x, y, z]: [f32; 3]) -> Vec3 {
    Vec3::new(x, y, z)
}

fn vec3_f64([x, y, z]: [f64; 3]) -> Vec3 {
    Vec3::from_f64(x, y, z)
}

pub fn normalize_ac(frame: &AcFrame, timestamp: RecordTimestamp) -> TelemetryRecord {
    let p = &frame.physics;
    let g = &frame.graphics;
    let mut record = TelemetryRecord::new(SourceTitle::AssettoCorsa, timestamp);

    record.motion.position = Some(vec3(g.car_coordinates));
    record.motion.velocity = Some(vec3(p.velocity));
    record.motion.local_velocity = Some(vec3(p.local_velocity));
    // accG is already in g: [lateral, vertical, longitudinal].
    record.motion.acceleration_g = Some(vec3(p.acc_g));
    record.motion.orientation = Some(Orientation {
        heading: finite(p.heading).unwrap_or(0.0),
        pitch: finite(p.pitch).unwrap_or(0.0),
        roll: finite(p.roll).unwrap_or(0.0),
    });

    let pt = &mut record.powertrain;
    pt.gear = p.gear.saturating_sub(1);
    pt.rpm = u32::try_from(p.rpms).ok();
    pt.speed_kmh = finite(p.speed_kmh).map_or(0.0, f32::abs);
    pt.throttle = unit_interval(p.gas);
    pt.brake = unit_interval(p.brake);
    pt.clutch = unit_interval(p.clutch);
    pt.steering = signed_unit_interval(p.steer_angle);
    pt.fuel_liters = finite(p.fuel);

    for (i, wheel) in record.wheels.iter_mut().enumerate() {
        *wheel = WheelState {
            pressure_kpa: p.wheels_pressure.get(i).copied().and_then(psi_to_kpa),
            temp_core_c: p.tyre_core_temperature.get(i).copied().and_then(finite),
            temp_inner_c: p.tyre_temp_i.get(i).copied().and_then(finite),
            temp_middle_c: p.tyre_temp_m.get(i).copied().and_then(finite),
            temp_outer_c: p.tyre_temp_o.get(i).copied().and_then(finite),
            load_n: p.wheel_load.get(i).copied().and_then(finite),
            slip: p.wheel_slip.get(i).copied().and_then(finite),
            grip_fraction: None,
            wear_remaining: p
                .tyre_wear
                .get(i)
                .copied()
                .and_then(|w| unit_interval(w / 100.0)),
            brake_temp_c: p.brake_temp.get(i).copied().and_then(finite),
        };
    }

    let lap = &mut record.lap;
    lap.lap_number = u32::try_from(g.completed_laps)
        .unwrap_or(0)
        .saturating_add(1);
    lap.current_lap_ms = lap_ms_from_i32(g.i_current_time);
    lap.last_lap_ms = lap_ms_from_i32(g.i_last_time);
    lap.best_lap_ms = lap_ms_from_i32(g.i_best_time);
    lap.sector_index = u32::try_from(g.current_sector_index).ok();
    lap.in_pit = g.is_in_pit;
    lap.race_position = positive_u32(g.position);
    lap.session_type = SessionType::from_ac(g.session);

    let env = &mut record.environment;
    env.air_temp_c = finite(p.air_temp);
    env.track_temp_c = finite(p.road_temp);
    env.wind_speed_ms = finite(g.wind_speed);
    env.wind_direction_deg = finite(g.wind_direction);

    record.extend("packet_id", p.packet_id);
    record.extend("status", g.status.as_str());
    record.extend("flag", flag_name(g.flag));
    record.extend("in_pit_lane", g.is_in_pit_lane);
    record.extend("completed_laps", g.completed_laps);
    record.extend("number_of_laps", g.number_of_laps);
    record.extend("session_time_left_ms", g.session_time_left);
    record.extend("distance_traveled_m", g.distance_traveled);
    record.extend("normalized_car_position", g.normalized_car_position);
    record.extend("penalty_time_s", g.penalty_time);
    record.extend("surface_grip", g.surface_grip);
    record.extend("tyre_compound", g.tyre_compound.as_str());
    record.extend("mandatory_pit_done", g.mandatory_pit_done);
    if let Some(ms) = lap_ms_from_i32(g.last_sector_time) {
        record.extend("last_sector_time_ms", ms);
    }

    record.extend("drs", p.drs);
    record.extend("drs_available", p.drs_available);
    record.extend("drs_enabled", p.drs_enabled);
    record.extend("tc", p.tc);
    record.extend("abs", p.abs);
    record.extend("pit_limiter", p.pit_limiter_on);
    record.extend("auto_shifter", p.auto_shifter_on);
    record.extend("brake_bias", p.brake_bias);
    record.extend("turbo_boost", p.turbo_boost);
    record.extend("engine_brake", p.engine_brake);
    record.extend("kers_charge", p.kers_charge);
    record.extend("kers_input", p.kers_input);
    record.extend("kers_current_kj", p.kers_current_kj);
    record.extend("ers_recovery_level", p.ers_recovery_level);
    record.extend("ers_power_level", p.ers_power_level);
    record.extend("ers_heat_charging", p.ers_heat_charging);
    record.extend("ers_is_charging", p.ers_is_charging);
    record.extend("is_ai_controlled", p.is_ai_controlled);
    record.extend("number_of_tyres_out", p.number_of_tyres_out);
    let [front_ride, rear_ride] = p.ride_height;
    record.extend("ride_height_front_m", front_ride);
    record.extend("ride_height_rear_m", rear_ride);

    for (name, value) in ["front", "rear", "left", "right", "center"]
        .iter()
        .zip(p.car_damage)
    {
        record.extend(&format!("damage_{name}"), value);
    }
    for (i, name) in WHEEL_NAMES.iter().enumerate() {
        if let Some(camber) = p.camber_rad.get(i) {
            record.extend(&format!("camber_rad_{name}"), *camber);
        }
        if let Some(travel) = p.suspension_travel.get(i) {
            record.extend(&format!("suspension_travel_m_{name}"), *travel);
        }
    }

    record
}

pub fn normalize_acc(snapshot: &AccSnapshot, timestamp: RecordTimestamp) -> TelemetryRecord {
    let car = &snapshot.car;
    let mut record = TelemetryRecord::new(SourceTitle::AssettoCorsaCompetizione, timestamp);

    // Broadcasting carries no inputs, engine or tyre data; those stay absent.
    record.powertrain.gear = car.gear;
    record.powertrain.speed_kmh = f32::from(car.speed_kmh);

    let lap = &mut record.lap;
    lap.lap_number = u32::from(car.laps).saturating_add(1);
    lap.current_lap_ms = car.current_lap.time_ms();
    lap.last_lap_ms = car.last_lap.time_ms();
    lap.best_lap_ms = car.best_session_lap.time_ms();
    for (slot, split) in lap.sector_times_ms.iter_mut().zip(&car.last_lap.splits_ms) {
        *slot = lap_ms_from_i32(*split);
    }
    lap.in_pit = car.car_location.in_pit();
    lap.race_position = Some(u32::from(car.position)).filter(|p| *p > 0);

    if let Some(realtime) = &snapshot.realtime {
        record.lap.session_type = SessionType::from_acc(realtime.session_type);
        record.environment.air_temp_c = Some(f32::from(realtime.ambient_temp_c));
        record.environment.track_temp_c = Some(f32::from(realtime.track_temp_c));

        record.extend("session_time_ms", realtime.session_time_ms);
        record.extend("session_end_time_ms", realtime.session_end_time_ms);
        record.extend("session_phase", realtime.phase);
        record.extend("clouds", realtime.clouds);
        record.extend("rain_level", realtime.rain_level);
        record.extend("wetness", realtime.wetness);
    }

    record.extend("world_pos_x", car.world_pos_x);
    record.extend("world_pos_y", car.world_pos_y);
    record.extend("yaw", car.yaw);
    record.extend("car_location", car.car_location.as_str());
    record.extend("cup_position", car.cup_position);
    record.extend("track_position", car.track_position);
    record.extend("spline_position", car.spline_position);
    record.extend("delta_ms", car.delta_ms);
    record.extend("lap_invalid", car.current_lap.is_invalid);

    if let Some(track) = &snapshot.track_name {
        record.extend("track_name", track.as_str());
    }
    if let Some(meters) = snapshot.track_meters {
        record.extend("track_meters", meters);
    }
    if let Some(model) = &snapshot.car_model {
        record.extend("car_model", model.as_str());
    }
    if let Some(team) = &snapshot.team_name {
        record.extend("team_name", team.as_str());
    }
    if let Some(number) = snapshot.race_number {
        record.extend("race_number", number);
    }
    if let Some(driver) = &snapshot.driver_name {
        record.extend("driver_name", driver.as_str());
    }

    record
}

/// Euler angles from the rF2 orientation matrix rows.
fn rfactor_orientation(t: &LmuTelemetry) -> Orientation {
    let [x_row, y_row, z_row] = [t.ori_x, t.ori_y, t.ori_z];
    let heading = z_row[0].atan2(z_row[2]);
    let pitch = (-y_row[2]).atan2(x_row[2].hypot(z_row[2]));
    let roll = y_row[0].atan2(x_row[0].hypot(z_row[0]));
    Orientation {
        heading: finite_f64(heading).unwrap_or(0.0),
        pitch: finite_f64(pitch).unwrap_or(0.0),
        roll: finite_f64(roll).unwrap_or(0.0),
    }
}

/// rF2 numbers sectors 1, 2, 0 (0 is the last sector).
fn rfactor_sector_index(raw: i32) -> Option<u32> {
    match raw {
        1 => Some(0),
        2 => Some(1),
        0 => Some(2),
        _ => None,
    }
}

pub fn normalize_lmu(t: &LmuTelemetry, timestamp: RecordTimestamp) -> TelemetryRecord {
    let mut record = TelemetryRecord::new(SourceTitle::LeMansUltimate, timestamp);

    record.motion.position = Some(vec3_f64(t.pos));
    record.motion.local_velocity = Some(vec3_f64(t.local_vel));
    record.motion.acceleration_g = Some(vec3_f64(t.local_accel).scale(1.0 / STANDARD_GRAVITY));
    record.motion.orientation = Some(rfactor_orientation(t));

    let pt = &mut record.powertrain;
    pt.gear = t.gear;
    pt.rpm = rpm_from_f64(t.engine_rpm);
    pt.max_rpm = rpm_from_f64(t.engine_max_rpm).filter(|rpm| *rpm > 0);
    pt.speed_kmh = ms_to_kmh(t.speed as f32);
    pt.throttle = unit_interval(t.unfiltered_throttle as f32);
    pt.brake = unit_interval(t.unfiltered_brake as f32);
    pt.clutch = unit_interval(t.unfiltered_clutch as f32);
    pt.steering = signed_unit_interval(t.unfiltered_steering as f32);
    pt.fuel_liters = finite_f64(t.fuel);

    for (wheel, raw) in record.wheels.iter_mut().zip(&t.wheels) {
        let [inner, middle, outer] = raw.temperature;
        *wheel = WheelState {
            pressure_kpa: finite_f64(raw.pressure),
            temp_core_c: None,
            temp_inner_c: kelvin_to_celsius(inner as f32),
            temp_middle_c: kelvin_to_celsius(middle as f32),
            temp_outer_c: kelvin_to_celsius(outer as f32),
            load_n: finite_f64(raw.tire_load),
            slip: None,
            grip_fraction: unit_interval(raw.grip_fract as f32),
            wear_remaining: unit_interval(raw.wear as f32),
            brake_temp_c: finite_f64(raw.brake_temp),
        };
    }

    let lap = &mut record.lap;
    lap.lap_number = u32::try_from(t.lap_number).unwrap_or(0);
    lap.current_lap_ms = lap_ms_from_seconds(t.cur_lap_time);
    lap.last_lap_ms = lap_ms_from_seconds(t.last_lap_time);
    lap.best_lap_ms = lap_ms_from_seconds(t.best_lap_time);
    lap.sector_index = rfactor_sector_index(t.current_sector);
    // sector2 and lastLapTime are cumulative from the start line.
    lap.sector_times_ms = [
        lap_ms_from_seconds(t.sector1),
        lap_ms_from_seconds(t.sector2 - t.sector1).filter(|_| t.sector1 > 0.0),
        lap_ms_from_seconds(t.last_lap_time - t.sector2).filter(|_| t.sector2 > 0.0),
    ];
    lap.in_pit = t.in_pits;
    lap.race_position = Some(u32::from(t.place)).filter(|p| *p > 0);
    lap.session_type = SessionType::from_rfactor(t.session);

    let env = &mut record.environment;
    env.air_temp_c = finite_f64(t.ambient_temp);
    env.track_temp_c = finite_f64(t.track_temp);
    env.wind_speed_ms = finite_f64(t.wind_speed);

    record.extend("vehicle_name", t.vehicle_name.as_str());
    record.extend("track_name", t.track_name.as_str());
    record.extend("vehicle_class", t.vehicle_class.as_str());
    record.extend("elapsed_time_s", t.elapsed_time);
    record.extend("filtered_throttle", t.filtered_throttle);
    record.extend("filtered_brake", t.filtered_brake);
    record.extend("filtered_steering", t.filtered_steering);
    record.extend("filtered_clutch", t.filtered_clutch);
    record.extend("steering_arm_force", t.steering_arm_force);
    record.extend("engine_water_temp_c", t.engine_water_temp);
    record.extend("engine_oil_temp_c", t.engine_oil_temp);
    record.extend("overheating", t.overheating);
    record.extend("detached", t.detached);
    record.extend(
        "dent_severity_total",
        t.dent_severity.iter().map(|d| u32::from(*d)).sum::<u32>(),
    );
    record.extend("last_impact_magnitude", t.last_impact_magnitude);
    record.extend("track_length_m", t.track_length);
    record.extend("lap_distance_m", t.lap_dist);
    record.extend("path_lateral_m", t.path_lateral);
    record.extend("pit_limiter", t.pit_limiter);
    record.extend("headlights", t.headlights);
    record.extend("yellow_flag_state", t.yellow_flag_state);
    record.extend("num_pitstops", t.num_pitstops);
    record.extend("num_penalties", t.num_penalties);
    record.extend("front_wing_height_m", t.front_wing_height);
    record.extend("front_ride_height_m", t.front_ride_height);
    record.extend("rear_ride_height_m", t.rear_ride_height);
    record.extend("drag_n", t.drag);
    record.extend("front_downforce_n", t.front_downforce);
    record.extend("rear_downforce_n", t.rear_downforce);
    if let Some(ms) = lap_ms_from_seconds(t.best_sector1) {
        record.extend("best_sector1_ms", ms);
    }
    if let Some(ms) = lap_ms_from_seconds(t.best_sector2 - t.best_sector1) {
        record.extend("best_sector2_ms", ms);
    }
    for (name, wheel) in WHEEL_NAMES.iter().zip(&t.wheels) {
        record.extend(&format!("flat_{name}"), wheel.flat);
        record.extend(&format!("surface_{name}"), wheel.terrain_name.as_str());
    }

    record
}
