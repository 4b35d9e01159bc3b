//! Assetto Corsa Competizione broadcasting protocol (SDK v4).
//!
//! ACC has no shared-memory feed for this adapter; it pushes typed UDP events
//! after a registration handshake. A background task owns the socket and folds
//! every event into [`AccSessionState`], and `read_once` only snapshots the
//! latest player-car record out of a watch channel.

use async_trait::async_trait;
use racing_telemetry_core::{AccConfig, DecodeError, SourceError, SourceTitle, StalenessTracker};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::reader::{PacketReader, write_string};
use crate::{SourceAdapter, TitleSample};

const LAYOUT: &str = "ACC broadcast";

const REGISTER_COMMAND_APPLICATION: u8 = 1;
const UNREGISTER_COMMAND_APPLICATION: u8 = 9;
const REQUEST_ENTRY_LIST: u8 = 10;
const REQUEST_TRACK_DATA: u8 = 11;
pub const PROTOCOL_VERSION: u8 = 4;

const MSG_REGISTRATION_RESULT: u8 = 1;
const MSG_REALTIME_UPDATE: u8 = 2;
const MSG_REALTIME_CAR_UPDATE: u8 = 3;
const MSG_ENTRY_LIST: u8 = 4;
const MSG_TRACK_DATA: u8 = 5;
const MSG_ENTRY_LIST_CAR: u8 = 6;
const MSG_BROADCASTING_EVENT: u8 = 7;

pub const MAX_PACKET_SIZE: usize = 4096;
/// The locally driven car.
pub const PLAYER_CAR_INDEX: u16 = 0;
/// Upper bound on the registration round trip during a probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_millis(200);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(200);

/// Model names for the original GT3 grid (`carModelType` 0..=9).
pub fn car_model_name(model: u8) -> Option<&'static str> {
    Some(match model {
        0 => "Porsche 911 GT3 R",
        1 => "Mercedes-AMG GT3",
        2 => "Ferrari 488 GT3",
        3 => "Audi R8 LMS",
        4 => "Lamborghini Huracan GT3",
        5 => "McLaren 650S GT3",
        6 => "Nissan GT-R Nismo GT3",
        7 => "BMW M6 GT3",
        8 => "Bentley Continental GT3",
        9 => "Porsche 911 II GT3 Cup",
        _ => return None,
    })
}

/// Where a car is on track.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CarLocation {
    None,
    Track,
    Pitlane,
    PitEntry,
    PitExit,
    Unknown(u8),
}

impl CarLocation {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => CarLocation::None,
            1 => CarLocation::Track,
            2 => CarLocation::Pitlane,
            3 => CarLocation::PitEntry,
            4 => CarLocation::PitExit,
            other => CarLocation::Unknown(other),
        }
    }

    pub fn in_pit(&self) -> bool {
        matches!(
            self,
            CarLocation::Pitlane | CarLocation::PitEntry | CarLocation::PitExit
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CarLocation::None => "none",
            CarLocation::Track => "track",
            CarLocation::Pitlane => "pitlane",
            CarLocation::PitEntry => "pit_entry",
            CarLocation::PitExit => "pit_exit",
            CarLocation::Unknown(_) => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationResult {
    pub connection_id: i32,
    pub success: bool,
    pub readonly: bool,
    pub error: String,
}

/// Lap record as embedded in realtime messages.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LapRecord {
    /// Raw milliseconds; `i32::MAX` when no lap has been set.
    pub lap_time_ms: i32,
    pub car_index: u16,
    pub driver_index: u16,
    pub splits_ms: Vec<i32>,
    pub is_invalid: bool,
    pub is_valid_for_best: bool,
    pub is_outlap: bool,
    pub is_inlap: bool,
}

impl LapRecord {
    pub fn time_ms(&self) -> Option<u32> {
        racing_telemetry_core::units::lap_ms_from_i32(self.lap_time_ms)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayInfo {
    pub session_time_ms: f32,
    pub remaining_time_ms: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeUpdate {
    pub event_index: u16,
    pub session_index: u16,
    /// SDK `RaceSessionType` code.
    pub session_type: u8,
    pub phase: u8,
    pub session_time_ms: f32,
    pub session_end_time_ms: f32,
    pub focused_car_index: i32,
    pub active_camera_set: String,
    pub active_camera: String,
    pub current_hud_page: String,
    pub replay: Option<ReplayInfo>,
    pub time_of_day_ms: f32,
    pub ambient_temp_c: u8,
    pub track_temp_c: u8,
    /// 0.0..=1.0
    pub clouds: f32,
    pub rain_level: f32,
    pub wetness: f32,
    pub best_session_lap: LapRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeCarUpdate {
    pub car_index: u16,
    pub driver_index: u16,
    pub driver_count: u8,
    /// -1 reverse, 0 neutral.
    pub gear: i32,
    pub world_pos_x: f32,
    pub world_pos_y: f32,
    pub yaw: f32,
    pub car_location: CarLocation,
    pub speed_kmh: u16,
    pub position: u16,
    pub cup_position: u16,
    pub track_position: u16,
    pub spline_position: f32,
    pub laps: u16,
    pub delta_ms: i32,
    pub best_session_lap: LapRecord,
    pub last_lap: LapRecord,
    pub current_lap: LapRecord,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryList {
    pub connection_id: i32,
    pub car_indices: Vec<u16>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CameraSet {
    pub name: String,
    pub cameras: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrackData {
    pub connection_id: i32,
    pub track_name: String,
    pub track_id: i32,
    pub track_meters: i32,
    pub camera_sets: Vec<CameraSet>,
    pub hud_pages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DriverInfo {
    pub first_name: String,
    pub last_name: String,
    pub short_name: String,
    pub category: u8,
    pub nationality: u16,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntryListCar {
    pub car_index: u16,
    pub car_model_type: u8,
    pub team_name: String,
    pub race_number: i32,
    pub cup_category: u8,
    pub current_driver_index: u8,
    pub nationality: u16,
    pub drivers: Vec<DriverInfo>,
}

impl EntryListCar {
    pub fn current_driver(&self) -> Option<&DriverInfo> {
        self.drivers.get(usize::from(self.current_driver_index))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastingEvent {
    pub kind: u8,
    pub message: String,
    pub time_ms: i32,
    pub car_id: i32,
}

/// One decoded inbound datagram.
#[derive(Debug, Clone, PartialEq)]
pub enum AccInboundMessage {
    RegistrationResult(RegistrationResult),
    RealtimeUpdate(RealtimeUpdate),
    RealtimeCarUpdate(RealtimeCarUpdate),
    EntryList(EntryList),
    TrackData(TrackData),
    EntryListCar(EntryListCar),
    BroadcastingEvent(BroadcastingEvent),
}

pub fn build_register_packet(
    display_name: &str,
    connection_password: &str,
    update_interval_ms: u32,
    command_password: &str,
) -> Result<Vec<u8>, DecodeError> {
    let interval = i32::try_from(update_interval_ms.max(1)).unwrap_or(i32::MAX);

    let mut buffer = Vec::with_capacity(128);
    buffer.push(REGISTER_COMMAND_APPLICATION);
    buffer.push(PROTOCOL_VERSION);
    write_string(LAYOUT, &mut buffer, display_name)?;
    write_string(LAYOUT, &mut buffer, connection_password)?;
    buffer.extend_from_slice(&interval.to_le_bytes());
    write_string(LAYOUT, &mut buffer, command_password)?;
    Ok(buffer)
}

fn build_connection_command(command: u8, connection_id: i32) -> Vec<u8> {
    let mut buffer = Vec::with_capacity(5);
    buffer.push(command);
    buffer.extend_from_slice(&connection_id.to_le_bytes());
    buffer
}

pub fn build_unregister_packet(connection_id: i32) -> Vec<u8> {
    build_connection_command(UNREGISTER_COMMAND_APPLICATION, connection_id)
}

pub fn build_request_entry_list_packet(connection_id: i32) -> Vec<u8> {
    build_connection_command(REQUEST_ENTRY_LIST, connection_id)
}

pub fn build_request_track_data_packet(connection_id: i32) -> Vec<u8> {
    build_connection_command(REQUEST_TRACK_DATA, connection_id)
}

/// Decode one inbound datagram.
pub fn parse_inbound_message(data: &[u8]) -> Result<AccInboundMessage, DecodeError> {
    let mut reader = PacketReader::new(LAYOUT, data);
    let message_type = reader.read_u8()?;

    Ok(match message_type {
        MSG_REGISTRATION_RESULT => {
            AccInboundMessage::RegistrationResult(parse_registration_result(&mut reader)?)
        }
        MSG_REALTIME_UPDATE => {
            AccInboundMessage::RealtimeUpdate(parse_realtime_update(&mut reader)?)
        }
        MSG_REALTIME_CAR_UPDATE => {
            AccInboundMessage::RealtimeCarUpdate(parse_realtime_car_update(&mut reader)?)
        }
        MSG_ENTRY_LIST => AccInboundMessage::EntryList(parse_entry_list(&mut reader)?),
        MSG_TRACK_DATA => AccInboundMessage::TrackData(parse_track_data(&mut reader)?),
        MSG_ENTRY_LIST_CAR => AccInboundMessage::EntryListCar(parse_entry_list_car(&mut reader)?),
        MSG_BROADCASTING_EVENT => {
            AccInboundMessage::BroadcastingEvent(parse_broadcasting_event(&mut reader)?)
        }
        other => {
            return Err(DecodeError::UnknownMessage {
                layout: LAYOUT,
                message_type: other,
            });
        }
    })
}

fn parse_registration_result(reader: &mut PacketReader<'_>) -> Result<RegistrationResult, DecodeError> {
    Ok(RegistrationResult {
        connection_id: reader.read_i32_le()?,
        success: reader.read_bool_u8()?,
        // Inverted on the wire: 0 means read-only.
        readonly: reader.read_u8()? == 0,
        error: reader.read_string()?,
    })
}

fn parse_lap(reader: &mut PacketReader<'_>) -> Result<LapRecord, DecodeError> {
    let lap_time_ms = reader.read_i32_le()?;
    let car_index = reader.read_u16_le()?;
    let driver_index = reader.read_u16_le()?;

    let split_count = usize::from(reader.read_u8()?);
    let mut splits_ms = Vec::with_capacity(split_count);
    for _ in 0..split_count {
        splits_ms.push(reader.read_i32_le()?);
    }

    Ok(LapRecord {
        lap_time_ms,
        car_index,
        driver_index,
        splits_ms,
        is_invalid: reader.read_bool_u8()?,
        is_valid_for_best: reader.read_bool_u8()?,
        is_outlap: reader.read_bool_u8()?,
        is_inlap: reader.read_bool_u8()?,
    })
}

fn parse_realtime_update(reader: &mut PacketReader<'_>) -> Result<RealtimeUpdate, DecodeError> {
    let event_index = reader.read_u16_le()?;
    let session_index = reader.read_u16_le()?;
    let session_type = reader.read_u8()?;
    let phase = reader.read_u8()?;
    let session_time_ms = reader.read_f32_le()?;
    let session_end_time_ms = reader.read_f32_le()?;
    let focused_car_index = reader.read_i32_le()?;
    let active_camera_set = reader.read_string()?;
    let active_camera = reader.read_string()?;
    let current_hud_page = reader.read_string()?;

    let replay = if reader.read_bool_u8()? {
        Some(ReplayInfo {
            session_time_ms: reader.read_f32_le()?,
            remaining_time_ms: reader.read_f32_le()?,
        })
    } else {
        None
    };

    Ok(RealtimeUpdate {
        event_index,
        session_index,
        session_type,
        phase,
        session_time_ms,
        session_end_time_ms,
        focused_car_index,
        active_camera_set,
        active_camera,
        current_hud_page,
        replay,
        time_of_day_ms: reader.read_f32_le()?,
        ambient_temp_c: reader.read_u8()?,
        track_temp_c: reader.read_u8()?,
        clouds: f32::from(reader.read_u8()?) / 10.0,
        rain_level: f32::from(reader.read_u8()?) / 10.0,
        wetness: f32::from(reader.read_u8()?) / 10.0,
        best_session_lap: parse_lap(reader)?,
    })
}

fn parse_realtime_car_update(
    reader: &mut PacketReader<'_>,
) -> Result<RealtimeCarUpdate, DecodeError> {
    Ok(RealtimeCarUpdate {
        car_index: reader.read_u16_le()?,
        driver_index: reader.read_u16_le()?,
        driver_count: reader.read_u8()?,
        // Wire gear is offset by two: 0 reverse, 1 neutral, 2 first.
        gear: i32::from(reader.read_u8()?) - 2,
        world_pos_x: reader.read_f32_le()?,
        world_pos_y: reader.read_f32_le()?,
        yaw: reader.read_f32_le()?,
        car_location: CarLocation::from_raw(reader.read_u8()?),
        speed_kmh: reader.read_u16_le()?,
        position: reader.read_u16_le()?,
        cup_position: reader.read_u16_le()?,
        track_position: reader.read_u16_le()?,
        spline_position: reader.read_f32_le()?,
        laps: reader.read_u16_le()?,
        delta_ms: reader.read_i32_le()?,
        best_session_lap: parse_lap(reader)?,
        last_lap: parse_lap(reader)?,
        current_lap: parse_lap(reader)?,
    })
}

fn parse_entry_list(reader: &mut PacketReader<'_>) -> Result<EntryList, DecodeError> {
    let connection_id = reader.read_i32_le()?;
    let count = usize::from(reader.read_u16_le()?);
    let mut car_indices = Vec::with_capacity(count);
    for _ in 0..count {
        car_indices.push(reader.read_u16_le()?);
    }
    Ok(EntryList {
        connection_id,
        car_indices,
    })
}

fn parse_track_data(reader: &mut PacketReader<'_>) -> Result<TrackData, DecodeError> {
    let connection_id = reader.read_i32_le()?;
    let track_name = reader.read_string()?;
    let track_id = reader.read_i32_le()?;
    let track_meters = reader.read_i32_le()?;

    let set_count = usize::from(reader.read_u8()?);
    let mut camera_sets = Vec::with_capacity(set_count);
    for _ in 0..set_count {
        let name = reader.read_string()?;
        let camera_count = usize::from(reader.read_u8()?);
        let mut cameras = Vec::with_capacity(camera_count);
        for _ in 0..camera_count {
            cameras.push(reader.read_string()?);
        }
        camera_sets.push(CameraSet { name, cameras });
    }

    let hud_count = usize::from(reader.read_u8()?);
    let mut hud_pages = Vec::with_capacity(hud_count);
    for _ in 0..hud_count {
        hud_pages.push(reader.read_string()?);
    }

    Ok(TrackData {
        connection_id,
        track_name,
        track_id,
        track_meters,
        camera_sets,
        hud_pages,
    })
}

fn parse_entry_list_car(reader: &mut PacketReader<'_>) -> Result<EntryListCar, DecodeError> {
    let car_index = reader.read_u16_le()?;
    let car_model_type = reader.read_u8()?;
    let team_name = reader.read_string()?;
    let race_number = reader.read_i32_le()?;
    let cup_category = reader.read_u8()?;
    let current_driver_index = reader.read_u8()?;
    let nationality = reader.read_u16_le()?;

    let driver_count = usize::from(reader.read_u8()?);
    let mut drivers = Vec::with_capacity(driver_count);
    for _ in 0..driver_count {
        drivers.push(DriverInfo {
            first_name: reader.read_string()?,
            last_name: reader.read_string()?,
            short_name: reader.read_string()?,
            category: reader.read_u8()?,
            nationality: reader.read_u16_le()?,
        });
    }

    Ok(EntryListCar {
        car_index,
        car_model_type,
        team_name,
        race_number,
        cup_category,
        current_driver_index,
        nationality,
        drivers,
    })
}

fn parse_broadcasting_event(
    reader: &mut PacketReader<'_>,
) -> Result<BroadcastingEvent, DecodeError> {
    Ok(BroadcastingEvent {
        kind: reader.read_u8()?,
        message: reader.read_string()?,
        time_ms: reader.read_i32_le()?,
        car_id: reader.read_i32_le()?,
    })
}

/// Latest player-car view, derived from car updates for [`PLAYER_CAR_INDEX`].
#[derive(Debug, Clone, PartialEq)]
pub struct AccSnapshot {
    pub car: RealtimeCarUpdate,
    pub realtime: Option<RealtimeUpdate>,
    pub track_name: Option<String>,
    pub track_meters: Option<i32>,
    pub car_model: Option<String>,
    pub team_name: Option<String>,
    pub race_number: Option<i32>,
    pub driver_name: Option<String>,
    /// Increments when a player-car update differs from the previous one.
    pub sequence: u64,
}

/// Latest value of every sub-payload seen on one broadcast connection.
#[derive(Debug, Clone, Default)]
pub struct AccSessionState {
    pub registration: Option<RegistrationResult>,
    pub realtime: Option<RealtimeUpdate>,
    pub cars: HashMap<u16, RealtimeCarUpdate>,
    pub track: Option<TrackData>,
    pub entry_list: Option<EntryList>,
    pub entry_cars: HashMap<u16, EntryListCar>,
    pub last_event: Option<BroadcastingEvent>,
    latest: Option<AccSnapshot>,
    sequence: u64,
}

impl AccSessionState {
    pub fn apply(&mut self, message: AccInboundMessage) {
        match message {
            AccInboundMessage::RegistrationResult(result) => self.registration = Some(result),
            AccInboundMessage::RealtimeUpdate(update) => self.realtime = Some(update),
            AccInboundMessage::RealtimeCarUpdate(update) => {
                // A retransmitted player update carries nothing new.
                if update.car_index == PLAYER_CAR_INDEX
                    && self.cars.get(&PLAYER_CAR_INDEX) != Some(&update)
                {
                    self.sequence = self.sequence.saturating_add(1);
                    self.latest = Some(self.derive_snapshot(&update));
                }
                self.cars.insert(update.car_index, update);
            }
            AccInboundMessage::EntryList(list) => {
                self.entry_cars
                    .retain(|index, _| list.car_indices.contains(index));
                self.entry_list = Some(list);
            }
            AccInboundMessage::TrackData(track) => self.track = Some(track),
            AccInboundMessage::EntryListCar(car) => {
                self.entry_cars.insert(car.car_index, car);
            }
            AccInboundMessage::BroadcastingEvent(event) => self.last_event = Some(event),
        }
    }

    pub fn latest(&self) -> Option<&AccSnapshot> {
        self.latest.as_ref()
    }

    fn derive_snapshot(&self, car: &RealtimeCarUpdate) -> AccSnapshot {
        let entry = self.entry_cars.get(&car.car_index);
        AccSnapshot {
            car: car.clone(),
            realtime: self.realtime.clone(),
            track_name: self.track.as_ref().map(|t| t.track_name.clone()),
            track_meters: self.track.as_ref().map(|t| t.track_meters),
            car_model: entry
                .and_then(|e| car_model_name(e.car_model_type))
                .map(str::to_string),
            team_name: entry.map(|e| e.team_name.clone()),
            race_number: entry.map(|e| e.race_number),
            driver_name: entry
                .and_then(EntryListCar::current_driver)
                .map(|d| format!("{} {}", d.first_name, d.last_name)),
            sequence: self.sequence,
        }
    }
}

/// What the receive task publishes.
#[derive(Debug, Clone, Default)]
struct AccFeed {
    packets_received: u64,
    state: AccSessionState,
}

#[derive(Debug)]
struct AccLink {
    feed: watch::Receiver<AccFeed>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

/// Push adapter over the broadcasting protocol.
#[derive(Debug)]
pub struct AccAdapter {
    config: AccConfig,
    link: Option<AccLink>,
    staleness: StalenessTracker,
    last_packets: u64,
    last_sequence: Option<u64>,
}

impl AccAdapter {
    pub fn new(config: AccConfig, stale_timeout: Duration) -> Self {
        Self {
            config,
            link: None,
            staleness: StalenessTracker::new(stale_timeout),
            last_packets: 0,
            last_sequence: None,
        }
    }

    async fn register(&self) -> Option<(UdpSocket, RegistrationResult)> {
        let server = self.config.address();
        let bind_address = match server.ip() {
            IpAddr::V4(_) => SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0),
            IpAddr::V6(_) => SocketAddr::new(IpAddr::V6(Ipv6Addr::UNSPECIFIED), 0),
        };

        let socket = UdpSocket::bind(bind_address).await.ok()?;
        socket.connect(server).await.ok()?;

        let packet = build_register_packet(
            &self.config.display_name,
            &self.config.connection_password,
            self.config.update_interval_ms,
            &self.config.command_password,
        )
        .ok()?;
        socket.send(&packet).await.ok()?;

        let mut buf = vec![0u8; MAX_PACKET_SIZE];
        let len = match tokio::time::timeout(PROBE_TIMEOUT, socket.recv(&mut buf)).await {
            Ok(Ok(len)) => len,
            Ok(Err(e)) => {
                trace!(error = %e, endpoint = %server, "ACC broadcast endpoint refused registration");
                return None;
            }
            Err(_) => {
                trace!(endpoint = %server, "No ACC registration reply");
                return None;
            }
        };

        match parse_inbound_message(buf.get(..len)?) {
            Ok(AccInboundMessage::RegistrationResult(result)) if result.success => {
                Some((socket, result))
            }
            Ok(AccInboundMessage::RegistrationResult(result)) => {
                warn!(error = %result.error, "ACC registration rejected");
                None
            }
            Ok(_) => {
                debug!("ACC answered registration with an unexpected message");
                None
            }
            Err(e) => {
                debug!(error = %e, "Malformed ACC registration reply");
                None
            }
        }
    }
}

async fn run_session(
    socket: UdpSocket,
    registration: RegistrationResult,
    feed: watch::Sender<AccFeed>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let connection_id = registration.connection_id;
    for request in [
        build_request_entry_list_packet(connection_id),
        build_request_track_data_packet(connection_id),
    ] {
        if let Err(e) = socket.send(&request).await {
            debug!(error = %e, "Failed to send ACC request");
        }
    }

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                if let Err(e) = socket.send(&build_unregister_packet(connection_id)).await {
                    debug!(error = %e, "Failed to unregister from ACC");
                }
                break;
            }
            received = socket.recv(&mut buf) => {
                let len = match received {
                    Ok(len) => len,
                    Err(e) => {
                        warn!(error = %e, "ACC broadcast socket failed");
                        break;
                    }
                };
                let Some(packet) = buf.get(..len) else { continue };
                match parse_inbound_message(packet) {
                    Ok(message) => feed.send_modify(|f| {
                        f.packets_received = f.packets_received.wrapping_add(1);
                        f.state.apply(message);
                    }),
                    Err(e) => debug!(error = %e, "Skipping ACC packet"),
                }
            }
        }
    }

    debug!(connection_id, "ACC broadcast session ended");
}

#[async_trait]
impl SourceAdapter for AccAdapter {
    fn title(&self) -> SourceTitle {
        SourceTitle::AssettoCorsaCompetizione
    }

    async fn probe_and_connect(&mut self) -> bool {
        if self.link.is_some() {
            return true;
        }

        let Some((socket, registration)) = self.register().await else {
            return false;
        };

        info!(
            endpoint = %self.config.address(),
            connection_id = registration.connection_id,
            readonly = registration.readonly,
            "Registered with ACC broadcasting"
        );

        let mut state = AccSessionState::default();
        state.apply(AccInboundMessage::RegistrationResult(registration.clone()));
        let (feed_tx, feed_rx) = watch::channel(AccFeed {
            packets_received: 0,
            state,
        });
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(run_session(socket, registration, feed_tx, shutdown_rx));

        self.link = Some(AccLink {
            feed: feed_rx,
            shutdown: Some(shutdown_tx),
            task,
        });
        self.last_packets = 0;
        self.last_sequence = None;
        self.staleness.arm();
        true
    }

    async fn read_once(&mut self) -> Result<Option<TitleSample>, SourceError> {
        let title = SourceTitle::AssettoCorsaCompetizione;
        let Some(link) = self.link.as_mut() else {
            return Err(SourceError::unavailable(title, "not registered"));
        };

        if link.feed.has_changed().is_err() {
            return Err(SourceError::lost(title, "broadcast session ended"));
        }

        let feed = link.feed.borrow_and_update();
        if feed.packets_received != self.last_packets {
            self.last_packets = feed.packets_received;
            self.staleness.record_data_received();
        } else if self.staleness.is_timed_out() {
            return Err(SourceError::lost(
                title,
                format!(
                    "no broadcast traffic for {}ms",
                    self.staleness.timeout().as_millis()
                ),
            ));
        }

        let Some(snapshot) = feed.state.latest() else {
            return Ok(None);
        };
        if self.last_sequence == Some(snapshot.sequence) {
            return Ok(None);
        }
        self.last_sequence = Some(snapshot.sequence);
        Ok(Some(TitleSample::Acc(Box::new(snapshot.clone()))))
    }

    async fn disconnect(&mut self) {
        if let Some(mut link) = self.link.take() {
            if let Some(shutdown) = link.shutdown.take()
                && shutdown.send(()).is_err()
            {
                debug!("ACC receive task already stopped");
            }
            if tokio::time::timeout(SHUTDOWN_TIMEOUT, &mut link.task)
                .await
                .is_err()
            {
                debug!("ACC receive task did not stop in time; aborting");
                link.task.abort();
            }
        }
        self.last_packets = 0;
        self.last_sequence = None;
        self.staleness.reset();
    }
}

/// Encoders for inbound messages, used to simulate an ACC server.
pub mod fixture {
    use super::*;

    fn push_string(buffer: &mut Vec<u8>, value: &str) {
        let len = u16::try_from(value.len()).unwrap_or(u16::MAX);
        buffer.extend_from_slice(&len.to_le_bytes());
        buffer.extend_from_slice(value.as_bytes().get(..usize::from(len)).unwrap_or_default());
    }

    pub fn push_lap(buffer: &mut Vec<u8>, lap_time_ms: i32, splits: &[i32]) {
        buffer.extend_from_slice(&lap_time_ms.to_le_bytes());
        buffer.extend_from_slice(&PLAYER_CAR_INDEX.to_le_bytes());
        buffer.extend_from_slice(&0u16.to_le_bytes());
        buffer.push(u8::try_from(splits.len()).unwrap_or(u8::MAX));
        for split in splits.iter().take(usize::from(u8::MAX)) {
            buffer.extend_from_slice(&split.to_le_bytes());
        }
        buffer.extend_from_slice(&[0, 1, 0, 0]);
    }

    pub fn registration_result(connection_id: i32, success: bool, error: &str) -> Vec<u8> {
        let mut packet = vec![MSG_REGISTRATION_RESULT];
        packet.extend_from_slice(&connection_id.to_le_bytes());
        packet.push(u8::from(success));
        packet.push(1);
        push_string(&mut packet, error);
        packet
    }

    /// Race session at 24°C air / 31°C track, light rain.
    pub fn realtime_update(session_time_ms: f32) -> Vec<u8> {
        let mut packet = vec![MSG_REALTIME_UPDATE];
        packet.extend_from_slice(&1u16.to_le_bytes());
        packet.extend_from_slice(&2u16.to_le_bytes());
        packet.push(10);
        packet.push(5);
        packet.extend_from_slice(&session_time_ms.to_le_bytes());
        packet.extend_from_slice(&3_600_000.0f32.to_le_bytes());
        packet.extend_from_slice(&0i32.to_le_bytes());
        push_string(&mut packet, "Onboard");
        push_string(&mut packet, "Onboard0");
        push_string(&mut packet, "Basic HUD");
        packet.push(0);
        packet.extend_from_slice(&50_400_000.0f32.to_le_bytes());
        packet.push(24);
        packet.push(31);
        packet.push(3);
        packet.push(2);
        packet.push(1);
        push_lap(&mut packet, 107_250, &[35_000, 38_000, 34_250]);
        packet
    }

    /// Car update in fourth gear at 180 km/h, P3 on lap 12.
    pub fn car_update(car_index: u16, laps: u16) -> Vec<u8> {
        let mut packet = vec![MSG_REALTIME_CAR_UPDATE];
        packet.extend_from_slice(&car_index.to_le_bytes());
        packet.extend_from_slice(&0u16.to_le_bytes());
        packet.push(1);
        packet.push(6);
        packet.extend_from_slice(&100.0f32.to_le_bytes());
        packet.extend_from_slice(&200.0f32.to_le_bytes());
        packet.extend_from_slice(&0.25f32.to_le_bytes());
        packet.push(1);
        packet.extend_from_slice(&180u16.to_le_bytes());
        packet.extend_from_slice(&3u16.to_le_bytes());
        packet.extend_from_slice(&2u16.to_le_bytes());
        packet.extend_from_slice(&3u16.to_le_bytes());
        packet.extend_from_slice(&0.5f32.to_le_bytes());
        packet.extend_from_slice(&laps.to_le_bytes());
        packet.extend_from_slice(&(-120i32).to_le_bytes());
        push_lap(&mut packet, 107_250, &[35_000, 38_000, 34_250]);
        push_lap(&mut packet, 108_004, &[35_100, 38_404, 34_500]);
        push_lap(&mut packet, 41_120, &[]);
        packet
    }

    pub fn track_data(connection_id: i32, name: &str, meters: i32) -> Vec<u8> {
        let mut packet = vec![MSG_TRACK_DATA];
        packet.extend_from_slice(&connection_id.to_le_bytes());
        push_string(&mut packet, name);
        packet.extend_from_slice(&7i32.to_le_bytes());
        packet.extend_from_slice(&meters.to_le_bytes());
        packet.push(1);
        push_string(&mut packet, "Onboard");
        packet.push(2);
        push_string(&mut packet, "Onboard0");
        push_string(&mut packet, "Onboard1");
        packet.push(1);
        push_string(&mut packet, "Basic HUD");
        packet
    }

    pub fn entry_list(connection_id: i32, car_indices: &[u16]) -> Vec<u8> {
        let mut packet = vec![MSG_ENTRY_LIST];
        packet.extend_from_slice(&connection_id.to_le_bytes());
        packet.extend_from_slice(&u16::try_from(car_indices.len()).unwrap_or(u16::MAX).to_le_bytes());
        for index in car_indices {
            packet.extend_from_slice(&index.to_le_bytes());
        }
        packet
    }

    pub fn entry_list_car(car_index: u16, model: u8, team: &str) -> Vec<u8> {
        let mut packet = vec![MSG_ENTRY_LIST_CAR];
        packet.extend_from_slice(&car_index.to_le_bytes());
        packet.push(model);
        push_string(&mut packet, team);
        packet.extend_from_slice(&88i32.to_le_bytes());
        packet.push(0);
        packet.push(0);
        packet.extend_from_slice(&5u16.to_le_bytes());
        packet.push(1);
        push_string(&mut packet, "Kim");
        push_string(&mut packet, "Laine");
        push_string(&mut packet, "LAI");
        packet.push(2);
        packet.extend_from_slice(&5u16.to_le_bytes());
        packet
    }

    pub fn broadcasting_event(kind: u8, message: &str) -> Vec<u8> {
        let mut packet = vec![MSG_BROADCASTING_EVENT];
        packet.push(kind);
        push_string(&mut packet, message);
        packet.extend_from_slice(&61_000i32.to_le_bytes());
        packet.extend_from_slice(&0i32.to_le_bytes());
        packet
    }
}
