//! Typed packet payloads
//!
//! A [`Packet`] pairs a validated [`PacketHeader`] with a [`PacketBody`], a
//! closed enum over every payload the listener understands. Decoding a body
//! never looks past the payload slice the codec framed for it.

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use super::header::{HEADER_SIZE, PacketHeader, PacketKind};
use super::wire::{PayloadReader, padded_len};
use crate::{ListenerError, LogValue, Result, Timestamp};

/// Bank id marking events whose pixel could not be mapped upstream.
pub const UNMAPPED_BANK: u32 = 0xFFFF_FFFF;
/// Bank id marking events the detector electronics flagged as errors.
pub const ERROR_BANK: u32 = 0xFFFF_FFFE;

/// A decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub header: PacketHeader,
    pub body: PacketBody,
}

/// Payload of a decoded packet.
#[derive(Debug, Clone, PartialEq)]
pub enum PacketBody {
    Rtdl(RtdlPacket),
    BankedEvent(BankedEventPacket),
    BeamMonitor(BeamMonitorPacket),
    RunStatus(RunStatusPacket),
    ClientHello(ClientHelloPacket),
    Annotation(AnnotationPacket),
    Heartbeat,
    Geometry(GeometryPacket),
    BeamlineInfo(BeamlineInfoPacket),
    DeviceDescriptor(DeviceDescriptorPacket),
    VariableValue(VariableValuePacket),
    /// A well-framed packet of a type the listener does not handle
    Unknown { base_type: u32 },
}

/// Pulse reference ("real-time data link") information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtdlPacket {
    /// Pulse charge in units of 10 pC
    pub pulse_charge: u32,
    pub flavor: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankedEventPacket {
    /// Pulse charge in units of 10 pC
    pub pulse_charge: u32,
    pub pulse_energy: u32,
    pub cycle: u32,
    pub flags: u32,
    pub sources: Vec<SourceSection>,
}

impl BankedEventPacket {
    /// Total number of raw events, sentinel banks included.
    pub fn event_count(&self) -> usize {
        self.sources.iter().flat_map(|s| &s.banks).map(|b| b.events.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSection {
    pub source_id: u32,
    pub intrapulse_time: u32,
    pub tof_offset: u32,
    pub banks: Vec<Bank>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bank {
    pub bank_id: u32,
    pub events: Vec<RawEvent>,
}

impl Bank {
    /// Whether this bank is one of the reserved invalid-pixel banks.
    pub fn is_sentinel(&self) -> bool {
        self.bank_id == UNMAPPED_BANK || self.bank_id == ERROR_BANK
    }
}

/// Event as it appears on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawEvent {
    /// Time of flight in units of 100 ns
    pub tof: u32,
    pub pixel: u32,
}

impl RawEvent {
    /// Time of flight in microseconds.
    pub fn tof_micros(&self) -> f64 {
        self.tof as f64 / 10.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamMonitorPacket {
    pub pulse_charge: u32,
    pub pulse_energy: u32,
    pub cycle: u32,
    pub flags: u32,
    pub monitors: Vec<MonitorSection>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorSection {
    pub monitor_id: u32,
    pub source_id: u32,
    pub tof_offset: u32,
    pub events: Vec<MonitorEvent>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorEvent {
    /// Time of flight in units of 100 ns
    pub tof: u32,
    pub cycle: u16,
    pub trailing_edge: bool,
}

impl MonitorEvent {
    pub fn tof_micros(&self) -> f64 {
        self.tof as f64 / 10.0
    }
}

/// Run transition codes carried by run status packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatusCode {
    NoRun,
    State,
    NewRun,
    RunEof,
    RunBof,
    EndRun,
    Prologue,
    Other(u8),
}

impl RunStatusCode {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => RunStatusCode::NoRun,
            1 => RunStatusCode::State,
            2 => RunStatusCode::NewRun,
            3 => RunStatusCode::RunEof,
            4 => RunStatusCode::RunBof,
            5 => RunStatusCode::EndRun,
            6 => RunStatusCode::Prologue,
            other => RunStatusCode::Other(other),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            RunStatusCode::NoRun => 0,
            RunStatusCode::State => 1,
            RunStatusCode::NewRun => 2,
            RunStatusCode::RunEof => 3,
            RunStatusCode::RunBof => 4,
            RunStatusCode::EndRun => 5,
            RunStatusCode::Prologue => 6,
            RunStatusCode::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunStatusPacket {
    pub run_number: u32,
    pub run_start: Timestamp,
    pub status: RunStatusCode,
    pub file_number: u32,
}

/// Handshake sent by the client when it starts streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientHelloPacket {
    /// Requested start of data; only whole seconds travel on the wire
    pub start_time: Timestamp,
}

impl ClientHelloPacket {
    pub fn new(start_time: Timestamp) -> Self {
        Self { start_time }
    }

    /// Encode a complete hello packet stamped with `now`.
    pub fn encode(&self, now: Timestamp) -> Bytes {
        let header = PacketHeader::new(PacketKind::ClientHello, 4, now);
        let mut buf = BytesMut::with_capacity(HEADER_SIZE + 4);
        buf.put_slice(&header.encode());
        buf.put_u32_le(self.start_time.seconds);
        buf.freeze()
    }
}

/// Annotation marker types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MarkerType {
    Generic,
    ScanStart,
    ScanStop,
    Pause,
    Resume,
    OverallRunComment,
    Other(u8),
}

impl MarkerType {
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0 => MarkerType::Generic,
            1 => MarkerType::ScanStart,
            2 => MarkerType::ScanStop,
            3 => MarkerType::Pause,
            4 => MarkerType::Resume,
            5 => MarkerType::OverallRunComment,
            other => MarkerType::Other(other),
        }
    }

    pub fn to_raw(self) -> u8 {
        match self {
            MarkerType::Generic => 0,
            MarkerType::ScanStart => 1,
            MarkerType::ScanStop => 2,
            MarkerType::Pause => 3,
            MarkerType::Resume => 4,
            MarkerType::OverallRunComment => 5,
            MarkerType::Other(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationPacket {
    pub marker: MarkerType,
    pub reset_hint: bool,
    pub scan_index: u32,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeometryPacket {
    pub xml: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeamlineInfoPacket {
    pub target_station: u8,
    pub id: String,
    pub short_name: String,
    pub long_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceDescriptorPacket {
    pub device_id: u32,
    pub xml: String,
}

/// A process-variable update.
#[derive(Debug, Clone, PartialEq)]
pub struct VariableValuePacket {
    pub device_id: u32,
    pub variable_id: u32,
    pub status: u16,
    pub severity: u16,
    pub value: LogValue,
}

impl VariableValuePacket {
    pub fn key(&self) -> (u32, u32) {
        (self.device_id, self.variable_id)
    }
}

impl Packet {
    /// Decode the payload framed by `header`.
    ///
    /// `payload` must be exactly `header.payload_len` bytes.
    pub fn decode(header: PacketHeader, payload: &[u8]) -> Result<Self> {
        if payload.len() != header.payload_len as usize {
            return Err(ListenerError::framing(
                Some(header.packet_type),
                format!(
                    "Payload slice of {} bytes does not match declared length {}",
                    payload.len(),
                    header.payload_len
                ),
            ));
        }

        let kind = header.kind();
        let body = match kind {
            PacketKind::Rtdl => PacketBody::Rtdl(decode_rtdl(payload)?),
            PacketKind::BankedEvent => PacketBody::BankedEvent(decode_banked_event(payload)?),
            PacketKind::BeamMonitor => PacketBody::BeamMonitor(decode_beam_monitor(payload)?),
            PacketKind::RunStatus => PacketBody::RunStatus(decode_run_status(payload)?),
            PacketKind::ClientHello => {
                let mut reader = PayloadReader::new(payload, "Client hello");
                PacketBody::ClientHello(ClientHelloPacket {
                    start_time: Timestamp::new(reader.read_u32()?, 0),
                })
            }
            PacketKind::StreamAnnotation => PacketBody::Annotation(decode_annotation(payload)?),
            PacketKind::Heartbeat => PacketBody::Heartbeat,
            PacketKind::Geometry => PacketBody::Geometry(decode_geometry(payload)?),
            PacketKind::BeamlineInfo => PacketBody::BeamlineInfo(decode_beamline_info(payload)?),
            PacketKind::DeviceDescriptor => {
                PacketBody::DeviceDescriptor(decode_device_descriptor(payload)?)
            }
            PacketKind::VariableU32 | PacketKind::VariableDouble | PacketKind::VariableString => {
                PacketBody::VariableValue(decode_variable(kind, payload)?)
            }
            PacketKind::Unknown(base_type) => PacketBody::Unknown { base_type },
        };

        trace!(kind = ?kind, payload_len = header.payload_len, "Decoded packet");
        Ok(Packet { header, body })
    }
}

fn decode_rtdl(payload: &[u8]) -> Result<RtdlPacket> {
    let mut reader = PayloadReader::new(payload, "RTDL packet");
    let word = reader.read_u32()?;
    Ok(RtdlPacket { pulse_charge: word & 0x00FF_FFFF, flavor: ((word >> 24) & 0x7) as u8 })
}

fn decode_banked_event(payload: &[u8]) -> Result<BankedEventPacket> {
    let mut reader = PayloadReader::new(payload, "Banked event packet");
    let pulse_charge = reader.read_u32()?;
    let pulse_energy = reader.read_u32()?;
    let cycle = reader.read_u32()?;
    let flags = reader.read_u32()?;

    let mut sources = Vec::new();
    while !reader.is_empty() {
        let source_id = reader.read_u32()?;
        let intrapulse_time = reader.read_u32()?;
        let tof_offset = reader.read_u32()?;
        let bank_count = reader.read_u32()? as usize;
        reader.require_items(bank_count, 8, "Bank")?;

        let mut banks = Vec::with_capacity(bank_count);
        for _ in 0..bank_count {
            let bank_id = reader.read_u32()?;
            let event_count = reader.read_u32()? as usize;
            reader.require_items(event_count, 8, "Event")?;

            let mut events = Vec::with_capacity(event_count);
            for _ in 0..event_count {
                let tof = reader.read_u32()?;
                let pixel = reader.read_u32()?;
                events.push(RawEvent { tof, pixel });
            }
            banks.push(Bank { bank_id, events });
        }
        sources.push(SourceSection { source_id, intrapulse_time, tof_offset, banks });
    }

    Ok(BankedEventPacket { pulse_charge, pulse_energy, cycle, flags, sources })
}

fn decode_beam_monitor(payload: &[u8]) -> Result<BeamMonitorPacket> {
    let mut reader = PayloadReader::new(payload, "Beam monitor packet");
    let pulse_charge = reader.read_u32()?;
    let pulse_energy = reader.read_u32()?;
    let cycle = reader.read_u32()?;
    let flags = reader.read_u32()?;

    let mut monitors = Vec::new();
    while !reader.is_empty() {
        let word = reader.read_u32()?;
        let monitor_id = word >> 22;
        let event_count = (word & 0x003F_FFFF) as usize;
        let source_id = reader.read_u32()?;
        let tof_offset = reader.read_u32()?;
        reader.require_items(event_count, 4, "Monitor event")?;

        let mut events = Vec::with_capacity(event_count);
        for _ in 0..event_count {
            let raw = reader.read_u32()?;
            events.push(MonitorEvent {
                tof: raw & 0x001F_FFFF,
                cycle: ((raw >> 21) & 0x3FF) as u16,
                trailing_edge: raw & 0x8000_0000 != 0,
            });
        }
        monitors.push(MonitorSection { monitor_id, source_id, tof_offset, events });
    }

    Ok(BeamMonitorPacket { pulse_charge, pulse_energy, cycle, flags, monitors })
}

fn decode_run_status(payload: &[u8]) -> Result<RunStatusPacket> {
    let mut reader = PayloadReader::new(payload, "Run status packet");
    let run_number = reader.read_u32()?;
    let run_start = Timestamp::new(reader.read_u32()?, 0);
    let word = reader.read_u32()?;
    Ok(RunStatusPacket {
        run_number,
        run_start,
        status: RunStatusCode::from_raw((word >> 24) as u8),
        file_number: word & 0x00FF_FFFF,
    })
}

fn decode_annotation(payload: &[u8]) -> Result<AnnotationPacket> {
    let mut reader = PayloadReader::new(payload, "Stream annotation packet");
    let word = reader.read_u32()?;
    let scan_index = reader.read_u32()?;
    let comment_len = (word & 0xFFFF) as usize;
    let comment = reader.read_padded_string(comment_len)?;
    Ok(AnnotationPacket {
        marker: MarkerType::from_raw(((word >> 16) & 0xFF) as u8),
        reset_hint: word & 0x8000_0000 != 0,
        scan_index,
        comment,
    })
}

fn decode_geometry(payload: &[u8]) -> Result<GeometryPacket> {
    let mut reader = PayloadReader::new(payload, "Geometry packet");
    let len = reader.read_u32()? as usize;
    Ok(GeometryPacket { xml: reader.read_padded_string(len)? })
}

fn decode_beamline_info(payload: &[u8]) -> Result<BeamlineInfoPacket> {
    let mut reader = PayloadReader::new(payload, "Beamline info packet");
    let word = reader.read_u32()?;
    let id_len = ((word >> 16) & 0xFF) as usize;
    let short_len = ((word >> 8) & 0xFF) as usize;
    let long_len = (word & 0xFF) as usize;

    let total = id_len + short_len + long_len;
    let text = reader.read_bytes(padded_len(total))?;
    let take = |from: usize, len: usize| String::from_utf8_lossy(&text[from..from + len]).into_owned();

    Ok(BeamlineInfoPacket {
        target_station: (word >> 24) as u8,
        id: take(0, id_len),
        short_name: take(id_len, short_len),
        long_name: take(id_len + short_len, long_len),
    })
}

fn decode_device_descriptor(payload: &[u8]) -> Result<DeviceDescriptorPacket> {
    let mut reader = PayloadReader::new(payload, "Device descriptor packet");
    let device_id = reader.read_u32()?;
    let len = reader.read_u32()? as usize;
    Ok(DeviceDescriptorPacket { device_id, xml: reader.read_padded_string(len)? })
}

fn decode_variable(kind: PacketKind, payload: &[u8]) -> Result<VariableValuePacket> {
    let mut reader = PayloadReader::new(payload, "Variable value packet");
    let device_id = reader.read_u32()?;
    let variable_id = reader.read_u32()?;
    let status_word = reader.read_u32()?;

    let value = match kind {
        PacketKind::VariableU32 => LogValue::Int(reader.read_u32()? as i64),
        PacketKind::VariableDouble => LogValue::Double(reader.read_f64()?),
        _ => {
            let len = reader.read_u32()? as usize;
            LogValue::String(reader.read_padded_string(len)?)
        }
    };

    Ok(VariableValuePacket {
        device_id,
        variable_id,
        status: (status_word >> 16) as u16,
        severity: (status_word & 0xFFFF) as u16,
        value,
    })
}
