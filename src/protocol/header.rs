//! ADARA packet header parsing and validation
//!
//! Every packet starts with a fixed 16-byte little-endian header:
//!
//! | offset | field |
//! |---|---|
//! | 0 | payload length in bytes (multiple of 4) |
//! | 4 | packet type: `(base type << 8) \| version` |
//! | 8 | pulse seconds since the EPICS epoch |
//! | 12 | pulse nanoseconds |
//!
//! Header validation is the framing check for the whole stream: a header that
//! fails it means every following byte boundary is suspect, so the error is fatal.

use tracing::trace;

use super::wire::read_u32_at;
use crate::{ListenerError, Result, Timestamp};

/// Size of the fixed packet header in bytes.
pub const HEADER_SIZE: usize = 16;

/// Largest payload the codec accepts before declaring the stream corrupt.
pub const MAX_PAYLOAD_SIZE: u32 = 8 * 1024 * 1024;

/// Size constraint a packet kind places on its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadSize {
    Exact(u32),
    AtLeast(u32),
}

impl PayloadSize {
    fn admits(self, len: u32) -> bool {
        match self {
            PayloadSize::Exact(n) => len == n,
            PayloadSize::AtLeast(n) => len >= n,
        }
    }
}

/// Packet kinds understood by the listener, keyed by base type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketKind {
    Rtdl,
    BankedEvent,
    BeamMonitor,
    RunStatus,
    ClientHello,
    StreamAnnotation,
    Heartbeat,
    Geometry,
    BeamlineInfo,
    DeviceDescriptor,
    VariableU32,
    VariableDouble,
    VariableString,
    Unknown(u32),
}

impl PacketKind {
    pub const fn from_base_type(base: u32) -> Self {
        match base {
            0x0001 => PacketKind::Rtdl,
            0x4000 => PacketKind::BankedEvent,
            0x4001 => PacketKind::BeamMonitor,
            0x4003 => PacketKind::RunStatus,
            0x4006 => PacketKind::ClientHello,
            0x4007 => PacketKind::StreamAnnotation,
            0x4009 => PacketKind::Heartbeat,
            0x400A => PacketKind::Geometry,
            0x400B => PacketKind::BeamlineInfo,
            0x8000 => PacketKind::DeviceDescriptor,
            0x8001 => PacketKind::VariableU32,
            0x8002 => PacketKind::VariableDouble,
            0x8003 => PacketKind::VariableString,
            other => PacketKind::Unknown(other),
        }
    }

    pub const fn base_type(self) -> u32 {
        match self {
            PacketKind::Rtdl => 0x0001,
            PacketKind::BankedEvent => 0x4000,
            PacketKind::BeamMonitor => 0x4001,
            PacketKind::RunStatus => 0x4003,
            PacketKind::ClientHello => 0x4006,
            PacketKind::StreamAnnotation => 0x4007,
            PacketKind::Heartbeat => 0x4009,
            PacketKind::Geometry => 0x400A,
            PacketKind::BeamlineInfo => 0x400B,
            PacketKind::DeviceDescriptor => 0x8000,
            PacketKind::VariableU32 => 0x8001,
            PacketKind::VariableDouble => 0x8002,
            PacketKind::VariableString => 0x8003,
            PacketKind::Unknown(base) => base,
        }
    }

    /// Full packet type code for this kind at protocol version 0.
    pub const fn packet_type(self) -> u32 {
        self.base_type() << 8
    }

    /// Payload size constraint, or `None` for kinds the listener does not decode.
    pub const fn payload_size(self) -> Option<PayloadSize> {
        match self {
            PacketKind::Rtdl => Some(PayloadSize::Exact(120)),
            PacketKind::BankedEvent => Some(PayloadSize::AtLeast(16)),
            PacketKind::BeamMonitor => Some(PayloadSize::AtLeast(16)),
            PacketKind::RunStatus => Some(PayloadSize::Exact(12)),
            PacketKind::ClientHello => Some(PayloadSize::Exact(4)),
            PacketKind::StreamAnnotation => Some(PayloadSize::AtLeast(8)),
            PacketKind::Heartbeat => Some(PayloadSize::Exact(0)),
            PacketKind::Geometry => Some(PayloadSize::AtLeast(4)),
            PacketKind::BeamlineInfo => Some(PayloadSize::AtLeast(4)),
            PacketKind::DeviceDescriptor => Some(PayloadSize::AtLeast(8)),
            PacketKind::VariableU32 => Some(PayloadSize::Exact(16)),
            PacketKind::VariableDouble => Some(PayloadSize::Exact(20)),
            PacketKind::VariableString => Some(PayloadSize::AtLeast(16)),
            PacketKind::Unknown(_) => None,
        }
    }
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Payload length in bytes, excluding the header
    pub payload_len: u32,
    /// Raw packet type code
    pub packet_type: u32,
    /// Pulse (or sample) time
    pub timestamp: Timestamp,
}

impl PacketHeader {
    pub fn new(kind: PacketKind, payload_len: u32, timestamp: Timestamp) -> Self {
        Self { payload_len, packet_type: kind.packet_type(), timestamp }
    }

    /// Parse and validate a header from the first [`HEADER_SIZE`] bytes of `data`.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(ListenerError::parse(
                "Packet header",
                format!("Need {} bytes, have {}", HEADER_SIZE, data.len()),
            ));
        }

        let header = Self {
            payload_len: read_u32_at(data, 0, "Packet header")?,
            packet_type: read_u32_at(data, 4, "Packet header")?,
            timestamp: Timestamp::new(
                read_u32_at(data, 8, "Packet header")?,
                read_u32_at(data, 12, "Packet header")?,
            ),
        };

        trace!(
            payload_len = header.payload_len,
            packet_type = header.packet_type,
            seconds = header.timestamp.seconds,
            nanoseconds = header.timestamp.nanoseconds,
            "Parsed packet header"
        );

        header.validate()?;
        Ok(header)
    }

    /// Validate framing rules for this header.
    pub fn validate(&self) -> Result<()> {
        if self.payload_len % 4 != 0 {
            return Err(ListenerError::framing(
                Some(self.packet_type),
                format!("Payload length {} is not a multiple of 4", self.payload_len),
            ));
        }

        if self.payload_len > MAX_PAYLOAD_SIZE {
            return Err(ListenerError::framing(
                Some(self.packet_type),
                format!(
                    "Payload length {} exceeds maximum {}",
                    self.payload_len, MAX_PAYLOAD_SIZE
                ),
            ));
        }

        if self.timestamp.nanoseconds >= 1_000_000_000 {
            return Err(ListenerError::framing(
                Some(self.packet_type),
                format!("Nanosecond field {} out of range", self.timestamp.nanoseconds),
            ));
        }

        let kind = self.kind();
        match kind.payload_size() {
            Some(size) if !size.admits(self.payload_len) => {
                return Err(ListenerError::framing(
                    Some(self.packet_type),
                    format!(
                        "{:?} packet payload length {} violates {:?}",
                        kind, self.payload_len, size
                    ),
                ));
            }
            _ => {}
        }

        Ok(())
    }

    pub fn base_type(&self) -> u32 {
        self.packet_type >> 8
    }

    pub fn version(&self) -> u8 {
        (self.packet_type & 0xFF) as u8
    }

    pub fn kind(&self) -> PacketKind {
        PacketKind::from_base_type(self.base_type())
    }

    /// Total encoded size of the packet this header frames.
    pub fn packet_len(&self) -> usize {
        HEADER_SIZE + self.payload_len as usize
    }

    /// Encode the header in wire format.
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.payload_len.to_le_bytes());
        out[4..8].copy_from_slice(&self.packet_type.to_le_bytes());
        out[8..12].copy_from_slice(&self.timestamp.seconds.to_le_bytes());
        out[12..16].copy_from_slice(&self.timestamp.nanoseconds.to_le_bytes());
        out
    }
}
