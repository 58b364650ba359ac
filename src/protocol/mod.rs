//! ADARA wire protocol: header framing, typed payloads and the streaming codec.

pub mod codec;
pub mod header;
pub mod packets;
pub mod wire;

pub use codec::PacketCodec;
pub use header::{HEADER_SIZE, MAX_PAYLOAD_SIZE, PacketHeader, PacketKind, PayloadSize};
pub use packets::{
    AnnotationPacket, Bank, BankedEventPacket, BeamMonitorPacket, BeamlineInfoPacket,
    ClientHelloPacket, DeviceDescriptorPacket, ERROR_BANK, GeometryPacket, MarkerType,
    MonitorEvent, MonitorSection, Packet, PacketBody, RawEvent, RtdlPacket, RunStatusCode,
    RunStatusPacket, SourceSection, UNMAPPED_BANK, VariableValuePacket,
};
