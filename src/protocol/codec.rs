//! Streaming packet codec
//!
//! Bytes arrive in arbitrary chunks from the socket. The codec accumulates them,
//! cuts complete packets off the front as soon as their whole payload is
//! present, and queues the decoded packets. The driver pops packets one at a
//! time so it can stop dispatching mid-chunk when reads are paused.

use bytes::BytesMut;
use std::collections::VecDeque;
use tracing::{debug, trace};

use super::header::{HEADER_SIZE, PacketHeader};
use super::packets::Packet;
use crate::Result;

/// Incremental decoder for an ADARA byte stream.
#[derive(Debug, Default)]
pub struct PacketCodec {
    buffer: BytesMut,
    ready: VecDeque<Packet>,
    packets_decoded: u64,
}

impl PacketCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `data` and decode every packet now complete.
    ///
    /// Returns the number of packets decoded by this call. A framing or payload
    /// error is fatal: the stream can no longer be split reliably.
    pub fn feed(&mut self, data: &[u8]) -> Result<usize> {
        self.buffer.extend_from_slice(data);

        let mut decoded = 0;
        while self.buffer.len() >= HEADER_SIZE {
            let header = PacketHeader::parse(&self.buffer[..HEADER_SIZE])?;
            let total = header.packet_len();
            if self.buffer.len() < total {
                trace!(
                    buffered = self.buffer.len(),
                    needed = total,
                    "Waiting for remainder of packet"
                );
                break;
            }

            let frame = self.buffer.split_to(total);
            let packet = Packet::decode(header, &frame[HEADER_SIZE..])?;
            self.ready.push_back(packet);
            decoded += 1;
        }

        self.packets_decoded += decoded as u64;
        if decoded > 0 {
            debug!(decoded, pending = self.ready.len(), "Decoded packets from chunk");
        }
        Ok(decoded)
    }

    /// Next decoded packet, in stream order.
    pub fn pop(&mut self) -> Option<Packet> {
        self.ready.pop_front()
    }

    pub fn has_pending(&self) -> bool {
        !self.ready.is_empty()
    }

    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    /// Bytes held back waiting for the rest of a packet.
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len()
    }

    pub fn packets_decoded(&self) -> u64 {
        self.packets_decoded
    }

    /// Drain every queued packet.
    pub fn drain(&mut self) -> impl Iterator<Item = Packet> + '_ {
        self.ready.drain(..)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketBody;
    use crate::test_utils::packets;
    use crate::{ListenerError, Timestamp};
    use proptest::prelude::*;

    fn sample_stream() -> Vec<u8> {
        let ts = Timestamp::new(50, 0);
        let mut stream = Vec::new();
        stream.extend_from_slice(&packets::heartbeat(ts));
        stream.extend_from_slice(&packets::rtdl(ts, 12));
        stream.extend_from_slice(&packets::banked_events(ts, 12, &[(1, &[(10, 1), (20, 2)])]));
        stream.extend_from_slice(&packets::variable_double(ts, 1, 2, 3.5));
        stream.extend_from_slice(&packets::geometry(ts, "<instrument name=\"X\"/>"));
        stream
    }

    #[test]
    fn whole_stream_decodes_in_one_feed() {
        let mut codec = PacketCodec::new();
        let count = codec.feed(&sample_stream()).expect("valid stream");
        assert_eq!(count, 5);
        assert_eq!(codec.buffered_bytes(), 0);
        assert!(matches!(codec.pop().map(|p| p.body), Some(PacketBody::Heartbeat)));
        assert_eq!(codec.pending(), 4);
    }

    #[test]
    fn partial_packet_is_held_until_complete() {
        let frame = packets::rtdl(Timestamp::new(1, 1), 3);
        let mut codec = PacketCodec::new();

        assert_eq!(codec.feed(&frame[..10]).unwrap(), 0);
        assert_eq!(codec.feed(&frame[10..40]).unwrap(), 0);
        assert!(!codec.has_pending());
        assert_eq!(codec.feed(&frame[40..]).unwrap(), 1);
        assert!(codec.has_pending());
    }

    #[test]
    fn bad_framing_is_fatal() {
        let mut frame = packets::heartbeat(Timestamp::ZERO).to_vec();
        frame[0] = 3;
        let mut codec = PacketCodec::new();
        assert!(matches!(codec.feed(&frame), Err(ListenerError::Framing { .. })));
    }

    proptest! {
        #[test]
        fn chunking_never_changes_decoded_packets(split_points in prop::collection::vec(0usize..400, 0..12)) {
            let stream = sample_stream();
            let mut reference = PacketCodec::new();
            reference.feed(&stream).unwrap();
            let expected: Vec<Packet> = reference.drain().collect();

            let mut points: Vec<usize> = split_points.into_iter().map(|p| p % (stream.len() + 1)).collect();
            points.sort_unstable();
            points.push(stream.len());

            let mut codec = PacketCodec::new();
            let mut start = 0;
            let mut total = 0;
            for end in points {
                total += codec.feed(&stream[start..end]).unwrap();
                start = end;
            }

            let actual: Vec<Packet> = codec.drain().collect();
            prop_assert_eq!(total, expected.len());
            prop_assert_eq!(actual, expected);
        }
    }
}
