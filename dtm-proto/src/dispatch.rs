//! `TransportDispatcher` — frames outbound packets, parses and routes
//! inbound ones.
//!
//! Grounded on `layer-mtproto/transport.rs`'s `AbridgedTransport` framing
//! loop, generalized from a single length-prefixed message kind to the
//! fixed [`PacketHeader`] and routing-by-`packet_type`. This module is
//! sans-IO: it turns raw bytes into [`DispatchAction`]s and structured
//! frames, but never touches a socket — `dtm-client::transport` drives the
//! actual reads/writes.

use crate::buffer::PacketBuffer;
use crate::header::{ExchangeFlag, HeaderError, PacketHeader, PacketType, ServiceFlag, TransferFlag, HEADER_LEN};

/// Payloads larger than this are rejected outright as a resource-budget guard.
pub const MAX_RECV_BUFFER: u32 = 240 * 1024 * 1024;
/// Sequence gap beyond which an eager `Resend` is requested.
pub const DEFAULT_RESEND_THRESHOLD: u64 = 10;

/// One fully-parsed inbound packet, or a corrective request the caller must
/// act on by emitting a `Service/Resend` packet.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchAction {
    /// Routes to [`crate::exchange::ExchangeStateMachine`].
    Exchange { flag: ExchangeFlag, sequence: u64, payload: Vec<u8> },
    /// Routes to [`crate::record::RecordLayer`].
    Message { sequence: u64, payload: Vec<u8> },
    /// Internal control traffic (keepalive, echo, resend, resync, errors).
    Service { flag: ServiceFlag, sequence: u64, option_flag: u64, payload: Vec<u8> },
    /// Routes to the file-transfer sidechannel.
    Transfer { flag: TransferFlag, sequence: u64, option_flag: u64, payload: Vec<u8> },
    /// Emit `Service/Resend` for `sequence`: framing was malformed, a
    /// payload exceeded [`MAX_RECV_BUFFER`], an unrecognized flag was seen,
    /// or the sequence gap exceeded the resend threshold.
    RequestResend { sequence: u64 },
}

/// Reassembles an inbound byte stream into ordered [`DispatchAction`]s.
///
/// Owns the receive buffer and `rcv_sequence` — this type is meant to live
/// exclusively on whichever task reads from the socket.
pub struct TransportDispatcher {
    recv_buffer: PacketBuffer,
    rcv_sequence: u64,
    seq_counter: u64,
    resend_threshold: u64,
    max_recv_buffer: u32,
}

impl TransportDispatcher {
    /// A dispatcher with the default buffer capacity, resend threshold, and
    /// payload ceiling.
    pub fn new() -> Self {
        Self::with_capacity(crate::buffer::DEFAULT_CAPACITY)
    }

    /// A dispatcher with an explicit receive-buffer capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            recv_buffer: PacketBuffer::new(capacity),
            rcv_sequence: 0,
            seq_counter: 0,
            resend_threshold: DEFAULT_RESEND_THRESHOLD,
            max_recv_buffer: MAX_RECV_BUFFER,
        }
    }

    /// The sequence number the drain loop is currently waiting on.
    pub fn rcv_sequence(&self) -> u64 {
        self.rcv_sequence
    }

    /// Drop every buffered inbound packet. Used by session teardown on
    /// cancellation or critical error.
    pub fn clear(&mut self) {
        self.recv_buffer.clear();
    }

    /// Parse as many complete packets out of `chunk` as it holds, buffering
    /// each by sequence. Stops and emits a single `RequestResend` at the
    /// first malformed header, oversized payload, or truncated packet; does
    /// not drain — call [`drain`](Self::drain) afterward to deliver
    /// in-order actions.
    pub fn ingest(&mut self, chunk: &[u8]) -> Vec<DispatchAction> {
        let mut actions = Vec::new();
        let mut offset = 0;

        while offset < chunk.len() {
            let remaining = &chunk[offset..];
            let header = match PacketHeader::parse(remaining) {
                Ok(h) => h,
                Err(HeaderError::TooShort { .. }) => break,
                Err(HeaderError::UnknownPacketType(_)) => {
                    actions.push(DispatchAction::RequestResend { sequence: self.rcv_sequence });
                    return actions;
                }
            };

            if header.payload_length > self.max_recv_buffer {
                actions.push(DispatchAction::RequestResend { sequence: self.rcv_sequence });
                return actions;
            }

            let total = HEADER_LEN + header.payload_length as usize;
            if total > remaining.len() {
                break;
            }

            let payload = &remaining[HEADER_LEN..total];
            let mut framed = header.to_bytes().to_vec();
            framed.extend_from_slice(payload);
            if header.sequence >= self.seq_counter {
                self.seq_counter = header.sequence + 1;
            }
            self.recv_buffer.push(header.sequence, framed);

            offset += total;
        }

        actions
    }

    /// Deliver every buffered packet starting at `rcv_sequence` while the
    /// run is unbroken, advancing `rcv_sequence` for each. If the next
    /// sequence is still missing and the gap against the highest observed
    /// sequence exceeds the resend threshold, appends one `RequestResend`.
    pub fn drain(&mut self) -> Vec<DispatchAction> {
        let mut actions = Vec::new();

        loop {
            let Some(bytes) = self.recv_buffer.pop(self.rcv_sequence) else { break };
            let header = PacketHeader::parse(&bytes).expect("buffered entries are always well-formed framed packets");
            let payload = bytes[HEADER_LEN..].to_vec();
            let action = self.to_action(header, payload).unwrap_or(DispatchAction::RequestResend { sequence: self.rcv_sequence });
            let was_resend = matches!(action, DispatchAction::RequestResend { .. });
            actions.push(action);
            self.rcv_sequence += 1;
            if was_resend {
                break;
            }
        }

        if !self.recv_buffer.exists(self.rcv_sequence) && self.seq_counter.saturating_sub(self.rcv_sequence) > self.resend_threshold {
            actions.push(DispatchAction::RequestResend { sequence: self.rcv_sequence });
        }

        actions
    }

    fn to_action(&self, header: PacketHeader, payload: Vec<u8>) -> Option<DispatchAction> {
        match header.packet_type {
            PacketType::Exchange => {
                let flag = ExchangeFlag::from_u16(header.packet_flag)?;
                Some(DispatchAction::Exchange { flag, sequence: header.sequence, payload })
            }
            PacketType::Message => Some(DispatchAction::Message { sequence: header.sequence, payload }),
            PacketType::Service => {
                let flag = ServiceFlag::from_u16(header.packet_flag)?;
                Some(DispatchAction::Service { flag, sequence: header.sequence, option_flag: header.option_flag, payload })
            }
            PacketType::Transfer => {
                let flag = TransferFlag::from_u16(header.packet_flag)?;
                Some(DispatchAction::Transfer { flag, sequence: header.sequence, option_flag: header.option_flag, payload })
            }
        }
    }
}

impl Default for TransportDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Frames outbound packets and retains non-Service ones for retransmit.
///
/// Owns the send buffer and `snd_sequence` — callers are expected to guard
/// one instance behind a single mutex (the transmission mutex).
pub struct OutboundBuffer {
    buffer: PacketBuffer,
    snd_sequence: u64,
}

impl OutboundBuffer {
    /// A buffer with the default capacity.
    pub fn new() -> Self {
        Self::with_capacity(crate::buffer::DEFAULT_CAPACITY)
    }

    /// A buffer with an explicit capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { buffer: PacketBuffer::new(capacity), snd_sequence: 0 }
    }

    /// The next sequence number that will be assigned.
    pub fn next_send_sequence(&self) -> u64 {
        self.snd_sequence
    }

    /// Frame `payload` with a fresh sequence number and, unless
    /// `packet_type` is `Service`, retain the framed bytes for retransmit.
    /// Returns the bytes ready to write to the transport.
    pub fn frame(&mut self, packet_type: PacketType, packet_flag: u16, option_flag: u64, payload: &[u8]) -> Vec<u8> {
        let sequence = self.snd_sequence;
        self.snd_sequence += 1;
        let header = PacketHeader::new(packet_type, packet_flag, sequence, payload.len() as u32, option_flag);
        let mut framed = header.to_bytes().to_vec();
        framed.extend_from_slice(payload);
        if packet_type != PacketType::Service {
            self.buffer.push(sequence, framed.clone());
        }
        framed
    }

    /// Free a buffered entry once its `Echo` arrives.
    pub fn acknowledge(&mut self, sequence: u64) {
        self.buffer.destroy(sequence);
    }

    /// The exact bytes originally sent under `sequence`, for replaying a
    /// `Resend` request as a byte-identical retransmission.
    pub fn replay(&self, sequence: u64) -> Option<&[u8]> {
        self.buffer.peek(sequence)
    }

    /// Number of unacknowledged outbound entries still buffered.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop every buffered outbound entry without waiting for an Echo or
    /// Resync. Used by session teardown on cancellation or critical error.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for OutboundBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::MessageFlag;

    #[test]
    fn frame_then_ingest_then_drain_roundtrips_a_message() {
        let mut out = OutboundBuffer::new();
        let framed = out.frame(PacketType::Message, MessageFlag::Transmission as u16, 0, b"payload");

        let mut dispatcher = TransportDispatcher::new();
        let immediate = dispatcher.ingest(&framed);
        assert!(immediate.is_empty());
        let delivered = dispatcher.drain();
        assert_eq!(delivered, vec![DispatchAction::Message { sequence: 0, payload: b"payload".to_vec() }]);
        assert_eq!(dispatcher.rcv_sequence(), 1);
    }

    #[test]
    fn service_packets_are_not_retained_for_retransmit() {
        let mut out = OutboundBuffer::new();
        out.frame(PacketType::Service, 0, 0, b"");
        assert_eq!(out.pending(), 0);
        assert_eq!(out.next_send_sequence(), 1);
    }

    #[test]
    fn echo_frees_the_matching_buffered_entry() {
        let mut out = OutboundBuffer::new();
        out.frame(PacketType::Message, MessageFlag::Transmission as u16, 0, b"a");
        out.frame(PacketType::Message, MessageFlag::Transmission as u16, 0, b"b");
        assert_eq!(out.pending(), 2);
        out.acknowledge(0);
        assert_eq!(out.pending(), 1);
        assert!(out.replay(0).is_none());
        assert_eq!(out.replay(1), Some(b"b".as_slice()));
    }

    #[test]
    fn oversized_payload_requests_resend_and_abandons_chunk() {
        let mut dispatcher = TransportDispatcher::new();
        let header = PacketHeader::new(PacketType::Message, MessageFlag::Transmission as u16, 0, MAX_RECV_BUFFER + 1, 0);
        let chunk = header.to_bytes();
        let actions = dispatcher.ingest(&chunk);
        assert_eq!(actions, vec![DispatchAction::RequestResend { sequence: 0 }]);
    }

    #[test]
    fn out_of_order_arrival_is_buffered_until_gap_fills() {
        let mut out = OutboundBuffer::new();
        let first = out.frame(PacketType::Message, MessageFlag::Transmission as u16, 0, b"a");
        let second = out.frame(PacketType::Message, MessageFlag::Transmission as u16, 0, b"b");

        let mut dispatcher = TransportDispatcher::new();
        dispatcher.ingest(&second);
        assert!(dispatcher.drain().is_empty());

        dispatcher.ingest(&first);
        let delivered = dispatcher.drain();
        assert_eq!(
            delivered,
            vec![
                DispatchAction::Message { sequence: 0, payload: b"a".to_vec() },
                DispatchAction::Message { sequence: 1, payload: b"b".to_vec() },
            ]
        );
    }

    #[test]
    fn gap_beyond_threshold_requests_resend() {
        let mut out = OutboundBuffer::new();
        let mut dispatcher = TransportDispatcher::new();
        for i in 0..=DEFAULT_RESEND_THRESHOLD + 1 {
            let framed = out.frame(PacketType::Message, MessageFlag::Transmission as u16, 0, b"x");
            if i != 0 {
                dispatcher.ingest(&framed);
            }
        }
        let actions = dispatcher.drain();
        assert_eq!(actions.last(), Some(&DispatchAction::RequestResend { sequence: 0 }));
    }
}
