//! Fixed-layout packet framing.
//!
//! `PacketHeader` is `{packet_type:u8, packet_flag:u16, sequence:u64,
//! payload_length:u32, option_flag:u64}`, little-endian, 23 bytes total.
//! `payload_length` could in principle be widened to 8 bytes as long as both
//! peers agree; this implementation fixes it at 4 bytes (payloads are
//! bounded well under `u32::MAX` by `MAX_RECV_BUFFER`, see [`crate::dispatch`]).
//!
//! Grounded on `layer-mtproto/message.rs`'s `to_plaintext_bytes`: a small
//! fixed little-endian struct serialized by hand into a `Vec<u8>`.

/// Total on-wire size of a [`PacketHeader`].
pub const HEADER_LEN: usize = 1 + 2 + 8 + 4 + 8;

/// Top-level packet kind, selecting which subsystem routes the packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PacketType {
    /// Drives the nine-stage [`crate::exchange::ExchangeStateMachine`].
    Exchange = 1,
    /// Carries application payload through the [`crate::record::RecordLayer`].
    Message = 2,
    /// Internal control traffic: keepalive, echo, resend, resync, errors.
    Service = 3,
    /// Drives the [`crate::transfer`] sidechannel.
    Transfer = 4,
}

impl PacketType {
    /// Decode a raw wire byte.
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Exchange),
            2 => Some(Self::Message),
            3 => Some(Self::Service),
            4 => Some(Self::Transfer),
            _ => None,
        }
    }
}

/// Errors parsing a [`PacketHeader`] off the wire.
#[derive(Clone, Debug, PartialEq)]
pub enum HeaderError {
    /// Fewer than [`HEADER_LEN`] bytes were available.
    TooShort { got: usize },
    /// Byte 0 did not match any known [`PacketType`].
    UnknownPacketType(u8),
}

impl std::fmt::Display for HeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShort { got } => write!(f, "header needs {HEADER_LEN} bytes, got {got}"),
            Self::UnknownPacketType(v) => write!(f, "unknown packet_type byte {v}"),
        }
    }
}
impl std::error::Error for HeaderError {}

/// A parsed, fixed-layout packet header.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PacketHeader {
    /// Routing discriminant.
    pub packet_type: PacketType,
    /// Stage/subtype enum value, meaning depends on `packet_type`.
    pub packet_flag: u16,
    /// Monotonic per-direction counter.
    pub sequence: u64,
    /// Length in bytes of the payload that follows this header.
    pub payload_length: u32,
    /// Overloaded field: file id, `bytes_sent`, or an ack target sequence.
    pub option_flag: u64,
}

impl PacketHeader {
    /// Build a new header.
    pub fn new(packet_type: PacketType, packet_flag: u16, sequence: u64, payload_length: u32, option_flag: u64) -> Self {
        Self { packet_type, packet_flag, sequence, payload_length, option_flag }
    }

    /// Serialize to the fixed 23-byte wire layout.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0] = self.packet_type as u8;
        buf[1..3].copy_from_slice(&self.packet_flag.to_le_bytes());
        buf[3..11].copy_from_slice(&self.sequence.to_le_bytes());
        buf[11..15].copy_from_slice(&self.payload_length.to_le_bytes());
        buf[15..23].copy_from_slice(&self.option_flag.to_le_bytes());
        buf
    }

    /// Parse a header from the front of `bytes`. Does not consume `bytes`;
    /// callers slice past [`HEADER_LEN`] themselves.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        if bytes.len() < HEADER_LEN {
            return Err(HeaderError::TooShort { got: bytes.len() });
        }
        let packet_type = PacketType::from_u8(bytes[0]).ok_or(HeaderError::UnknownPacketType(bytes[0]))?;
        let packet_flag = u16::from_le_bytes(bytes[1..3].try_into().unwrap());
        let sequence = u64::from_le_bytes(bytes[3..11].try_into().unwrap());
        let payload_length = u32::from_le_bytes(bytes[11..15].try_into().unwrap());
        let option_flag = u64::from_le_bytes(bytes[15..23].try_into().unwrap());
        Ok(Self { packet_type, packet_flag, sequence, payload_length, option_flag })
    }
}

// ─── Flag enums ────────────────────────────────────────────────────────────

/// Exchange-stage flags.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum ExchangeFlag {
    Connect = 0,
    Init = 1,
    PreAuth = 2,
    AuthEx = 3,
    Auth = 4,
    Sync = 5,
    PrimeEx = 6,
    Primary = 7,
    Established = 8,
}

impl ExchangeFlag {
    /// All nine stages in handshake order.
    pub const ORDER: [ExchangeFlag; 9] = [
        Self::Connect,
        Self::Init,
        Self::PreAuth,
        Self::AuthEx,
        Self::Auth,
        Self::Sync,
        Self::PrimeEx,
        Self::Primary,
        Self::Established,
    ];

    /// Decode a raw `packet_flag` value.
    pub fn from_u16(v: u16) -> Option<Self> {
        Self::ORDER.into_iter().find(|f| *f as u16 == v)
    }
}

/// Service-packet subtypes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum ServiceFlag {
    KeepAlive = 0,
    Echo = 1,
    Resend = 2,
    DataLost = 3,
    Resync = 4,
    Refusal = 5,
    Terminate = 6,
}

impl ServiceFlag {
    /// Decode a raw `packet_flag` value.
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::KeepAlive),
            1 => Some(Self::Echo),
            2 => Some(Self::Resend),
            3 => Some(Self::DataLost),
            4 => Some(Self::Resync),
            5 => Some(Self::Refusal),
            6 => Some(Self::Terminate),
            _ => None,
        }
    }
}

/// Transfer-packet subtypes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum TransferFlag {
    Request = 0,
    Refused = 1,
    Received = 2,
}

impl TransferFlag {
    /// Decode a raw `packet_flag` value.
    pub fn from_u16(v: u16) -> Option<Self> {
        match v {
            0 => Some(Self::Request),
            1 => Some(Self::Refused),
            2 => Some(Self::Received),
            _ => None,
        }
    }
}

/// The sole Message-packet subtype (reserved value exists in the wire format
/// but nothing currently uses it).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum MessageFlag {
    Transmission = 0,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        let h = PacketHeader::new(PacketType::Message, MessageFlag::Transmission as u16, 12345, 99, 0xdead_beef_0000_0001);
        let bytes = h.to_bytes();
        assert_eq!(bytes.len(), HEADER_LEN);
        let back = PacketHeader::parse(&bytes).unwrap();
        assert_eq!(back, h);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(matches!(PacketHeader::parse(&[1, 2, 3]), Err(HeaderError::TooShort { .. })));
    }

    #[test]
    fn rejects_unknown_type() {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0] = 9;
        assert!(matches!(PacketHeader::parse(&bytes), Err(HeaderError::UnknownPacketType(9))));
    }

    #[test]
    fn exchange_flag_order_roundtrips() {
        for (i, f) in ExchangeFlag::ORDER.iter().enumerate() {
            assert_eq!(ExchangeFlag::from_u16(*f as u16), Some(*f));
            assert_eq!(*f as u16, i as u16);
        }
    }
}
