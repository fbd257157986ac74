//! DTM packet framing, sequencing, the nine-stage exchange, and the
//! post-handshake record layer — sans-IO.
//!
//! This crate handles:
//! * Fixed-layout packet framing and random-pad message wrapping
//! * The nine-stage post-quantum key exchange state machine
//! * Post-handshake encrypt/decrypt, resync, and byte accounting
//! * Sequencing, buffering, and routing of inbound/outbound packets
//! * Keepalive liveness tracking and the application callback surface
//!
//! It is intentionally transport-agnostic: bring your own byte stream.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod buffer;
pub mod callbacks;
pub mod dispatch;
pub mod error;
pub mod exchange;
pub mod header;
pub mod identity;
pub mod keepalive;
pub mod params;
pub mod record;
pub mod resync;
pub mod session;
pub mod wrapper;

pub use callbacks::Callbacks;
pub use dispatch::{DispatchAction, OutboundBuffer, TransportDispatcher};
pub use error::{ErrorKind, ErrorSeverity, SessionError};
pub use exchange::{ExchangeStateMachine, Role};
pub use header::{ExchangeFlag, MessageFlag, PacketHeader, PacketType, ServiceFlag, TransferFlag};
pub use identity::DtmIdentity;
pub use keepalive::{KeepAliveAction, KeepAliveTracker};
pub use params::{DtmSession, ParameterOid, ParameterSet, Profile};
pub use record::RecordLayer;
pub use session::SessionState;
