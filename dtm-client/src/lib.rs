//! Async orchestration over `dtm-proto`'s sans-IO session state.
//!
//! This crate handles:
//! * Driving the nine-stage handshake and post-handshake record layer over
//!   a real TCP socket
//! * The transmission mutex, throttle ladder, and reconnect-with-resync flow
//! * The file-transfer sidechannel's listener/connector plumbing
//!
//! `dtm-proto` never touches a socket; this crate is where bytes actually
//! move.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod connection;
pub mod file_transfer;
pub mod reconnect;
pub mod throttle;
pub mod transport;

pub use connection::{ClientConfig, Connection};
pub use file_transfer::{FileInfo, FileRole, ProgressHook, TransferEvent};
pub use reconnect::ReconnectStrategy;
pub use transport::DtmTransport;
