//! # dtm — Deferred-Trust-Model key exchange
//!
//! `dtm` is a modular Rust implementation of the DTM post-quantum handshake.
//! It consists of three focused sub-crates wired together here for
//! convenience:
//!
//! | Sub-crate    | Role                                                |
//! |--------------|------------------------------------------------------|
//! | `dtm-crypto` | KEM/cipher/KDF primitives                             |
//! | `dtm-proto`  | Sans-IO framing, the nine-stage exchange, record layer |
//! | `dtm-client` | Async TCP orchestration, reconnect, file transfer      |
//!
//! ## Quick start
//!
//! ```rust,no_run
//! # async fn run() -> Result<(), dtm::SessionError> {
//! use dtm::{catalog, ConnectionBuilder};
//!
//! let conn = ConnectionBuilder::new(catalog::x41rnt1r1(), b"alice".to_vec(), b"alice-secret".to_vec())
//!     .on_data_received(|payload| println!("{} bytes", payload.len()))
//!     .connect("127.0.0.1:4433")
//!     .await?;
//! conn.send(b"hello").await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

/// Re-export of [`dtm_crypto`] — KEM variants, the AES-256-CTR cipher, HKDF.
pub use dtm_crypto as crypto;

/// Re-export of [`dtm_proto`] — framing, the nine-stage exchange, the record layer.
pub use dtm_proto as proto;

/// Re-export of [`dtm_client`] — the async TCP driver, reconnect, file transfer.
pub use dtm_client as client;

// ─── Convenience re-exports ─────────────────────────────────────────────────

pub use dtm_client::{ClientConfig, Connection, ReconnectStrategy};
pub use dtm_proto::params::{catalog, ParameterSet};
pub use dtm_proto::{Callbacks, ErrorKind, ErrorSeverity, SessionError};

mod builder;
pub use builder::ConnectionBuilder;
