//! Cryptographic primitives for the DTM key exchange and secure channel.
//!
//! This crate handles:
//! * Post-quantum KEM variants (Kyber512/768/1024), selected by OID tag
//! * AES-256-CTR counter-mode symmetric cipher
//! * HKDF-based key derivation from KEM shared secrets
//! * PRNG helpers for padding/delay profiles
//!
//! It deliberately says nothing about wire framing or handshake sequencing —
//! that lives in `dtm-proto`, which consumes this crate through
//! [`adapter`]'s `CryptoAdapter` facade.

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod adapter;
pub mod cipher;
pub mod kdf;
pub mod kem;
pub mod rng;

pub use adapter::AdapterError;
pub use cipher::{CipherCtx, CipherError};
pub use kdf::KdfDigest;
pub use kem::{KemCiphertext, KemError, KemPublicKey, KemSecretKey, KemVariant, SharedSecret};
