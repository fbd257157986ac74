//! Counter-mode symmetric cipher used for both the Auth-stage and
//! Primary-stage sessions, and for the per-file cipher in the transfer
//! sidechannel.
//!
//! Keystream consumption order is load-bearing: a `CipherCtx` is a plain
//! running counter-mode state machine with no internal buffering, so
//! callers must feed bytes in wire order.

use aes::cipher::{KeyIvInit, StreamCipher};
use ctr::Ctr64BE;
use zeroize::Zeroize;

type Aes256Ctr = Ctr64BE<aes::Aes256>;

/// Key size in bytes for the AES-256-CTR session cipher.
pub const KEY_SIZE: usize = 32;
/// IV (initial counter block) size in bytes.
pub const IV_SIZE: usize = 16;

/// Errors constructing a cipher context.
#[derive(Clone, Debug, PartialEq)]
pub enum CipherError {
    /// `key` was not exactly [`KEY_SIZE`] bytes.
    InvalidKeyLength(usize),
    /// `iv` was not exactly [`IV_SIZE`] bytes.
    InvalidIvLength(usize),
}

impl std::fmt::Display for CipherError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidKeyLength(n) => write!(f, "cipher key must be {KEY_SIZE} bytes, got {n}"),
            Self::InvalidIvLength(n) => write!(f, "cipher iv must be {IV_SIZE} bytes, got {n}"),
        }
    }
}
impl std::error::Error for CipherError {}

/// A live AES-256-CTR keystream position.
///
/// Cloning is intentionally not derived: a `CipherCtx` represents a single
/// running keystream, and two independent clones would silently diverge from
/// the "consumed exactly once, in order" invariant the record layer relies
/// on.
pub struct CipherCtx {
    inner: Aes256Ctr,
    key: [u8; KEY_SIZE],
    iv: [u8; IV_SIZE],
}

impl CipherCtx {
    /// Initialize a fresh counter-mode context from a key/iv pair.
    pub fn new(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        if key.len() != KEY_SIZE {
            return Err(CipherError::InvalidKeyLength(key.len()));
        }
        if iv.len() != IV_SIZE {
            return Err(CipherError::InvalidIvLength(iv.len()));
        }
        let mut k = [0u8; KEY_SIZE];
        let mut v = [0u8; IV_SIZE];
        k.copy_from_slice(key);
        v.copy_from_slice(iv);
        let inner = Aes256Ctr::new(&k.into(), &v.into());
        Ok(Self { inner, key: k, iv: v })
    }

    /// XOR `data` in place with the next `data.len()` keystream bytes.
    ///
    /// Encryption and decryption are the same operation in counter mode.
    pub fn transform(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    /// Advance the keystream by `n` bytes without producing output, used by
    /// the Resync protocol to re-align a peer's `recv_cipher` position.
    pub fn advance(&mut self, n: usize) {
        let mut scratch = vec![0u8; n.min(4096)];
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(scratch.len());
            self.inner.apply_keystream(&mut scratch[..chunk]);
            remaining -= chunk;
        }
    }
}

impl Drop for CipherCtx {
    fn drop(&mut self) {
        self.key.zeroize();
        self.iv.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = [7u8; KEY_SIZE];
        let iv = [9u8; IV_SIZE];
        let mut enc = CipherCtx::new(&key, &iv).unwrap();
        let mut dec = CipherCtx::new(&key, &iv).unwrap();

        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut buf = plaintext.clone();
        enc.transform(&mut buf);
        assert_ne!(buf, plaintext);
        dec.transform(&mut buf);
        assert_eq!(buf, plaintext);
    }

    #[test]
    fn advance_matches_equivalent_transform() {
        let key = [3u8; KEY_SIZE];
        let iv = [5u8; IV_SIZE];
        let mut a = CipherCtx::new(&key, &iv).unwrap();
        let mut b = CipherCtx::new(&key, &iv).unwrap();

        let mut dummy = vec![0u8; 100];
        a.advance(100);
        b.transform(&mut dummy);

        let mut tail_a = vec![1u8; 16];
        let mut tail_b = tail_a.clone();
        a.transform(&mut tail_a);
        b.transform(&mut tail_b);
        assert_eq!(tail_a, tail_b);
    }

    #[test]
    fn rejects_bad_lengths() {
        assert!(CipherCtx::new(&[0u8; 10], &[0u8; IV_SIZE]).is_err());
        assert!(CipherCtx::new(&[0u8; KEY_SIZE], &[0u8; 4]).is_err());
    }
}
