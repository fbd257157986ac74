//! `CryptoAdapter` — a uniform facade: one set of capabilities that
//! dispatches to whichever KEM variant and digest a given `ParameterSet`
//! names, so `dtm-proto`'s exchange state machine never has to match on
//! variant tags itself.
//!
//! Modeled on `layer-mtproto/transport.rs`'s `Transport` trait: a small
//! capability surface, implemented once here, generic enough that the
//! protocol crate only calls through the facade.

use crate::cipher::{CipherCtx, CipherError};
use crate::kdf::{derive_sym_key, KdfDigest};
use crate::kem::{self, KemCiphertext, KemError, KemPublicKey, KemSecretKey, KemVariant, SharedSecret};
use crate::rng::fill_random;

/// Errors surfaced by the adapter's hybrid encrypt/decrypt operations.
#[derive(Debug)]
pub enum AdapterError {
    /// The underlying KEM operation failed.
    Kem(KemError),
    /// The underlying symmetric cipher rejected its key/iv.
    Cipher(CipherError),
    /// A hybrid ciphertext was too short to contain its KEM component.
    Truncated,
}

impl std::fmt::Display for AdapterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Kem(e) => write!(f, "KEM error: {e}"),
            Self::Cipher(e) => write!(f, "cipher error: {e}"),
            Self::Truncated => write!(f, "hybrid ciphertext truncated"),
        }
    }
}
impl std::error::Error for AdapterError {}

impl From<KemError> for AdapterError {
    fn from(e: KemError) -> Self { Self::Kem(e) }
}
impl From<CipherError> for AdapterError {
    fn from(e: CipherError) -> Self { Self::Cipher(e) }
}

/// Generate a fresh KEM keypair for `variant`.
pub fn gen_keypair(variant: KemVariant) -> (KemPublicKey, KemSecretKey) {
    kem::gen_keypair(variant)
}

/// Hybrid-encrypt `plaintext` under a peer's KEM public key.
///
/// Wire layout: `kem_ciphertext_len:u16 le || kem_ciphertext || ctr_ciphertext`.
/// This is the construction the Exchange stages use whenever a payload must
/// be encrypted under a peer's public key (AuthEx, Primary): since a raw KEM
/// cannot asymmetrically encrypt arbitrary plaintext, we encapsulate to get a
/// fresh shared secret, derive a one-shot symmetric key/iv from it, and
/// counter-mode-encrypt the real payload with that.
pub fn encrypt(pk: &KemPublicKey, digest: KdfDigest, info: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, AdapterError> {
    let (ct, secret) = kem::encapsulate(pk)?;
    let (key, iv) = derive_sym_key(&secret, digest, info);
    let mut ctx = CipherCtx::new(&key, &iv)?;
    let mut body = plaintext.to_vec();
    ctx.transform(&mut body);

    let ct_bytes = ct.to_bytes();
    let mut out = Vec::with_capacity(2 + ct_bytes.len() + body.len());
    out.extend_from_slice(&(ct_bytes.len() as u16).to_le_bytes());
    out.extend_from_slice(&ct_bytes);
    out.extend_from_slice(&body);
    Ok(out)
}

/// Reverse of [`encrypt`]: decapsulate the KEM component with our secret key
/// and counter-mode-decrypt the remainder.
pub fn decrypt(sk: &KemSecretKey, digest: KdfDigest, info: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, AdapterError> {
    if ciphertext.len() < 2 {
        return Err(AdapterError::Truncated);
    }
    let ct_len = u16::from_le_bytes([ciphertext[0], ciphertext[1]]) as usize;
    if ciphertext.len() < 2 + ct_len {
        return Err(AdapterError::Truncated);
    }
    let kem_ct = KemCiphertext::from_bytes(sk.variant, &ciphertext[2..2 + ct_len])?;
    let secret: SharedSecret = kem::decapsulate(sk, &kem_ct)?;
    let (key, iv) = derive_sym_key(&secret, digest, info);
    let mut ctx = CipherCtx::new(&key, &iv)?;
    let mut body = ciphertext[2 + ct_len..].to_vec();
    ctx.transform(&mut body);
    Ok(body)
}

/// Draw a fresh random `(key, iv)` pair for a brand-new symmetric session
/// (used to seed the Auth-stage/Primary-stage/per-file ciphers before they
/// are wrapped and sent to the peer).
pub fn derive_fresh_sym_key() -> ([u8; crate::cipher::KEY_SIZE], [u8; crate::cipher::IV_SIZE]) {
    let mut key = [0u8; crate::cipher::KEY_SIZE];
    let mut iv = [0u8; crate::cipher::IV_SIZE];
    fill_random(&mut key);
    fill_random(&mut iv);
    (key, iv)
}

/// Initialize a counter-mode cipher context from an explicit key/iv.
pub fn cipher_init(key: &[u8], iv: &[u8]) -> Result<CipherCtx, CipherError> {
    CipherCtx::new(key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hybrid_roundtrip() {
        let (pk, sk) = gen_keypair(KemVariant::Kyber768);
        let msg = b"auth-stage session key material";
        let ct = encrypt(&pk, KdfDigest::Sha256, b"dtm-test", msg).unwrap();
        let back = decrypt(&sk, KdfDigest::Sha256, b"dtm-test", &ct).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let (_, sk) = gen_keypair(KemVariant::Kyber512);
        assert!(decrypt(&sk, KdfDigest::Sha256, b"x", &[1]).is_err());
    }

    #[test]
    fn fresh_sym_keys_differ() {
        let (k1, v1) = derive_fresh_sym_key();
        let (k2, v2) = derive_fresh_sym_key();
        assert_ne!(k1, k2);
        assert_ne!(v1, v2);
    }
}
