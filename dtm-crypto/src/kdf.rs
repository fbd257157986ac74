//! Key derivation from KEM shared secrets.
//!
//! `DtmSession` (see `dtm_proto::params`) names an optional KDF digest; this
//! module implements the two digests the fixed wire layout can select
//! between (SHA-1 and SHA-256), expanding a KEM shared secret into the
//! `(key, iv)` pair a `CryptoAdapter::cipher_init` call needs.

use hkdf::Hkdf;
use sha1::Sha1;
use sha2::Sha256;

use crate::cipher::{IV_SIZE, KEY_SIZE};
use crate::kem::SharedSecret;

/// Which digest backs the HKDF expansion.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KdfDigest {
    /// SHA-1 (legacy auth-stage compatibility).
    Sha1,
    /// SHA-256 (default, used for the Primary stage).
    Sha256,
}

impl KdfDigest {
    /// Decode a `DtmSession` digest selector byte.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Sha1),
            1 => Some(Self::Sha256),
            _ => None,
        }
    }

    /// Encode back to a `DtmSession` digest selector byte.
    pub fn tag(self) -> u8 {
        match self {
            Self::Sha1 => 0,
            Self::Sha256 => 1,
        }
    }
}

/// Expand a KEM shared secret into a `(key, iv)` pair for `CipherCtx::new`.
///
/// `info` should bind the derivation to its context (e.g. `b"dtm-auth"` or
/// `b"dtm-primary"`) so the Auth-stage and Primary-stage keys never collide
/// even if (improbably) the same shared secret were ever reused.
pub fn derive_sym_key(secret: &SharedSecret, digest: KdfDigest, info: &[u8]) -> ([u8; KEY_SIZE], [u8; IV_SIZE]) {
    let mut okm = [0u8; KEY_SIZE + IV_SIZE];
    match digest {
        KdfDigest::Sha1 => {
            let hk = Hkdf::<Sha1>::new(None, &secret.0);
            hk.expand(info, &mut okm).expect("okm length is valid for HKDF-SHA1");
        }
        KdfDigest::Sha256 => {
            let hk = Hkdf::<Sha256>::new(None, &secret.0);
            hk.expand(info, &mut okm).expect("okm length is valid for HKDF-SHA256");
        }
    }
    let mut key = [0u8; KEY_SIZE];
    let mut iv = [0u8; IV_SIZE];
    key.copy_from_slice(&okm[..KEY_SIZE]);
    iv.copy_from_slice(&okm[KEY_SIZE..]);
    (key, iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_context_separated() {
        let secret = SharedSecret([42u8; 32]);
        let (k1, iv1) = derive_sym_key(&secret, KdfDigest::Sha256, b"dtm-auth");
        let (k2, iv2) = derive_sym_key(&secret, KdfDigest::Sha256, b"dtm-auth");
        assert_eq!(k1, k2);
        assert_eq!(iv1, iv2);

        let (k3, _) = derive_sym_key(&secret, KdfDigest::Sha256, b"dtm-primary");
        assert_ne!(k1, k3);
    }

    #[test]
    fn digest_tag_roundtrip() {
        for d in [KdfDigest::Sha1, KdfDigest::Sha256] {
            assert_eq!(KdfDigest::from_tag(d.tag()), Some(d));
        }
    }
}
