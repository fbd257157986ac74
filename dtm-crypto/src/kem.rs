//! Post-quantum KEM variants used for the DTM Auth-stage and Primary-stage
//! asymmetric exchanges.
//!
//! Three variants are supported (Kyber512/768/1024). Which one is in play
//! for a given parameter set is carried in byte 0 (Auth
//! family) and byte 4 (Primary family) of the `ParameterSet` OID — see
//! `dtm_proto::params`. This module only deals with the tag → implementation
//! dispatch; OID layout belongs to the protocol crate.

use pqcrypto_kyber::{kyber1024, kyber512, kyber768};
use pqcrypto_traits::kem::{
    Ciphertext as _, PublicKey as _, SecretKey as _, SharedSecret as _,
};
use zeroize::Zeroize;

/// KEM family tag, carried as a single OID byte.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum KemVariant {
    /// Kyber512 (NIST security level 1).
    Kyber512,
    /// Kyber768 (NIST security level 3).
    Kyber768,
    /// Kyber1024 (NIST security level 5).
    Kyber1024,
}

impl KemVariant {
    /// Decode the OID family byte into a variant.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Kyber512),
            1 => Some(Self::Kyber768),
            2 => Some(Self::Kyber1024),
            _ => None,
        }
    }

    /// Encode this variant back to its OID family byte.
    pub fn tag(self) -> u8 {
        match self {
            Self::Kyber512 => 0,
            Self::Kyber768 => 1,
            Self::Kyber1024 => 2,
        }
    }
}

/// Errors from KEM key generation, encapsulation, or decapsulation.
#[derive(Clone, Debug, PartialEq)]
pub enum KemError {
    /// A serialized public key, secret key, or ciphertext had the wrong length
    /// for its variant.
    InvalidEncoding,
    /// A variant tag that does not map to a known KEM family.
    UnknownVariant(u8),
}

impl std::fmt::Display for KemError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidEncoding => write!(f, "invalid KEM key/ciphertext encoding"),
            Self::UnknownVariant(tag) => write!(f, "unknown KEM variant tag {tag}"),
        }
    }
}
impl std::error::Error for KemError {}

/// A KEM public key, tagged with the variant it belongs to.
#[derive(Clone)]
pub struct KemPublicKey {
    pub(crate) variant: KemVariant,
    pub(crate) bytes: Vec<u8>,
}

/// A KEM secret key, tagged with the variant it belongs to.
///
/// Zeroized on drop; this is long-lived only for the duration of one
/// handshake stage.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct KemSecretKey {
    #[zeroize(skip)]
    pub(crate) variant: KemVariant,
    pub(crate) bytes: Vec<u8>,
}

/// A KEM ciphertext (the encapsulated shared secret), tagged with variant.
#[derive(Clone)]
pub struct KemCiphertext {
    pub(crate) variant: KemVariant,
    pub(crate) bytes: Vec<u8>,
}

/// A 32-byte shared secret derived from encapsulation/decapsulation.
///
/// Zeroized on drop.
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SharedSecret(pub [u8; 32]);

impl KemPublicKey {
    /// Bit-exact wire form, as transmitted at the PreAuth/PrimeEx stages.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Parse a wire-form public key for a known variant.
    pub fn from_bytes(variant: KemVariant, bytes: &[u8]) -> Result<Self, KemError> {
        let ok = match variant {
            KemVariant::Kyber512 => kyber512::PublicKey::from_bytes(bytes).is_ok(),
            KemVariant::Kyber768 => kyber768::PublicKey::from_bytes(bytes).is_ok(),
            KemVariant::Kyber1024 => kyber1024::PublicKey::from_bytes(bytes).is_ok(),
        };
        if !ok {
            return Err(KemError::InvalidEncoding);
        }
        Ok(Self { variant, bytes: bytes.to_vec() })
    }

    /// Which KEM family this key belongs to.
    pub fn variant(&self) -> KemVariant {
        self.variant
    }
}

impl KemCiphertext {
    /// Bit-exact wire form.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.bytes.clone()
    }

    /// Parse a wire-form ciphertext for a known variant.
    pub fn from_bytes(variant: KemVariant, bytes: &[u8]) -> Result<Self, KemError> {
        let ok = match variant {
            KemVariant::Kyber512 => kyber512::Ciphertext::from_bytes(bytes).is_ok(),
            KemVariant::Kyber768 => kyber768::Ciphertext::from_bytes(bytes).is_ok(),
            KemVariant::Kyber1024 => kyber1024::Ciphertext::from_bytes(bytes).is_ok(),
        };
        if !ok {
            return Err(KemError::InvalidEncoding);
        }
        Ok(Self { variant, bytes: bytes.to_vec() })
    }
}

/// Generate a fresh keypair for the given variant.
pub fn gen_keypair(variant: KemVariant) -> (KemPublicKey, KemSecretKey) {
    match variant {
        KemVariant::Kyber512 => {
            let (pk, sk) = kyber512::keypair();
            (
                KemPublicKey { variant, bytes: pk.as_bytes().to_vec() },
                KemSecretKey { variant, bytes: sk.as_bytes().to_vec() },
            )
        }
        KemVariant::Kyber768 => {
            let (pk, sk) = kyber768::keypair();
            (
                KemPublicKey { variant, bytes: pk.as_bytes().to_vec() },
                KemSecretKey { variant, bytes: sk.as_bytes().to_vec() },
            )
        }
        KemVariant::Kyber1024 => {
            let (pk, sk) = kyber1024::keypair();
            (
                KemPublicKey { variant, bytes: pk.as_bytes().to_vec() },
                KemSecretKey { variant, bytes: sk.as_bytes().to_vec() },
            )
        }
    }
}

/// Encapsulate against a peer's public key, producing a ciphertext to send
/// and the shared secret to keep.
pub fn encapsulate(pk: &KemPublicKey) -> Result<(KemCiphertext, SharedSecret), KemError> {
    let variant = pk.variant;
    let (ct_bytes, ss_bytes): (Vec<u8>, [u8; 32]) = match variant {
        KemVariant::Kyber512 => {
            let key = kyber512::PublicKey::from_bytes(&pk.bytes).map_err(|_| KemError::InvalidEncoding)?;
            let (ss, ct) = kyber512::encapsulate(&key);
            (ct.as_bytes().to_vec(), ss.as_bytes().try_into().map_err(|_| KemError::InvalidEncoding)?)
        }
        KemVariant::Kyber768 => {
            let key = kyber768::PublicKey::from_bytes(&pk.bytes).map_err(|_| KemError::InvalidEncoding)?;
            let (ss, ct) = kyber768::encapsulate(&key);
            (ct.as_bytes().to_vec(), ss.as_bytes().try_into().map_err(|_| KemError::InvalidEncoding)?)
        }
        KemVariant::Kyber1024 => {
            let key = kyber1024::PublicKey::from_bytes(&pk.bytes).map_err(|_| KemError::InvalidEncoding)?;
            let (ss, ct) = kyber1024::encapsulate(&key);
            (ct.as_bytes().to_vec(), ss.as_bytes().try_into().map_err(|_| KemError::InvalidEncoding)?)
        }
    };
    Ok((KemCiphertext { variant, bytes: ct_bytes }, SharedSecret(ss_bytes)))
}

/// Decapsulate a ciphertext with our secret key, recovering the shared secret.
pub fn decapsulate(sk: &KemSecretKey, ct: &KemCiphertext) -> Result<SharedSecret, KemError> {
    if sk.variant != ct.variant {
        return Err(KemError::InvalidEncoding);
    }
    let ss_bytes: [u8; 32] = match sk.variant {
        KemVariant::Kyber512 => {
            let key = kyber512::SecretKey::from_bytes(&sk.bytes).map_err(|_| KemError::InvalidEncoding)?;
            let cph = kyber512::Ciphertext::from_bytes(&ct.bytes).map_err(|_| KemError::InvalidEncoding)?;
            kyber512::decapsulate(&cph, &key).as_bytes().try_into().map_err(|_| KemError::InvalidEncoding)?
        }
        KemVariant::Kyber768 => {
            let key = kyber768::SecretKey::from_bytes(&sk.bytes).map_err(|_| KemError::InvalidEncoding)?;
            let cph = kyber768::Ciphertext::from_bytes(&ct.bytes).map_err(|_| KemError::InvalidEncoding)?;
            kyber768::decapsulate(&cph, &key).as_bytes().try_into().map_err(|_| KemError::InvalidEncoding)?
        }
        KemVariant::Kyber1024 => {
            let key = kyber1024::SecretKey::from_bytes(&sk.bytes).map_err(|_| KemError::InvalidEncoding)?;
            let cph = kyber1024::Ciphertext::from_bytes(&ct.bytes).map_err(|_| KemError::InvalidEncoding)?;
            kyber1024::decapsulate(&cph, &key).as_bytes().try_into().map_err(|_| KemError::InvalidEncoding)?
        }
    };
    Ok(SharedSecret(ss_bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_roundtrip() {
        for v in [KemVariant::Kyber512, KemVariant::Kyber768, KemVariant::Kyber1024] {
            assert_eq!(KemVariant::from_tag(v.tag()), Some(v));
        }
        assert_eq!(KemVariant::from_tag(99), None);
    }

    #[test]
    fn encapsulate_decapsulate_agree() {
        for v in [KemVariant::Kyber512, KemVariant::Kyber768, KemVariant::Kyber1024] {
            let (pk, sk) = gen_keypair(v);
            let (ct, ss_a) = encapsulate(&pk).unwrap();
            let ss_b = decapsulate(&sk, &ct).unwrap();
            assert_eq!(ss_a.0, ss_b.0);
        }
    }

    #[test]
    fn wire_roundtrip() {
        let (pk, _sk) = gen_keypair(KemVariant::Kyber768);
        let wire = pk.to_bytes();
        let back = KemPublicKey::from_bytes(KemVariant::Kyber768, &wire).unwrap();
        assert_eq!(back.to_bytes(), wire);
    }

    #[test]
    fn mismatched_variant_decapsulate_fails() {
        let (pk_a, _) = gen_keypair(KemVariant::Kyber512);
        let (_, sk_b) = gen_keypair(KemVariant::Kyber768);
        let (ct, _) = encapsulate(&pk_a).unwrap();
        assert!(decapsulate(&sk_b, &ct).is_err());
    }
}
