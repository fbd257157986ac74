//! `ParameterSet` — immutable session description.
//!
//! Grounded on `layer-client/src/session.rs`'s `PersistedSession`/`DcEntry`
//! fixed-layout save/load pattern: plain structs with explicit
//! `to_bytes`/`from_bytes` rather than a derive-based serializer, matching
//! a preference for hand-rolled wire formats at protocol boundaries.

use dtm_crypto::{KdfDigest, KemVariant};

/// 16-byte `ParameterSet` OID.
///
/// Layout: byte 0 = Auth asymmetric family tag, byte 4 = Primary asymmetric
/// family tag, bytes 8-9 = Auth-stage symmetric cipher id, bytes 10-11 =
/// Primary-stage symmetric cipher id, remaining bytes = unique identifier.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParameterOid(pub [u8; 16]);

impl ParameterOid {
    /// Build an OID from its named fields; unused bytes are zeroed except
    /// where `unique` supplies them.
    pub fn new(auth_family: KemVariant, primary_family: KemVariant, auth_cipher_id: u16, primary_cipher_id: u16, unique: u32) -> Self {
        let mut bytes = [0u8; 16];
        bytes[0] = auth_family.tag();
        bytes[4] = primary_family.tag();
        bytes[8..10].copy_from_slice(&auth_cipher_id.to_le_bytes());
        bytes[10..12].copy_from_slice(&primary_cipher_id.to_le_bytes());
        bytes[12..16].copy_from_slice(&unique.to_le_bytes());
        Self(bytes)
    }

    /// The Auth-stage KEM family, if the byte maps to a known variant.
    pub fn auth_family(&self) -> Option<KemVariant> {
        KemVariant::from_tag(self.0[0])
    }

    /// The Primary-stage KEM family, if the byte maps to a known variant.
    pub fn primary_family(&self) -> Option<KemVariant> {
        KemVariant::from_tag(self.0[4])
    }

    /// The security-classification prefix both peers must agree on before
    /// a Connect proceeds — a mismatch is grounds for refusal.
    /// Interpreted here as the first 4 OID bytes, which cover the Auth
    /// family tag plus its reserved companion bytes.
    pub fn classification_prefix(&self) -> [u8; 4] {
        [self.0[0], self.0[1], self.0[2], self.0[3]]
    }

    /// Whether `self` and `other` share a security classification.
    pub fn same_classification(&self, other: &ParameterOid) -> bool {
        self.classification_prefix() == other.classification_prefix()
    }
}

/// `DtmSession` — packed symmetric-session description.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DtmSession {
    /// Cipher selector (currently always AES-256-CTR; reserved for future ciphers).
    pub cipher_selector: u8,
    /// Symmetric key size in bytes.
    pub key_size: u16,
    /// IV size in bytes.
    pub iv_size: u16,
    /// Round count (reserved; AES-256 fixes its own round count internally).
    pub round_count: u8,
    /// Optional KDF digest used to expand the KEM shared secret.
    pub kdf_digest: Option<KdfDigest>,
}

impl DtmSession {
    /// The default session: AES-256-CTR keyed from HKDF-SHA256.
    pub fn default_aes256_ctr() -> Self {
        Self {
            cipher_selector: 0,
            key_size: dtm_crypto::cipher::KEY_SIZE as u16,
            iv_size: dtm_crypto::cipher::IV_SIZE as u16,
            round_count: 14,
            kdf_digest: Some(KdfDigest::Sha256),
        }
    }

    /// Pack into the fixed 7-byte wire layout:
    /// `cipher_selector:u8 || key_size:u16 le || iv_size:u16 le || round_count:u8 || kdf_digest:u8`.
    /// `kdf_digest` byte `0xff` means "none".
    pub fn to_bytes(&self) -> [u8; 7] {
        let mut buf = [0u8; 7];
        buf[0] = self.cipher_selector;
        buf[1..3].copy_from_slice(&self.key_size.to_le_bytes());
        buf[3..5].copy_from_slice(&self.iv_size.to_le_bytes());
        buf[5] = self.round_count;
        buf[6] = self.kdf_digest.map(|d| d.tag()).unwrap_or(0xff);
        buf
    }

    /// Unpack from the fixed 7-byte wire layout.
    pub fn from_bytes(buf: &[u8; 7]) -> Self {
        let kdf_digest = if buf[6] == 0xff { None } else { KdfDigest::from_tag(buf[6]) };
        Self {
            cipher_selector: buf[0],
            key_size: u16::from_le_bytes([buf[1], buf[2]]),
            iv_size: u16::from_le_bytes([buf[3], buf[4]]),
            round_count: buf[5],
            kdf_digest,
        }
    }
}

/// The ten padding/delay knobs of a `ParameterSet`'s obfuscation profile.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct Profile {
    pub max_asm_key_append: u16,
    pub max_asm_key_prepend: u16,
    pub max_auth_append: u16,
    pub max_auth_prepend: u16,
    pub max_sym_key_append: u16,
    pub max_sym_key_prepend: u16,
    pub max_message_append: u16,
    pub max_message_prepend: u16,
    pub max_asm_key_delay_ms: u32,
    pub max_sym_key_delay_ms: u32,
    pub max_message_delay_ms: u32,
}

impl Profile {
    /// A profile with every knob at zero: no padding, no delay.
    pub fn none() -> Self {
        Self::default()
    }

    /// Padding bounds for the asymmetric-key (PreAuth/PrimeEx) stages.
    pub fn asm_key_bounds(&self) -> crate::wrapper::PadBounds {
        crate::wrapper::PadBounds { max_prepend: self.max_asm_key_prepend, max_append: self.max_asm_key_append }
    }

    /// Padding bounds for the Auth-identity stage.
    pub fn auth_bounds(&self) -> crate::wrapper::PadBounds {
        crate::wrapper::PadBounds { max_prepend: self.max_auth_prepend, max_append: self.max_auth_append }
    }

    /// Padding bounds for symmetric-key delivery (AuthEx/Primary) stages.
    pub fn sym_key_bounds(&self) -> crate::wrapper::PadBounds {
        crate::wrapper::PadBounds { max_prepend: self.max_sym_key_prepend, max_append: self.max_sym_key_append }
    }

    /// Padding bounds for post-handshake Messages.
    pub fn message_bounds(&self) -> crate::wrapper::PadBounds {
        crate::wrapper::PadBounds { max_prepend: self.max_message_prepend, max_append: self.max_message_append }
    }
}

/// An immutable, fully-specified session description.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ParameterSet {
    pub auth_pke_id: ParameterOid,
    pub primary_pke_id: ParameterOid,
    pub auth_session: DtmSession,
    pub primary_session: DtmSession,
    pub profile: Profile,
}

impl ParameterSet {
    /// The all-zero OID used for the initial Connect stage:
    /// `DtmIdentity{..., zero_pke_id, default_session, 0}`.
    pub fn zero_pke_id() -> ParameterOid {
        ParameterOid([0u8; 16])
    }
}

/// A small in-memory catalog of named parameter sets, for callers that want
/// a ready-made set instead of constructing one field by field.
pub mod catalog {
    use super::*;

    /// `X41RNT1R1` — Kyber768 for both stages, AES-256-CTR/HKDF-SHA256 throughout, no
    /// padding or delay (deterministic for tests).
    pub fn x41rnt1r1() -> ParameterSet {
        ParameterSet {
            auth_pke_id: ParameterOid::new(KemVariant::Kyber768, KemVariant::Kyber768, 0, 0, 0x5254_3158),
            primary_pke_id: ParameterOid::new(KemVariant::Kyber768, KemVariant::Kyber768, 0, 0, 0x5254_3158),
            auth_session: DtmSession::default_aes256_ctr(),
            primary_session: DtmSession::default_aes256_ctr(),
            profile: Profile::none(),
        }
    }

    /// A padded/delayed variant of [`x41rnt1r1`] exercising the obfuscation
    /// profile end-to-end; Kyber1024 throughout for a higher security floor.
    pub fn x41rnt1r1_obfuscated() -> ParameterSet {
        let mut p = x41rnt1r1();
        p.auth_pke_id = ParameterOid::new(KemVariant::Kyber1024, KemVariant::Kyber1024, 0, 0, 0x5254_3159);
        p.primary_pke_id = ParameterOid::new(KemVariant::Kyber1024, KemVariant::Kyber1024, 0, 0, 0x5254_3159);
        p.profile = Profile {
            max_asm_key_append: 32,
            max_asm_key_prepend: 32,
            max_auth_append: 16,
            max_auth_prepend: 16,
            max_sym_key_append: 32,
            max_sym_key_prepend: 32,
            max_message_append: 64,
            max_message_prepend: 64,
            max_asm_key_delay_ms: 20,
            max_sym_key_delay_ms: 20,
            max_message_delay_ms: 10,
        };
        p
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oid_family_roundtrip() {
        let oid = ParameterOid::new(KemVariant::Kyber512, KemVariant::Kyber1024, 7, 9, 123);
        assert_eq!(oid.auth_family(), Some(KemVariant::Kyber512));
        assert_eq!(oid.primary_family(), Some(KemVariant::Kyber1024));
    }

    #[test]
    fn classification_matches_same_family_prefix() {
        let a = ParameterOid::new(KemVariant::Kyber768, KemVariant::Kyber768, 0, 0, 1);
        let b = ParameterOid::new(KemVariant::Kyber768, KemVariant::Kyber768, 0, 0, 2);
        assert!(a.same_classification(&b));
        let c = ParameterOid::new(KemVariant::Kyber512, KemVariant::Kyber768, 0, 0, 1);
        assert!(!a.same_classification(&c));
    }

    #[test]
    fn session_roundtrip() {
        let s = DtmSession::default_aes256_ctr();
        let bytes = s.to_bytes();
        assert_eq!(DtmSession::from_bytes(&bytes), s);
    }

    #[test]
    fn catalog_entries_are_self_consistent() {
        let ps = catalog::x41rnt1r1();
        assert_eq!(ps.auth_pke_id.auth_family(), Some(KemVariant::Kyber768));
        let obf = catalog::x41rnt1r1_obfuscated();
        assert!(obf.profile.max_message_prepend > 0);
    }
}
