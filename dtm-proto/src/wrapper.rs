//! `MessageWrapper` — random-length padding envelope.
//!
//! Layout: `prepend_len:u16 le || append_len:u16 le || prepend_rand ||
//! payload || append_rand`. Always applied inside the encrypted payload, so
//! an observer sees only a uniform-looking, length-randomized ciphertext.
//!
//! Grounded on `layer-crypto::encrypt_data_v2`'s pad-then-prefix shape,
//! generalized to independent prepend/append pads.

use dtm_crypto::rng::{fill_random, uniform_pad_len};

/// Size of the fixed `{prepend_len, append_len}` descriptor.
pub const DESCRIPTOR_LEN: usize = 4;

/// Errors unwrapping a [`MessageWrapper`] envelope.
#[derive(Clone, Debug, PartialEq)]
pub enum UnwrapError {
    /// Fewer than [`DESCRIPTOR_LEN`] bytes were available.
    TooShortForDescriptor,
    /// The declared prepend/append lengths exceed what the carrier holds.
    LengthsExceedCarrier,
}

impl std::fmt::Display for UnwrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TooShortForDescriptor => write!(f, "wrapped message shorter than descriptor"),
            Self::LengthsExceedCarrier => write!(f, "prepend/append lengths exceed carrier length"),
        }
    }
}
impl std::error::Error for UnwrapError {}

/// Maximum prepend/append padding lengths, drawn from a `ParameterSet`'s
/// padding profile for one particular field (e.g. `max_message_prepend`).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PadBounds {
    pub max_prepend: u16,
    pub max_append: u16,
}

/// Wrap `plaintext` in a random-length padding envelope.
///
/// `bounds.max_prepend == 0 && bounds.max_append == 0` degenerates to
/// `descriptor(0,0) || plaintext` with no random bytes.
pub fn wrap(plaintext: &[u8], bounds: PadBounds) -> Vec<u8> {
    let prepend_len = uniform_pad_len(bounds.max_prepend);
    let append_len = uniform_pad_len(bounds.max_append);

    let mut out = Vec::with_capacity(DESCRIPTOR_LEN + prepend_len as usize + plaintext.len() + append_len as usize);
    out.extend_from_slice(&prepend_len.to_le_bytes());
    out.extend_from_slice(&append_len.to_le_bytes());

    let mut prepend = vec![0u8; prepend_len as usize];
    fill_random(&mut prepend);
    out.extend_from_slice(&prepend);

    out.extend_from_slice(plaintext);

    let mut append = vec![0u8; append_len as usize];
    fill_random(&mut append);
    out.extend_from_slice(&append);

    out
}

/// Reverse of [`wrap`]: read the descriptor, skip the prepend padding,
/// truncate the append padding, and return the original plaintext.
pub fn unwrap(carrier: &[u8]) -> Result<&[u8], UnwrapError> {
    if carrier.len() < DESCRIPTOR_LEN {
        return Err(UnwrapError::TooShortForDescriptor);
    }
    let prepend_len = u16::from_le_bytes([carrier[0], carrier[1]]) as usize;
    let append_len = u16::from_le_bytes([carrier[2], carrier[3]]) as usize;

    let body = &carrier[DESCRIPTOR_LEN..];
    if prepend_len + append_len > body.len() {
        return Err(UnwrapError::LengthsExceedCarrier);
    }
    Ok(&body[prepend_len..body.len() - append_len])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_with_padding() {
        let bounds = PadBounds { max_prepend: 64, max_append: 64 };
        for msg in [b"".as_slice(), b"x", b"hello, world!", &[7u8; 500]] {
            let wrapped = wrap(msg, bounds);
            assert_eq!(unwrap(&wrapped).unwrap(), msg);
        }
    }

    #[test]
    fn zero_bounds_degenerate_to_header_only() {
        let bounds = PadBounds { max_prepend: 0, max_append: 0 };
        let wrapped = wrap(b"payload", bounds);
        assert_eq!(wrapped, [&0u16.to_le_bytes()[..], &0u16.to_le_bytes()[..], b"payload"].concat());
        assert_eq!(unwrap(&wrapped).unwrap(), b"payload");
    }

    #[test]
    fn unwrap_rejects_inconsistent_lengths() {
        let mut carrier = vec![0u8; 4];
        carrier[0..2].copy_from_slice(&100u16.to_le_bytes());
        assert!(matches!(unwrap(&carrier), Err(UnwrapError::LengthsExceedCarrier)));
    }

    #[test]
    fn unwrap_rejects_short_carrier() {
        assert!(matches!(unwrap(&[1, 2]), Err(UnwrapError::TooShortForDescriptor)));
    }
}
