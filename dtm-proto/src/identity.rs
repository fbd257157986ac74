//! `DtmIdentity` — the record carried at Connect/Init/Auth/Sync.

use crate::params::{DtmSession, ParameterOid};

/// One party's identity material plus the parameters the peer needs to
/// parse subsequent messages.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DtmIdentity {
    /// Public id (Connect/Init) or secret id (Auth/Sync), application-opaque bytes.
    pub id: Vec<u8>,
    /// The asymmetric parameters id for the next stage this identity announces.
    pub pke_id: ParameterOid,
    /// The symmetric session description for the next stage.
    pub session: DtmSession,
    /// Reserved overloaded field; always `0` in this implementation.
    pub option_flag: u64,
}

impl DtmIdentity {
    /// Build a new identity record.
    pub fn new(id: Vec<u8>, pke_id: ParameterOid, session: DtmSession) -> Self {
        Self { id, pke_id, session, option_flag: 0 }
    }

    /// Serialize to bytes: `id_len:u16 le || id || pke_id:16 || session:7`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(2 + self.id.len() + 16 + 7 + 8);
        out.extend_from_slice(&(self.id.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.id);
        out.extend_from_slice(&self.pke_id.0);
        out.extend_from_slice(&self.session.to_bytes());
        out.extend_from_slice(&self.option_flag.to_le_bytes());
        out
    }

    /// Parse from the layout written by [`to_bytes`].
    pub fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() < 2 {
            return None;
        }
        let id_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut pos = 2;
        if buf.len() < pos + id_len + 16 + 7 + 8 {
            return None;
        }
        let id = buf[pos..pos + id_len].to_vec();
        pos += id_len;
        let mut oid_bytes = [0u8; 16];
        oid_bytes.copy_from_slice(&buf[pos..pos + 16]);
        pos += 16;
        let mut session_bytes = [0u8; 7];
        session_bytes.copy_from_slice(&buf[pos..pos + 7]);
        pos += 7;
        let option_flag = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());

        Some(Self {
            id,
            pke_id: ParameterOid(oid_bytes),
            session: DtmSession::from_bytes(&session_bytes),
            option_flag,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterSet;

    #[test]
    fn roundtrip() {
        let identity = DtmIdentity::new(vec![3, 3, 3, 3], ParameterSet::zero_pke_id(), DtmSession::default_aes256_ctr());
        let bytes = identity.to_bytes();
        let back = DtmIdentity::from_bytes(&bytes).unwrap();
        assert_eq!(back, identity);
    }

    #[test]
    fn rejects_truncated_buffer() {
        assert_eq!(DtmIdentity::from_bytes(&[0, 0]), None);
    }
}
