//! Resync protocol — re-aligning keystream position after a reconnect or
//! packet loss so decryption can resume.
//!
//! Grounded on the reconnect/resumption shape of `layer-client`'s
//! `dc_pool.rs` session persistence, and on `brontide`'s handshake-then-
//! cipher-state separation: an independently verifiable byte offset is
//! exactly the property that keeps two counter-mode keystreams in lockstep
//! after one side loses track of the other.

use crate::error::{ErrorKind, SessionError};
use crate::record::RecordLayer;
use crate::wrapper::{unwrap, wrap, PadBounds};

/// The responder's reply to an inbound `Service/DataLost`.
pub struct ResyncResponse {
    /// Goes in the outbound `Service/Resync` packet's `option_flag`: the
    /// responder's `bytes_sent` at the moment this message was built, i.e.
    /// before this message's own bytes are counted.
    pub option_flag: u64,
    /// Goes in the outbound `Service/Resync` packet's payload.
    pub payload: Vec<u8>,
}

/// Build the responder's `Service/Resync` reply to a peer's `DataLost`.
///
/// Captures `bytes_sent` before encrypting this message's own payload
/// (`option_flag` is `bytes_sent` at the moment of construction), then
/// wraps and encrypts the local secret id under `send_cipher` exactly like
/// an ordinary Message payload.
pub fn build_response(record: &mut RecordLayer, local_secret_id: &[u8], bounds: PadBounds) -> ResyncResponse {
    let option_flag = record.bytes_sent();
    log::info!("responding to DataLost with Resync at bytes_sent={option_flag}");
    let wrapped = wrap(local_secret_id, bounds);
    let payload = record.pack(&wrapped);
    ResyncResponse { option_flag, payload }
}

/// Outcome of processing an inbound `Service/Resync` reply.
pub struct ResyncOutcome {
    /// Number of dummy bytes the local `recv_cipher` was advanced by to
    /// catch up with the peer (zero if already aligned).
    pub advanced_by: u64,
}

/// Process an inbound `Service/Resync` packet as the initiator.
///
/// `option_flag` and `payload` are the packet's header field and body.
/// `expected_peer_secret_id` is the identity established during the
/// handshake, used to verify the responder is who this session thinks it
/// is. Returns `Err` at `Critical`/`DataLoss` severity: a negative delta or
/// identity mismatch is never partially recovered.
pub fn accept_response(
    record: &mut RecordLayer,
    option_flag: u64,
    payload: &[u8],
    expected_peer_secret_id: &[u8],
) -> Result<ResyncOutcome, SessionError> {
    let payload_length = payload.len() as u64;
    let bytes_received = record.bytes_received();

    let delta = option_flag as i128 - payload_length as i128 - bytes_received as i128;
    let advanced_by = if delta > 0 {
        let n = delta as u64;
        record.resync_advance_recv(n);
        n
    } else if delta < 0 {
        log::warn!("resync abort: peer byte counter {option_flag} is behind our received count {bytes_received} (delta {delta})");
        return Err(SessionError::critical(ErrorKind::Resync(format!(
            "peer byte counter {option_flag} is behind our own received count {bytes_received} (delta {delta})"
        ))));
    } else {
        0
    };

    let decrypted = record.unpack(payload)?;
    if decrypted != expected_peer_secret_id {
        log::warn!("resync abort: peer identity mismatch");
        return Err(SessionError::critical(ErrorKind::Resync("peer identity mismatch during resync".to_string())));
    }

    log::info!("resync complete, recv_cipher advanced by {advanced_by} bytes");
    Ok(ResyncOutcome { advanced_by })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Profile;
    use dtm_crypto::adapter;

    fn paired_layers() -> (RecordLayer, RecordLayer) {
        let (key_a, iv_a) = adapter::derive_fresh_sym_key();
        let (key_b, iv_b) = adapter::derive_fresh_sym_key();
        let profile = Profile::none();
        let a = RecordLayer::new(adapter::cipher_init(&key_a, &iv_a).unwrap(), adapter::cipher_init(&key_b, &iv_b).unwrap(), &profile);
        let b = RecordLayer::new(adapter::cipher_init(&key_b, &iv_b).unwrap(), adapter::cipher_init(&key_a, &iv_a).unwrap(), &profile);
        (a, b)
    }

    #[test]
    fn aligned_resync_round_trips_identity() {
        let (mut initiator, mut responder) = paired_layers();
        let secret_id = b"peer-secret-id".to_vec();

        let response = build_response(&mut responder, &secret_id, PadBounds::default());
        let outcome = accept_response(&mut initiator, response.option_flag, &response.payload, &secret_id).unwrap();
        assert_eq!(outcome.advanced_by, 0);
    }

    #[test]
    fn positive_delta_advances_recv_cipher_to_match() {
        let (mut initiator, mut responder) = paired_layers();
        let secret_id = b"peer-secret-id".to_vec();

        // Responder sent bytes the initiator never observed (simulated loss).
        let lost = responder.pack(b"dropped on the wire");
        let _ = lost;

        let response = build_response(&mut responder, &secret_id, PadBounds::default());
        let outcome = accept_response(&mut initiator, response.option_flag, &response.payload, &secret_id).unwrap();
        assert!(outcome.advanced_by > 0);

        // Keystreams are aligned again: a fresh message round-trips.
        let packed = responder.pack(b"back in sync");
        let plain = initiator.unpack(&packed).unwrap();
        assert_eq!(plain, b"back in sync");
    }

    #[test]
    fn negative_delta_aborts() {
        let (mut initiator, mut responder) = paired_layers();
        let secret_id = b"peer-secret-id".to_vec();

        // Initiator has observed more bytes than the responder claims to
        // have sent: responder's counter is behind, which must abort.
        let extra = responder.pack(b"phantom bytes");
        initiator.unpack(&extra).unwrap();

        let response = build_response(&mut responder, &secret_id, PadBounds::default());
        let result = accept_response(&mut initiator, response.option_flag, &response.payload, &secret_id);
        assert!(result.is_err());
        assert!(result.unwrap_err().is_fatal());
    }

    #[test]
    fn identity_mismatch_aborts() {
        let (mut initiator, mut responder) = paired_layers();
        let response = build_response(&mut responder, b"real-secret-id", PadBounds::default());
        let result = accept_response(&mut initiator, response.option_flag, &response.payload, b"wrong-secret-id");
        assert!(result.is_err());
        assert!(result.unwrap_err().is_fatal());
    }
}
