//! `SessionState` — the per-connection state a caller threads through the
//! handshake, the established channel, and reconnects.
//!
//! Grounded on `layer-mtproto/session.rs`'s `Session`: a small struct owning
//! exactly the counters/buffers one connection needs, cheap to build and
//! explicitly resettable, rather than a long-lived god object.

use crate::dispatch::{OutboundBuffer, TransportDispatcher};
use crate::error::{ErrorKind, SessionError};
use crate::exchange::{ExchangeStateMachine, Role};
use crate::header::ExchangeFlag;
use crate::keepalive::KeepAliveTracker;
use crate::params::ParameterSet;
use crate::record::RecordLayer;

/// Everything a single DTM connection needs between the moment it starts
/// dialing/listening and the moment it's torn down.
///
/// Before [`ExchangeStage::Established`](ExchangeFlag::Established) is
/// reached, `record` is `None` and inbound/outbound Exchange packets are
/// driven through `exchange`. After establishment, `exchange` is no longer
/// consulted and all application traffic flows through `record`.
pub struct SessionState {
    role: Role,
    exchange: ExchangeStateMachine,
    record: Option<RecordLayer>,
    dispatcher: TransportDispatcher,
    outbound: OutboundBuffer,
    keepalive: KeepAliveTracker,
    local_public_id: Vec<u8>,
    local_secret_id: Vec<u8>,
}

impl SessionState {
    /// Start a fresh session at `ExchangeStage::Connect`.
    pub fn new(
        role: Role,
        params: ParameterSet,
        local_public_id: Vec<u8>,
        local_secret_id: Vec<u8>,
        connection_timeout: u32,
        reconnect_enabled: bool,
    ) -> Self {
        let exchange = ExchangeStateMachine::new(role, params, local_public_id.clone(), local_secret_id.clone());
        Self {
            role,
            exchange,
            record: None,
            dispatcher: TransportDispatcher::new(),
            outbound: OutboundBuffer::new(),
            keepalive: KeepAliveTracker::new(connection_timeout, reconnect_enabled),
            local_public_id,
            local_secret_id,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Current handshake stage, meaningful only before establishment.
    pub fn exchange_stage(&self) -> ExchangeFlag {
        self.exchange.current_stage()
    }

    pub fn is_established(&self) -> bool {
        self.record.is_some()
    }

    pub fn exchange_mut(&mut self) -> &mut ExchangeStateMachine {
        &mut self.exchange
    }

    /// Move from the handshake to the established channel once the exchange
    /// state machine reports it produced its ciphers. Idempotent no-op if
    /// already established or the exchange hasn't finished.
    pub fn promote_to_established(&mut self, profile: &crate::params::Profile) -> Result<(), SessionError> {
        if self.record.is_some() {
            return Ok(());
        }
        let (send_cipher, recv_cipher) = self
            .exchange
            .take_ciphers()
            .ok_or_else(|| SessionError::connection(ErrorKind::Handshake("exchange has not produced ciphers yet".to_string())))?;
        self.record = Some(RecordLayer::new(send_cipher, recv_cipher, profile));
        Ok(())
    }

    /// The established record layer, once available.
    pub fn record(&mut self) -> Option<&mut RecordLayer> {
        self.record.as_mut()
    }

    pub fn dispatcher(&mut self) -> &mut TransportDispatcher {
        &mut self.dispatcher
    }

    pub fn outbound(&mut self) -> &mut OutboundBuffer {
        &mut self.outbound
    }

    pub fn keepalive(&mut self) -> &mut KeepAliveTracker {
        &mut self.keepalive
    }

    pub fn local_public_id(&self) -> &[u8] {
        &self.local_public_id
    }

    pub fn local_secret_id(&self) -> &[u8] {
        &self.local_secret_id
    }

    pub fn peer_public_id(&self) -> Option<&[u8]> {
        self.exchange.peer_public_id()
    }

    pub fn peer_secret_id(&self) -> Option<&[u8]> {
        self.exchange.peer_secret_id()
    }

    /// Drop the established record layer and restart the dispatcher's
    /// sequence tracking, as happens on a reconnect that precedes a Resync:
    /// the cipher state is kept (Resync re-aligns it), only the
    /// framing-level bookkeeping resets for the fresh byte-stream.
    pub fn reset_framing_for_reconnect(&mut self) {
        self.dispatcher = TransportDispatcher::new();
        self.outbound = OutboundBuffer::new();
    }

    /// Graceful teardown: drain the send and receive buffers and drop the
    /// record layer, zeroizing `send_cipher`/`recv_cipher` in the process
    /// (`CipherCtx` zeroizes its key/iv on drop). Honors the §5/§7
    /// cancellation contract — the application's cancel flag or a critical
    /// error both route here before the session is discarded. Idempotent.
    pub fn teardown(&mut self) {
        self.dispatcher.clear();
        self.outbound.clear();
        self.record = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::catalog;

    #[test]
    fn fresh_session_starts_at_connect_and_not_established() {
        let params = catalog::x41rnt1r1();
        let session = SessionState::new(Role::Client, params, b"alice".to_vec(), b"alice-secret".to_vec(), 10, true);
        assert_eq!(session.exchange_stage(), ExchangeFlag::Connect);
        assert!(!session.is_established());
        assert!(session.peer_public_id().is_none());
    }

    #[test]
    fn promote_before_handshake_finished_errors() {
        let params = catalog::x41rnt1r1();
        let mut session = SessionState::new(Role::Server, params, b"bob".to_vec(), b"bob-secret".to_vec(), 10, true);
        let profile = crate::params::Profile::none();
        assert!(session.promote_to_established(&profile).is_err());
    }

    #[test]
    fn teardown_drops_record_and_drains_buffers() {
        use crate::header::PacketType;

        let params = catalog::x41rnt1r1();
        let mut session = SessionState::new(Role::Client, params, b"alice".to_vec(), b"alice-secret".to_vec(), 10, true);
        session.outbound().frame(PacketType::Message, 0, 0, b"unacked");
        assert_eq!(session.outbound().pending(), 1);

        session.teardown();

        assert_eq!(session.outbound().pending(), 0);
        assert!(!session.is_established());

        // Idempotent: tearing down an already-torn-down session is a no-op.
        session.teardown();
        assert_eq!(session.outbound().pending(), 0);
    }
}
