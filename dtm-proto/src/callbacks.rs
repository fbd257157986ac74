//! Application-facing callback surface.
//!
//! A single handler object installed per session, holding the set of
//! optional callback functions — modeled here after
//! `layer-client/src/retry.rs`'s `RetryPolicy` trait-object style, but as a
//! plain struct of optional closures rather than a trait, since callbacks
//! here are one-shot installs, not swappable policies.

use dtm_crypto::CipherCtx;

use crate::error::SessionError;
use crate::header::ExchangeFlag;
use crate::identity::DtmIdentity;

/// The set of optional callbacks a session may install.
///
/// Every field defaults to `None`; a session with no callbacks installed
/// still runs correctly, it just has no observer.
#[derive(Default)]
pub struct Callbacks {
    on_connected: Option<Box<dyn FnMut() + Send>>,
    on_identity_received: Option<Box<dyn FnMut(ExchangeFlag, &DtmIdentity, &mut bool) + Send>>,
    on_packet_received: Option<Box<dyn FnMut(u16, usize) + Send>>,
    on_packet_sent: Option<Box<dyn FnMut(u16, usize) + Send>>,
    on_data_received: Option<Box<dyn FnMut(&[u8]) + Send>>,
    on_session_established: Option<Box<dyn FnMut(&CipherCtx, &CipherCtx) + Send>>,
    on_session_error: Option<Box<dyn FnMut(&SessionError, &mut bool) + Send>>,
    on_file_request: Option<Box<dyn FnMut(&str, &mut Option<String>, &mut bool) + Send>>,
    on_file_received: Option<Box<dyn FnMut(u64) + Send>>,
    on_file_sent: Option<Box<dyn FnMut(u64) + Send>>,
    on_progress: Option<Box<dyn FnMut(f64) + Send>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_connected(&mut self, f: impl FnMut() + Send + 'static) -> &mut Self {
        self.on_connected = Some(Box::new(f));
        self
    }
    pub fn set_on_identity_received(&mut self, f: impl FnMut(ExchangeFlag, &DtmIdentity, &mut bool) + Send + 'static) -> &mut Self {
        self.on_identity_received = Some(Box::new(f));
        self
    }
    pub fn set_on_packet_received(&mut self, f: impl FnMut(u16, usize) + Send + 'static) -> &mut Self {
        self.on_packet_received = Some(Box::new(f));
        self
    }
    pub fn set_on_packet_sent(&mut self, f: impl FnMut(u16, usize) + Send + 'static) -> &mut Self {
        self.on_packet_sent = Some(Box::new(f));
        self
    }
    pub fn set_on_data_received(&mut self, f: impl FnMut(&[u8]) + Send + 'static) -> &mut Self {
        self.on_data_received = Some(Box::new(f));
        self
    }
    pub fn set_on_session_established(&mut self, f: impl FnMut(&CipherCtx, &CipherCtx) + Send + 'static) -> &mut Self {
        self.on_session_established = Some(Box::new(f));
        self
    }
    pub fn set_on_session_error(&mut self, f: impl FnMut(&SessionError, &mut bool) + Send + 'static) -> &mut Self {
        self.on_session_error = Some(Box::new(f));
        self
    }
    pub fn set_on_file_request(&mut self, f: impl FnMut(&str, &mut Option<String>, &mut bool) + Send + 'static) -> &mut Self {
        self.on_file_request = Some(Box::new(f));
        self
    }
    pub fn set_on_file_received(&mut self, f: impl FnMut(u64) + Send + 'static) -> &mut Self {
        self.on_file_received = Some(Box::new(f));
        self
    }
    pub fn set_on_file_sent(&mut self, f: impl FnMut(u64) + Send + 'static) -> &mut Self {
        self.on_file_sent = Some(Box::new(f));
        self
    }
    pub fn set_on_progress(&mut self, f: impl FnMut(f64) + Send + 'static) -> &mut Self {
        self.on_progress = Some(Box::new(f));
        self
    }

    pub(crate) fn fire_connected(&mut self) {
        if let Some(f) = self.on_connected.as_mut() {
            f();
        }
    }

    /// Returns `true` if the application requested cancellation.
    pub(crate) fn fire_identity_received(&mut self, stage: ExchangeFlag, identity: &DtmIdentity) -> bool {
        let mut cancel = false;
        if let Some(f) = self.on_identity_received.as_mut() {
            f(stage, identity, &mut cancel);
        }
        cancel
    }

    /// Called by the transport driver as each packet is parsed off the wire:
    /// `on_packet_received(packet_flag, length)`.
    pub fn fire_packet_received(&mut self, flag: u16, len: usize) {
        if let Some(f) = self.on_packet_received.as_mut() {
            f(flag, len);
        }
    }

    /// Called by the transport driver once framed bytes are written to the
    /// wire: `on_packet_sent(packet_flag, length)`.
    pub fn fire_packet_sent(&mut self, flag: u16, len: usize) {
        if let Some(f) = self.on_packet_sent.as_mut() {
            f(flag, len);
        }
    }

    /// Called by the transport driver with the plaintext of every unpacked
    /// Message payload.
    pub fn fire_data_received(&mut self, payload: &[u8]) {
        if let Some(f) = self.on_data_received.as_mut() {
            f(payload);
        }
    }

    /// Called by the transport driver once [`SessionState::promote_to_established`](crate::session::SessionState::promote_to_established)
    /// produces the post-handshake cipher pair.
    pub fn fire_session_established(&mut self, send_cipher: &CipherCtx, recv_cipher: &CipherCtx) {
        if let Some(f) = self.on_session_established.as_mut() {
            f(send_cipher, recv_cipher);
        }
    }

    /// Returns `true` if the application requested cancellation.
    pub fn fire_session_error(&mut self, error: &SessionError) -> bool {
        let mut cancel = false;
        if let Some(f) = self.on_session_error.as_mut() {
            f(error, &mut cancel);
        }
        cancel
    }

    /// Returns `(destination, cancelled)`.
    pub fn fire_file_request(&mut self, name: &str) -> (Option<String>, bool) {
        let mut dest = None;
        let mut cancel = false;
        if let Some(f) = self.on_file_request.as_mut() {
            f(name, &mut dest, &mut cancel);
        }
        (dest, cancel)
    }

    /// Called by the transport driver once a receive-side transfer's
    /// `Transfer/Received` ack has been sent.
    pub fn fire_file_received(&mut self, file_id: u64) {
        if let Some(f) = self.on_file_received.as_mut() {
            f(file_id);
        }
    }

    /// Called by the transport driver once a send-side transfer's peer ack
    /// arrives.
    pub fn fire_file_sent(&mut self, file_id: u64) {
        if let Some(f) = self.on_file_sent.as_mut() {
            f(file_id);
        }
    }

    /// Called by the file-transfer sidechannel as each chunk completes.
    pub fn fire_progress(&mut self, fraction: f64) {
        if let Some(f) = self.on_progress.as_mut() {
            f(fraction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{DtmSession, ParameterSet};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn callbacks_fire_and_can_cancel() {
        let mut cb = Callbacks::new();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        cb.set_on_identity_received(move |_stage, _id, cancel| {
            fired2.store(true, Ordering::SeqCst);
            *cancel = true;
        });

        let identity = DtmIdentity::new(vec![1, 2], ParameterSet::zero_pke_id(), DtmSession::default_aes256_ctr());
        let cancelled = cb.fire_identity_received(ExchangeFlag::Init, &identity);
        assert!(fired.load(Ordering::SeqCst));
        assert!(cancelled);
    }

    #[test]
    fn uninstalled_callback_is_a_no_op() {
        let mut cb = Callbacks::new();
        cb.fire_connected();
        cb.fire_progress(0.5);
    }
}
