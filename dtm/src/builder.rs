//! `ConnectionBuilder` — method-chaining convenience over
//! [`dtm_client::Connection::connect`]/[`dtm_client::Connection::accept`],
//! which otherwise both take five positional arguments.
//!
//! No file in the retrieval pack supplies a literal builder for this
//! domain; the chaining shape itself is grounded on `dtm_proto::Callbacks`'s
//! own `set_on_*(&mut self, f) -> &mut Self` methods, generalized here to
//! take-and-return `self` so the whole thing reads as one expression.

use dtm_client::{ClientConfig, Connection, ReconnectStrategy};
use dtm_proto::params::ParameterSet;
use dtm_proto::{Callbacks, SessionError};

/// Assembles a [`ParameterSet`], a pair of identities, a [`ClientConfig`],
/// and a [`Callbacks`] set, then drives either side of the handshake.
pub struct ConnectionBuilder {
    params: ParameterSet,
    local_public_id: Vec<u8>,
    local_secret_id: Vec<u8>,
    config: ClientConfig,
    callbacks: Callbacks,
}

impl ConnectionBuilder {
    /// Start a builder for the given session parameters and local identity.
    pub fn new(params: ParameterSet, local_public_id: Vec<u8>, local_secret_id: Vec<u8>) -> Self {
        Self { params, local_public_id, local_secret_id, config: ClientConfig::default(), callbacks: Callbacks::new() }
    }

    /// Override the default miss-tick threshold before a reconnect/fatal
    /// timeout (clamped to `1..=1024` by [`dtm_proto::keepalive::KeepAliveTracker`]).
    pub fn connection_timeout(mut self, timeout: u32) -> Self {
        self.config.connection_timeout = timeout;
        self
    }

    /// Enable reconnect-with-resync using the given strategy.
    pub fn reconnect(mut self, strategy: ReconnectStrategy) -> Self {
        self.config.reconnect = Some(strategy);
        self
    }

    /// Install `on_data_received`.
    pub fn on_data_received(mut self, f: impl FnMut(&[u8]) + Send + 'static) -> Self {
        self.callbacks.set_on_data_received(f);
        self
    }

    /// Install `on_session_established`.
    pub fn on_session_established(mut self, f: impl FnMut(&dtm_crypto::CipherCtx, &dtm_crypto::CipherCtx) + Send + 'static) -> Self {
        self.callbacks.set_on_session_established(f);
        self
    }

    /// Install `on_session_error`.
    pub fn on_session_error(mut self, f: impl FnMut(&SessionError, &mut bool) + Send + 'static) -> Self {
        self.callbacks.set_on_session_error(f);
        self
    }

    /// Install `on_file_request`.
    pub fn on_file_request(mut self, f: impl FnMut(&str, &mut Option<String>, &mut bool) + Send + 'static) -> Self {
        self.callbacks.set_on_file_request(f);
        self
    }

    /// Install `on_progress`.
    pub fn on_progress(mut self, f: impl FnMut(f64) + Send + 'static) -> Self {
        self.callbacks.set_on_progress(f);
        self
    }

    /// Escape hatch for callbacks this builder doesn't wrap directly.
    pub fn callbacks(mut self, f: impl FnOnce(&mut Callbacks)) -> Self {
        f(&mut self.callbacks);
        self
    }

    /// Dial `addr` as the active connector and run the handshake.
    pub async fn connect(self, addr: &str) -> Result<Connection, SessionError> {
        Connection::connect(addr, self.params, self.local_public_id, self.local_secret_id, self.config, self.callbacks).await
    }

    /// Wrap an already-accepted stream and run the handshake as the passive side.
    pub async fn accept(self, stream: tokio::net::TcpStream) -> Result<Connection, SessionError> {
        Connection::accept(stream, self.params, self.local_public_id, self.local_secret_id, self.config, self.callbacks).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dtm_proto::params::catalog;

    #[test]
    fn builder_chains_without_connecting() {
        let _builder = ConnectionBuilder::new(catalog::x41rnt1r1(), b"alice".to_vec(), b"alice-secret".to_vec())
            .connection_timeout(5)
            .on_data_received(|_| {})
            .on_progress(|_| {});
    }
}
