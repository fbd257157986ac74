//! Reconnect-with-resync orchestration.
//!
//! Grounded on `layer-client`'s DC migration/reconnect flow in `lib.rs`: the
//! role-specific "how do I get a fresh byte stream" logic is isolated behind
//! a small enum so the keepalive task driving it doesn't need to know
//! whether it's a client re-dialing or a server re-accepting.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::transport::DtmTransport;

/// How to obtain a fresh byte-stream connection after the old one dies.
pub enum ReconnectStrategy {
    /// Re-dial the same address/port.
    Client { addr: String },
    /// Re-accept on the same listening socket.
    Server { listener: Arc<TcpListener> },
}

impl ReconnectStrategy {
    /// A client-side strategy that re-dials `addr`.
    pub fn for_client(addr: impl Into<String>) -> Self {
        Self::Client { addr: addr.into() }
    }

    /// A server-side strategy that re-accepts on `listener`.
    pub fn for_server(listener: Arc<TcpListener>) -> Self {
        Self::Server { listener }
    }

    /// Attempt to obtain a fresh transport. On success the caller is
    /// expected to emit `Service/DataLost` to drive a Resync.
    pub async fn reconnect(&self) -> io::Result<(DtmTransport, SocketAddr)> {
        match self {
            Self::Client { addr } => {
                let transport = DtmTransport::connect(addr).await?;
                let peer = transport.peer_addr()?;
                Ok((transport, peer))
            }
            Self::Server { listener } => {
                let (stream, peer) = listener.accept().await?;
                let transport = DtmTransport::from_accepted(stream)?;
                Ok((transport, peer))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn client_strategy_redials_and_reaches_a_listening_server() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap() });

        let strategy = ReconnectStrategy::for_client(addr.to_string());
        let (transport, peer) = strategy.reconnect().await.unwrap();
        let _ = transport;
        assert_eq!(peer, addr);
        accept.await.unwrap();
    }

    #[tokio::test]
    async fn server_strategy_reaccepts_a_new_inbound_connection() {
        let listener = Arc::new(TcpListener::bind("127.0.0.1:0").await.unwrap());
        let addr = listener.local_addr().unwrap();
        let strategy = ReconnectStrategy::for_server(listener);

        let connect = tokio::spawn(async move { tokio::net::TcpStream::connect(addr).await.unwrap() });
        let (transport, _peer) = strategy.reconnect().await.unwrap();
        let _ = transport;
        connect.await.unwrap();
    }
}
