//! Async TCP transport for DTM packet framing.
//!
//! Grounded on `layer-client/src/transport.rs`'s `AsyncAbridged`: a thin
//! wrapper around a tokio `TcpStream` doing the minimal amount of framing
//! work needed to turn `recv` into "one more complete packet's worth of
//! bytes", generalized from abridged length-prefixing to the fixed
//! `PacketHeader`.

use std::io;
use std::net::SocketAddr;

use dtm_proto::header::{PacketHeader, HEADER_LEN};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// A DTM connection over a raw TCP byte stream.
pub struct DtmTransport {
    stream: TcpStream,
}

impl DtmTransport {
    /// Connect to `addr` as a client.
    pub async fn connect(addr: &str) -> io::Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Wrap an already-accepted server-side stream.
    pub fn from_accepted(stream: TcpStream) -> io::Result<Self> {
        stream.set_nodelay(true)?;
        Ok(Self { stream })
    }

    /// Write already-framed bytes (header + payload) to the wire.
    pub async fn send(&mut self, framed: &[u8]) -> io::Result<()> {
        self.stream.write_all(framed).await
    }

    /// Read exactly one framed packet (header + payload) off the wire.
    ///
    /// Unlike [`dtm_proto::dispatch::TransportDispatcher::ingest`], which
    /// tolerates partial chunks from an arbitrary `recv()` granularity, this
    /// reads the fixed header first and then exactly `payload_length` more
    /// bytes, since TCP gives us the freedom to ask for precisely what we
    /// need.
    pub async fn recv(&mut self) -> io::Result<Vec<u8>> {
        let mut header_bytes = [0u8; HEADER_LEN];
        self.stream.read_exact(&mut header_bytes).await?;
        let header = PacketHeader::parse(&header_bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;
        let mut payload = vec![0u8; header.payload_length as usize];
        self.stream.read_exact(&mut payload).await?;
        let mut framed = header_bytes.to_vec();
        framed.extend_from_slice(&payload);
        Ok(framed)
    }

    /// Split into owned read/write halves for independent tasks.
    pub fn into_split(self) -> (tokio::net::tcp::OwnedReadHalf, tokio::net::tcp::OwnedWriteHalf) {
        self.stream.into_split()
    }

    /// The remote peer's address, used to locate the port a file-transfer
    /// sidechannel listener advertises.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        self.stream.peer_addr()
    }
}
