//! Async connection driver: runs the nine-stage handshake over a raw
//! `DtmTransport`, then hands the established channel off to a transport
//! read task, a keepalive task, and the file-transfer sidechannel.
//!
//! Grounded on `layer-client/src/lib.rs`'s top-level `Connection` type: one
//! struct gluing together a socket, a session, and a set of background
//! tasks, with ownership split so a single "transmission mutex" serializes
//! writes and the socket's read half is touched only by the reader task it
//! was handed to.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, Mutex};

use dtm_proto::dispatch::DispatchAction;
use dtm_proto::error::{ErrorKind, ErrorSeverity, SessionError};
use dtm_proto::header::{ExchangeFlag, HEADER_LEN, MessageFlag, PacketHeader, PacketType, ServiceFlag, TransferFlag};
use dtm_proto::params::ParameterSet;
use dtm_proto::resync;
use dtm_proto::{Callbacks, KeepAliveAction, Role, SessionState};

use crate::file_transfer::{FileInfo, FileRole, FileTransferSidechannel, TransferEvent, KEY_IV_LEN};
use crate::reconnect::ReconnectStrategy;
use crate::throttle;
use crate::transport::DtmTransport;

/// Knobs that aren't part of the negotiated `ParameterSet` — connection-level
/// rather than session-level configuration.
pub struct ClientConfig {
    /// Miss-tick threshold before a reconnect/fatal timeout.
    pub connection_timeout: u32,
    /// How to obtain a fresh byte stream after the old one dies. `None`
    /// disables reconnect entirely.
    pub reconnect: Option<ReconnectStrategy>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { connection_timeout: 10, reconnect: None }
    }
}

struct Shared {
    state: Mutex<SessionState>,
    write_half: Mutex<OwnedWriteHalf>,
    callbacks: Mutex<Callbacks>,
    transfers: FileTransferSidechannel,
    profile: dtm_proto::params::Profile,
    peer_addr: Mutex<std::net::SocketAddr>,
    reconnect: Option<ReconnectStrategy>,
    alive: Mutex<bool>,
}

/// A cheap, cloneable handle to a live DTM connection: a handshake already
/// completed, a reader task and a keepalive task already running.
#[derive(Clone)]
pub struct Connection {
    shared: Arc<Shared>,
}

async fn run_handshake(
    transport: &mut DtmTransport,
    state: &mut SessionState,
    callbacks: &mut Callbacks,
) -> Result<(), SessionError> {
    let mut send_seq = 0u64;
    for stage in ExchangeFlag::ORDER {
        let delay_ms = state.exchange_mut().pre_send_delay_ms(stage);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        }

        let payload = state.exchange_mut().build_outbound()?;
        let header = PacketHeader::new(PacketType::Exchange, stage as u16, send_seq, payload.len() as u32, 0);
        send_seq += 1;
        let mut framed = header.to_bytes().to_vec();
        framed.extend_from_slice(&payload);
        transport.send(&framed).await.map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;

        let inbound = transport.recv().await.map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;
        let in_header = PacketHeader::parse(&inbound).map_err(|e| SessionError::critical(ErrorKind::Parse(e.to_string())))?;
        let in_stage = ExchangeFlag::from_u16(in_header.packet_flag)
            .ok_or_else(|| SessionError::critical(ErrorKind::Parse("unrecognized exchange stage".to_string())))?;
        state.exchange_mut().accept_inbound(in_stage, &inbound[HEADER_LEN..], callbacks)?;
    }
    Ok(())
}

impl Connection {
    /// Dial `addr`, run the handshake as the active connector, and start the
    /// background tasks. `callbacks` is consumed; install every handler
    /// before calling this.
    pub async fn connect(
        addr: &str,
        params: ParameterSet,
        local_public_id: Vec<u8>,
        local_secret_id: Vec<u8>,
        config: ClientConfig,
        callbacks: Callbacks,
    ) -> Result<Self, SessionError> {
        let transport = DtmTransport::connect(addr)
            .await
            .map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;
        let peer_addr = transport.peer_addr().map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;
        Self::finish(transport, Role::Client, params, local_public_id, local_secret_id, config, callbacks, peer_addr).await
    }

    /// Wrap an already-accepted stream, run the handshake as the passive
    /// side, and start the background tasks.
    pub async fn accept(
        stream: tokio::net::TcpStream,
        params: ParameterSet,
        local_public_id: Vec<u8>,
        local_secret_id: Vec<u8>,
        config: ClientConfig,
        callbacks: Callbacks,
    ) -> Result<Self, SessionError> {
        let peer_addr = stream.peer_addr().map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;
        let transport = DtmTransport::from_accepted(stream).map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;
        Self::finish(transport, Role::Server, params, local_public_id, local_secret_id, config, callbacks, peer_addr).await
    }

    async fn finish(
        mut transport: DtmTransport,
        role: Role,
        params: ParameterSet,
        local_public_id: Vec<u8>,
        local_secret_id: Vec<u8>,
        config: ClientConfig,
        mut callbacks: Callbacks,
        peer_addr: std::net::SocketAddr,
    ) -> Result<Self, SessionError> {
        let profile = params.profile;
        let mut state = SessionState::new(role, params, local_public_id, local_secret_id, config.connection_timeout, config.reconnect.is_some());

        run_handshake(&mut transport, &mut state, &mut callbacks).await?;
        state.promote_to_established(&profile)?;
        if let Some(record) = state.record() {
            let (send_cipher, recv_cipher) = record.ciphers();
            callbacks.fire_session_established(send_cipher, recv_cipher);
        }

        let (transfers, transfer_events) = FileTransferSidechannel::new();
        let (read_half, write_half) = transport.into_split();

        let shared = Arc::new(Shared {
            state: Mutex::new(state),
            write_half: Mutex::new(write_half),
            callbacks: Mutex::new(callbacks),
            transfers,
            profile,
            peer_addr: Mutex::new(peer_addr),
            reconnect: config.reconnect,
            alive: Mutex::new(true),
        });

        let conn = Self { shared };
        conn.spawn_reader(read_half);
        conn.spawn_keepalive();
        conn.spawn_transfer_event_pump(transfer_events);

        Ok(conn)
    }

    /// Send application data through the record layer.
    pub async fn send(&self, plaintext: &[u8]) -> Result<(), SessionError> {
        let packed = {
            let mut state = self.shared.state.lock().await;
            let record = state
                .record()
                .ok_or_else(|| SessionError::connection(ErrorKind::Handshake("not yet established".to_string())))?;
            record.pack(plaintext)
        };
        self.transmit(PacketType::Message, MessageFlag::Transmission as u16, 0, &packed).await
    }

    /// Cryptographic byte counters (`bytes_sent`, `bytes_received`) that
    /// anchor Resync. `(0, 0)` before establishment.
    pub async fn byte_counters(&self) -> (u64, u64) {
        let mut state = self.shared.state.lock().await;
        match state.record() {
            Some(record) => (record.bytes_sent(), record.bytes_received()),
            None => (0, 0),
        }
    }

    /// Propose sending a local file. Returns the `file_id`.
    pub async fn send_file(&self, path: impl AsRef<std::path::Path>) -> Result<u64, SessionError> {
        let cb = self.shared.clone();
        let progress_hook: crate::file_transfer::ProgressHook = Arc::new(move |_file_id, fraction| {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.callbacks.lock().await.fire_progress(fraction);
            });
        });
        let (file_id, info, key_iv) = self
            .shared
            .transfers
            .begin_send(path, Some(progress_hook))
            .await
            .map_err(|e| SessionError::connection(ErrorKind::Io(e.to_string())))?;

        let mut body = info.to_bytes();
        body.extend_from_slice(&key_iv);
        let packed = {
            let mut state = self.shared.state.lock().await;
            let record = state
                .record()
                .ok_or_else(|| SessionError::connection(ErrorKind::Handshake("not yet established".to_string())))?;
            record.pack(&body)
        };
        self.transmit(PacketType::Transfer, TransferFlag::Request as u16, file_id, &packed).await?;
        Ok(file_id)
    }

    /// Request a graceful teardown: emit `Service/Terminate` and stop the
    /// background tasks from processing further inbound traffic.
    pub async fn teardown(&self, reason: &str) -> Result<(), SessionError> {
        *self.shared.alive.lock().await = false;
        let result = self.transmit(PacketType::Service, ServiceFlag::Terminate as u16, 0, reason.as_bytes()).await;
        self.shared.state.lock().await.teardown();
        result
    }

    async fn transmit(&self, packet_type: PacketType, flag: u16, option_flag: u64, payload: &[u8]) -> Result<(), SessionError> {
        if !*self.shared.alive.lock().await {
            return Err(SessionError::connection(ErrorKind::PeerTerminated("local session torn down".to_string())));
        }

        let framed = {
            let mut state = self.shared.state.lock().await;
            state.outbound().frame(packet_type, flag, option_flag, payload)
        };

        let write_half = &self.shared.write_half;
        let result = throttle::with_backoff(|| async {
            let mut w = write_half.lock().await;
            w.write_all(&framed).await
        })
        .await;

        match result {
            Ok(()) => {
                self.shared.callbacks.lock().await.fire_packet_sent(flag, payload.len());
                Ok(())
            }
            Err(e) => Err(SessionError::connection(ErrorKind::Io(e.to_string()))),
        }
    }

    async fn transmit_service(&self, flag: ServiceFlag, option_flag: u64, payload: &[u8]) -> Result<(), SessionError> {
        self.transmit(PacketType::Service, flag as u16, option_flag, payload).await
    }

    fn spawn_reader(&self, read_half: OwnedReadHalf) {
        let conn = self.clone();
        tokio::spawn(async move { conn.run_reader(read_half).await });
    }

    async fn run_reader(&self, mut read_half: OwnedReadHalf) {
        use tokio::io::AsyncReadExt;
        let mut dispatcher = dtm_proto::dispatch::TransportDispatcher::new();
        let mut buf = vec![0u8; 64 * 1024];

        loop {
            let n = match read_half.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(_) => break,
            };

            let mut actions = dispatcher.ingest(&buf[..n]);
            actions.extend(dispatcher.drain());
            for action in actions {
                if self.handle_action(action).await.is_break() {
                    return;
                }
            }
        }

        self.report_error(SessionError::connection(ErrorKind::Io("transport read loop ended".to_string()))).await;
    }

    async fn handle_action(&self, action: DispatchAction) -> std::ops::ControlFlow<()> {
        match action {
            DispatchAction::Exchange { .. } => {
                // Handshake is already complete by the time the reader task
                // runs; a stray Exchange packet here indicates a confused
                // peer, not a recoverable condition.
                self.report_error(SessionError::critical(ErrorKind::Handshake("exchange packet after establishment".to_string()))).await;
                std::ops::ControlFlow::Break(())
            }
            DispatchAction::Message { sequence, payload } => {
                self.shared.callbacks.lock().await.fire_packet_received(MessageFlag::Transmission as u16, payload.len());
                let unpacked = {
                    let mut state = self.shared.state.lock().await;
                    state.record().expect("established").unpack(&payload)
                };
                match unpacked {
                    Ok(plain) => {
                        self.shared.callbacks.lock().await.fire_data_received(&plain);
                        let _ = self.transmit_service(ServiceFlag::Echo, sequence, &[]).await;
                        std::ops::ControlFlow::Continue(())
                    }
                    Err(e) => {
                        self.report_error(e).await;
                        std::ops::ControlFlow::Continue(())
                    }
                }
            }
            DispatchAction::Service { flag, sequence, option_flag, payload } => self.handle_service(flag, sequence, option_flag, payload).await,
            DispatchAction::Transfer { flag, option_flag, payload, .. } => self.handle_transfer(flag, option_flag, payload).await,
            DispatchAction::RequestResend { sequence } => {
                let _ = self.transmit_service(ServiceFlag::Resend, sequence, &[]).await;
                std::ops::ControlFlow::Continue(())
            }
        }
    }

    async fn handle_service(&self, flag: ServiceFlag, sequence: u64, option_flag: u64, payload: Vec<u8>) -> std::ops::ControlFlow<()> {
        self.shared.callbacks.lock().await.fire_packet_received(flag as u16, payload.len());
        match flag {
            ServiceFlag::KeepAlive => {
                self.shared.state.lock().await.keepalive().reset();
                std::ops::ControlFlow::Continue(())
            }
            ServiceFlag::Echo => {
                self.shared.state.lock().await.outbound().acknowledge(option_flag);
                std::ops::ControlFlow::Continue(())
            }
            ServiceFlag::Resend => {
                let replay = {
                    let mut state = self.shared.state.lock().await;
                    state.outbound().replay(option_flag).map(|b| b.to_vec())
                };
                match replay {
                    Some(framed) => {
                        let mut w = self.shared.write_half.lock().await;
                        let _ = w.write_all(&framed).await;
                        std::ops::ControlFlow::Continue(())
                    }
                    None => {
                        let _ = self.transmit_service(ServiceFlag::DataLost, 0, &[]).await;
                        std::ops::ControlFlow::Continue(())
                    }
                }
            }
            ServiceFlag::DataLost => {
                tracing::info!("peer reported DataLost, building Resync response");
                let response = {
                    let mut state = self.shared.state.lock().await;
                    let secret_id = state.local_secret_id().to_vec();
                    let bounds = self.shared.profile.auth_bounds();
                    let record = state.record().expect("established");
                    resync::build_response(record, &secret_id, bounds)
                };
                let _ = self.transmit_service(ServiceFlag::Resync, response.option_flag, &response.payload).await;
                std::ops::ControlFlow::Continue(())
            }
            ServiceFlag::Resync => {
                let outcome = {
                    let mut state = self.shared.state.lock().await;
                    let expected = state.peer_secret_id().map(|s| s.to_vec());
                    match expected {
                        Some(expected) => {
                            let record = state.record().expect("established");
                            resync::accept_response(record, option_flag, &payload, &expected)
                        }
                        None => Err(SessionError::critical(ErrorKind::Resync("peer identity not yet known".to_string()))),
                    }
                };
                match outcome {
                    Ok(outcome) => {
                        tracing::info!(advanced_by = outcome.advanced_by, "resync complete");
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "resync failed");
                        self.report_error(e).await;
                        return std::ops::ControlFlow::Break(());
                    }
                }
                std::ops::ControlFlow::Continue(())
            }
            ServiceFlag::Refusal | ServiceFlag::Terminate => {
                let reason = String::from_utf8_lossy(&payload).to_string();
                self.report_error(SessionError::critical(ErrorKind::PeerTerminated(reason))).await;
                std::ops::ControlFlow::Break(())
            }
            _ => std::ops::ControlFlow::Continue(()),
        }
    }

    async fn handle_transfer(&self, flag: TransferFlag, file_id: u64, payload: Vec<u8>) -> std::ops::ControlFlow<()> {
        match flag {
            TransferFlag::Request => {
                let plain = {
                    let mut state = self.shared.state.lock().await;
                    state.record().expect("established").unpack(&payload)
                };
                let plain = match plain {
                    Ok(p) => p,
                    Err(e) => {
                        self.report_error(e).await;
                        return std::ops::ControlFlow::Continue(());
                    }
                };
                let Some((info, key_iv_slice)) = FileInfo::from_bytes(&plain) else {
                    self.report_error(SessionError::warning(ErrorKind::Parse("malformed Transfer/Request payload".to_string()))).await;
                    return std::ops::ControlFlow::Continue(());
                };
                if key_iv_slice.len() != KEY_IV_LEN {
                    self.report_error(SessionError::warning(ErrorKind::Parse("truncated transfer key material".to_string()))).await;
                    return std::ops::ControlFlow::Continue(());
                }
                let mut key_iv = [0u8; KEY_IV_LEN];
                key_iv.copy_from_slice(key_iv_slice);

                let (dest, cancelled) = self.shared.callbacks.lock().await.fire_file_request(&info.name);
                match dest {
                    Some(dest) if !cancelled => {
                        let peer_ip = self.shared.peer_addr.lock().await.ip();
                        if self.shared.transfers.begin_receive(file_id, peer_ip, info, key_iv, dest, None).await.is_err() {
                            let _ = self.transmit(PacketType::Transfer, TransferFlag::Refused as u16, file_id, &[]).await;
                        }
                    }
                    _ => {
                        let _ = self.transmit(PacketType::Transfer, TransferFlag::Refused as u16, file_id, &[]).await;
                    }
                }
                std::ops::ControlFlow::Continue(())
            }
            TransferFlag::Refused => {
                self.shared.transfers.cancel(file_id).await;
                std::ops::ControlFlow::Continue(())
            }
            TransferFlag::Received => {
                self.shared.transfers.cancel(file_id).await;
                self.shared.callbacks.lock().await.fire_file_sent(file_id);
                std::ops::ControlFlow::Continue(())
            }
        }
    }

    /// Drains file-transfer completions: a finished receive
    /// sends the `Transfer/Received` ack and fires `on_file_received`; a
    /// finished send just waits for that ack to fire `on_file_sent` (see
    /// [`handle_transfer`](Self::handle_transfer)). Failures of either
    /// direction surface as a `Warning`.
    fn spawn_transfer_event_pump(&self, mut events: mpsc::UnboundedReceiver<TransferEvent>) {
        let conn = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    TransferEvent::Completed { file_id, role: FileRole::Receive } => {
                        let _ = conn.transmit(PacketType::Transfer, TransferFlag::Received as u16, file_id, &[]).await;
                        conn.shared.callbacks.lock().await.fire_file_received(file_id);
                    }
                    TransferEvent::Completed { role: FileRole::Send, .. } => {}
                    TransferEvent::Failed { error, .. } => {
                        conn.report_error(SessionError::warning(ErrorKind::Io(error))).await;
                    }
                }
            }
        });
    }

    fn spawn_keepalive(&self) {
        let conn = self.clone();
        tokio::spawn(async move { conn.run_keepalive().await });
    }

    async fn run_keepalive(&self) {
        loop {
            tokio::time::sleep(Duration::from_secs(1)).await;
            if !*self.shared.alive.lock().await {
                return;
            }
            let action = self.shared.state.lock().await.keepalive().tick();
            match action {
                std::ops::ControlFlow::Continue(KeepAliveAction::SendKeepAlive) => {
                    let _ = self.transmit_service(ServiceFlag::KeepAlive, 0, &[]).await;
                }
                std::ops::ControlFlow::Break(KeepAliveAction::AttemptReconnect) => {
                    self.attempt_reconnect().await;
                }
                // Break(ConnectionDead) is the only other action tick() ever
                // produces; the remaining type-level combinations are
                // unreachable but must be matched to stay exhaustive.
                _ => {
                    self.report_error(SessionError::critical(ErrorKind::Io("keepalive timeout, reconnect disabled".to_string()))).await;
                    *self.shared.alive.lock().await = false;
                    return;
                }
            }
        }
    }

    async fn attempt_reconnect(&self) {
        let Some(strategy) = &self.shared.reconnect else {
            self.report_error(SessionError::critical(ErrorKind::Io("reconnect requested with no strategy configured".to_string()))).await;
            *self.shared.alive.lock().await = false;
            return;
        };

        tracing::info!("keepalive miss threshold exceeded, attempting reconnect");
        match strategy.reconnect().await {
            Ok((transport, peer)) => {
                tracing::info!(%peer, "reconnect succeeded, requesting resync");
                let (read_half, write_half) = transport.into_split();
                {
                    let mut w = self.shared.write_half.lock().await;
                    *w = write_half;
                }
                {
                    let mut state = self.shared.state.lock().await;
                    state.reset_framing_for_reconnect();
                    state.keepalive().note_reconnect_success();
                }
                *self.shared.peer_addr.lock().await = peer;
                self.spawn_reader(read_half);
                let _ = self.transmit_service(ServiceFlag::DataLost, 0, &[]).await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "reconnect attempt failed");
                self.report_error(SessionError::connection(ErrorKind::Io(e.to_string()))).await;
            }
        }
    }

    async fn report_error(&self, error: SessionError) {
        let fatal = error.severity == ErrorSeverity::Critical;
        let cancelled = self.shared.callbacks.lock().await.fire_session_error(&error);
        if fatal || cancelled {
            *self.shared.alive.lock().await = false;
            self.shared.state.lock().await.teardown();
        }
    }
}

