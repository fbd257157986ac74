//! `FileTransferSidechannel`: a per-file counter-mode cipher negotiated over
//! the main channel, then streamed over its own dedicated TCP connection so
//! a large transfer never blocks ordinary Message traffic.
//!
//! Grounded on `layer-client/src/media.rs`'s `UploadedFile`/`DownloadIter`
//! chunked transfer shape, adapted from HTTP-style chunked upload to a raw
//! counter-mode-ciphered TCP stream. The file-transfer map is serialized by
//! a dedicated mutex; cross-task communication goes through channels, not
//! shared mutation.

use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dtm_crypto::adapter;
use dtm_crypto::cipher::{CipherCtx, IV_SIZE, KEY_SIZE};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};

/// Streaming chunk size for both directions.
const CHUNK_SIZE: usize = 64 * 1024;

/// Combined key+iv length carried alongside a `FileInfo` in a `Transfer/Request`.
pub const KEY_IV_LEN: usize = KEY_SIZE + IV_SIZE;

fn cipher_err(e: dtm_crypto::cipher::CipherError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
}

/// `FileInfo` — the proposal carried in a `Transfer/Request` payload.
#[derive(Clone, Debug, PartialEq)]
pub struct FileInfo {
    /// The file's name as advertised to the peer (not a full path).
    pub name: String,
    /// Total file length in bytes.
    pub length: u64,
    /// Port the sender's listener is bound to for this transfer.
    pub port: u16,
}

impl FileInfo {
    /// Serialize: `name_len:u16 le || name || length:u64 le || port:u16 le`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let name_bytes = self.name.as_bytes();
        let mut out = Vec::with_capacity(2 + name_bytes.len() + 8 + 2);
        out.extend_from_slice(&(name_bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(name_bytes);
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&self.port.to_le_bytes());
        out
    }

    /// Parse the layout written by [`to_bytes`], returning `(info, rest)`
    /// where `rest` is whatever trails the fixed fields — the key+iv,
    /// concatenated after the serialized `FileInfo`.
    pub fn from_bytes(buf: &[u8]) -> Option<(Self, &[u8])> {
        if buf.len() < 2 {
            return None;
        }
        let name_len = u16::from_le_bytes([buf[0], buf[1]]) as usize;
        let mut pos = 2;
        if buf.len() < pos + name_len + 8 + 2 {
            return None;
        }
        let name = String::from_utf8(buf[pos..pos + name_len].to_vec()).ok()?;
        pos += name_len;
        let length = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
        pos += 8;
        let port = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap());
        pos += 2;
        Some((Self { name, length, port }, &buf[pos..]))
    }
}

/// Which side of a transfer a [`TransferEntry`] is serving.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileRole {
    /// This side is streaming the file out.
    Send,
    /// This side is streaming the file in.
    Receive,
}

struct TransferEntry {
    cipher: CipherCtx,
    role: FileRole,
    progress: f64,
}

/// `on_progress(fraction)` hook, invoked from the background transfer task
/// as each chunk completes.
pub type ProgressHook = Arc<dyn Fn(u64, f64) + Send + Sync>;

/// Outcome of a background transfer task, delivered to the driver over a
/// channel rather than shared mutation.
#[derive(Clone, Debug)]
pub enum TransferEvent {
    /// The transfer finished; `on_file_sent`/`on_file_received` and a
    /// protocol-level `Transfer/Received` ack (receiver only) are the
    /// driver's responsibility.
    Completed { file_id: u64, role: FileRole },
    /// The transfer failed after being accepted; surfaces as a `Warning` —
    /// a single transfer aborting doesn't take the session down.
    Failed { file_id: u64, role: FileRole, error: String },
}

/// The process-wide-in-spirit (here: per-session) file-transfer map plus its
/// listener/connector bookkeeping.
pub struct FileTransferSidechannel {
    map: Arc<Mutex<HashMap<u64, TransferEntry>>>,
    counter: AtomicU64,
    events_tx: mpsc::UnboundedSender<TransferEvent>,
}

impl FileTransferSidechannel {
    /// Build a sidechannel and the receiving half of its event channel.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        (Self { map: Arc::new(Mutex::new(HashMap::new())), counter: AtomicU64::new(1), events_tx }, events_rx)
    }

    /// Number of transfers currently tracked (send or receive).
    pub async fn pending(&self) -> usize {
        self.map.lock().await.len()
    }

    /// Fraction complete for an in-flight transfer, if tracked.
    pub async fn progress(&self, file_id: u64) -> Option<f64> {
        self.map.lock().await.get(&file_id).map(|e| e.progress)
    }

    /// Drop a transfer's map entry without waiting for it to finish: a
    /// failure always results in map cleanup.
    pub async fn cancel(&self, file_id: u64) {
        self.map.lock().await.remove(&file_id);
    }

    /// `SendFile(path)`: allocate a file id and listening port,
    /// generate a fresh per-file key, and spawn the task that streams the
    /// file once a peer connects. Returns the `file_id`, the `FileInfo`, and
    /// the key+iv bytes the caller wraps/encrypts under the main
    /// `send_cipher` as the `Transfer/Request` payload.
    pub async fn begin_send(
        &self,
        path: impl AsRef<Path>,
        progress_cb: Option<ProgressHook>,
    ) -> io::Result<(u64, FileInfo, [u8; KEY_IV_LEN])> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path).await?;
        let length = metadata.len();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "file".to_string());

        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();

        let (key, iv) = adapter::derive_fresh_sym_key();
        let cipher = adapter::cipher_init(&key, &iv).map_err(cipher_err)?;
        let file_id = self.counter.fetch_add(1, Ordering::SeqCst);
        self.map.lock().await.insert(file_id, TransferEntry { cipher, role: FileRole::Send, progress: 0.0 });

        let map = self.map.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = serve_send(listener, file_id, &path, length, &map, progress_cb.as_ref()).await;
            map.lock().await.remove(&file_id);
            let event = match result {
                Ok(()) => TransferEvent::Completed { file_id, role: FileRole::Send },
                Err(e) => TransferEvent::Failed { file_id, role: FileRole::Send, error: e.to_string() },
            };
            let _ = events_tx.send(event);
        });

        let mut key_iv = [0u8; KEY_IV_LEN];
        key_iv[..KEY_SIZE].copy_from_slice(&key);
        key_iv[KEY_SIZE..].copy_from_slice(&iv);
        Ok((file_id, FileInfo { name, length, port }, key_iv))
    }

    /// Accept an inbound `Transfer/Request`: instantiate the per-file
    /// cipher from the peer's key, connect to their listener, and spawn the
    /// task that receives the file into `dest`.
    pub async fn begin_receive(
        &self,
        file_id: u64,
        peer_ip: IpAddr,
        info: FileInfo,
        key_iv: [u8; KEY_IV_LEN],
        dest: impl AsRef<Path>,
        progress_cb: Option<ProgressHook>,
    ) -> io::Result<()> {
        let dest = dest.as_ref().to_path_buf();
        let key = &key_iv[..KEY_SIZE];
        let iv = &key_iv[KEY_SIZE..];
        let cipher = adapter::cipher_init(key, iv).map_err(cipher_err)?;
        self.map.lock().await.insert(file_id, TransferEntry { cipher, role: FileRole::Receive, progress: 0.0 });

        let addr = SocketAddr::new(peer_ip, info.port);
        let map = self.map.clone();
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            let result = serve_receive(addr, file_id, info.length, &dest, &map, progress_cb.as_ref()).await;
            map.lock().await.remove(&file_id);
            let event = match result {
                Ok(()) => TransferEvent::Completed { file_id, role: FileRole::Receive },
                Err(e) => TransferEvent::Failed { file_id, role: FileRole::Receive, error: e.to_string() },
            };
            let _ = events_tx.send(event);
        });
        Ok(())
    }
}

async fn serve_send(
    listener: TcpListener,
    file_id: u64,
    path: &Path,
    length: u64,
    map: &Arc<Mutex<HashMap<u64, TransferEntry>>>,
    progress_cb: Option<&ProgressHook>,
) -> io::Result<()> {
    let (mut stream, _) = listener.accept().await?;
    let mut file = tokio::fs::File::open(path).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut sent = 0u64;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        {
            let mut guard = map.lock().await;
            let entry = guard
                .get_mut(&file_id)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "transfer cancelled"))?;
            entry.cipher.transform(&mut buf[..n]);
        }
        stream.write_all(&buf[..n]).await?;
        sent += n as u64;
        update_progress(map, file_id, fraction(sent, length), progress_cb).await;
    }

    Ok(())
}

async fn serve_receive(
    addr: SocketAddr,
    file_id: u64,
    length: u64,
    dest: &Path,
    map: &Arc<Mutex<HashMap<u64, TransferEntry>>>,
    progress_cb: Option<&ProgressHook>,
) -> io::Result<()> {
    let mut stream = TcpStream::connect(addr).await?;
    let mut out = tokio::fs::File::create(dest).await?;
    let mut buf = vec![0u8; CHUNK_SIZE];
    let mut received = 0u64;

    while received < length {
        let want = (length - received).min(CHUNK_SIZE as u64) as usize;
        let n = stream.read(&mut buf[..want]).await?;
        if n == 0 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "peer closed mid-transfer"));
        }
        {
            let mut guard = map.lock().await;
            let entry = guard
                .get_mut(&file_id)
                .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "transfer cancelled"))?;
            entry.cipher.transform(&mut buf[..n]);
        }
        out.write_all(&buf[..n]).await?;
        received += n as u64;
        update_progress(map, file_id, fraction(received, length), progress_cb).await;
    }

    Ok(())
}

fn fraction(done: u64, total: u64) -> f64 {
    if total == 0 {
        1.0
    } else {
        done as f64 / total as f64
    }
}

async fn update_progress(
    map: &Arc<Mutex<HashMap<u64, TransferEntry>>>,
    file_id: u64,
    fraction: f64,
    progress_cb: Option<&ProgressHook>,
) {
    if let Some(entry) = map.lock().await.get_mut(&file_id) {
        entry.progress = fraction;
    }
    if let Some(cb) = progress_cb {
        cb(file_id, fraction);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn file_info_roundtrip() {
        let info = FileInfo { name: "report.pdf".to_string(), length: 123456, port: 5151 };
        let mut bytes = info.to_bytes();
        bytes.extend_from_slice(&[0xAAu8; KEY_IV_LEN]);
        let (back, rest) = FileInfo::from_bytes(&bytes).unwrap();
        assert_eq!(back, info);
        assert_eq!(rest, [0xAAu8; KEY_IV_LEN]);
    }

    #[test]
    fn file_info_rejects_truncated_buffer() {
        assert!(FileInfo::from_bytes(&[0, 0]).is_none());
    }

    #[tokio::test]
    async fn send_then_receive_roundtrips_file_contents() {
        let dir = std::env::temp_dir().join(format!("dtm-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let src = dir.join("source.bin");
        let payload = vec![0x42u8; 300_000];
        {
            let mut f = std::fs::File::create(&src).unwrap();
            f.write_all(&payload).unwrap();
        }
        let dest = dir.join("dest.bin");

        let (sender, mut sender_events) = FileTransferSidechannel::new();
        let (receiver, mut receiver_events) = FileTransferSidechannel::new();

        let (file_id, info, key_iv) = sender.begin_send(&src, None).await.unwrap();
        assert_eq!(info.length, payload.len() as u64);

        receiver
            .begin_receive(file_id, std::net::IpAddr::from([127, 0, 0, 1]), info, key_iv, &dest, None)
            .await
            .unwrap();

        let sent_event = sender_events.recv().await.unwrap();
        assert!(matches!(sent_event, TransferEvent::Completed { role: FileRole::Send, .. }));
        let recv_event = receiver_events.recv().await.unwrap();
        assert!(matches!(recv_event, TransferEvent::Completed { role: FileRole::Receive, .. }));

        let written = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(written, payload);

        assert_eq!(sender.pending().await, 0);
        assert_eq!(receiver.pending().await, 0);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
