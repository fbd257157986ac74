//! Error taxonomy.
//!
//! Grounded on `layer-client/src/errors.rs`'s hand-rolled `Display`/`Error`
//! enums — no `thiserror`.

/// Severity classification surfaced via `on_session_error`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorSeverity {
    /// Transient, recoverable locally.
    Warning,
    /// The underlying byte stream is degraded; reconnect may be attempted.
    Connection,
    /// Keystream desynchronization suspected; a Resync is attempted.
    DataLoss,
    /// Always terminates the session.
    Critical,
}

/// What went wrong, independent of severity.
#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    /// A socket read/write failed.
    Io(String),
    /// An inbound packet failed to parse.
    Parse(String),
    /// A handshake stage failed (bad size, decrypt failure, cancel flag, timeout).
    Handshake(String),
    /// Decryption or unwrap of a Message or Service payload failed.
    Decrypt(String),
    /// The Resync protocol detected or failed to resolve a byte-count mismatch.
    Resync(String),
    /// A resource budget was exceeded (payload size, retransmit attempts).
    ResourceExceeded(String),
    /// The peer explicitly refused or terminated the session.
    PeerTerminated(String),
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(s) => write!(f, "I/O error: {s}"),
            Self::Parse(s) => write!(f, "parse error: {s}"),
            Self::Handshake(s) => write!(f, "handshake error: {s}"),
            Self::Decrypt(s) => write!(f, "decrypt error: {s}"),
            Self::Resync(s) => write!(f, "resync error: {s}"),
            Self::ResourceExceeded(s) => write!(f, "resource exceeded: {s}"),
            Self::PeerTerminated(s) => write!(f, "peer terminated: {s}"),
        }
    }
}

/// A session-level error, tagged with its severity.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionError {
    pub kind: ErrorKind,
    pub severity: ErrorSeverity,
}

impl SessionError {
    pub fn new(kind: ErrorKind, severity: ErrorSeverity) -> Self {
        Self { kind, severity }
    }

    pub fn warning(kind: ErrorKind) -> Self {
        Self::new(kind, ErrorSeverity::Warning)
    }
    pub fn connection(kind: ErrorKind) -> Self {
        Self::new(kind, ErrorSeverity::Connection)
    }
    pub fn data_loss(kind: ErrorKind) -> Self {
        Self::new(kind, ErrorSeverity::DataLoss)
    }
    pub fn critical(kind: ErrorKind) -> Self {
        Self::new(kind, ErrorSeverity::Critical)
    }

    /// Whether this error always tears the session down.
    pub fn is_fatal(&self) -> bool {
        matches!(self.severity, ErrorSeverity::Critical)
    }
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{:?}] {}", self.severity, self.kind)
    }
}
impl std::error::Error for SessionError {}
