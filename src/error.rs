use thiserror::Error;

/// Errors raised while parsing flags or acquiring resources, before the event loop starts.
///
/// `main` prints the displayed message and exits non-zero; nothing past this
/// point has been allocated yet, so there is nothing to unwind.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error("--iface is required")]
    MissingInterface,

    #[error("rates must be greater than zero, got {0}")]
    NonPositiveRate(f64),

    #[error("malformed port number value \"{0}\"")]
    MalformedPort(String),

    #[error("failed to open capture handle on {iface}: {source}")]
    CaptureOpen { iface: String, source: pcap::Error },

    #[error("failed to compile BPF filter: {0}")]
    FilterCompile(#[source] pcap::Error),

    #[error("failed to create raw link-layer socket: {0}")]
    RawSocket(#[source] std::io::Error),

    #[error("interface {0:?} not found")]
    UnknownInterface(String),
}

/// Errors raised once the event loop is running.
///
/// Every variant is non-recoverable: `main` prints the displayed message and
/// exits non-zero. Per-packet problems are never represented here — see
/// [`crate::classifier::RejectReason`] and the rate limiter's plain `bool`
/// admit/deny result, neither of which is an error.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("capture failed: {0}")]
    Capture(#[source] pcap::Error),

    #[error("send() on raw socket failed: {0}")]
    Send(#[source] std::io::Error),

    #[error("failed to read signal stream: {0}")]
    Signal(#[source] std::io::Error),

    #[error("failed to register capture descriptor with the event loop: {0}")]
    EventLoopInit(#[source] std::io::Error),
}

pub type SetupResult<T> = std::result::Result<T, SetupError>;
pub type RuntimeResult<T> = std::result::Result<T, RuntimeError>;
