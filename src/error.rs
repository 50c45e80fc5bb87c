//! Error types for the bridge.

/// Top-level error type for the device bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// Malformed or unsupported host command.
    #[error("command error: {0}")]
    Command(String),

    /// Unknown capability or capability store failure.
    #[error("capability error: {0}")]
    Capability(String),

    /// Native platform call failed.
    #[error("platform error: {0}")]
    Platform(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, BridgeError>;
