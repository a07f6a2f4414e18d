//! Error types for the finvox session core.

/// Top-level error type for the voice session system.
#[derive(Debug, thiserror::Error)]
pub enum VoxError {
    /// Input or output device unavailable / permission refused.
    #[error("device access denied: {0}")]
    DeviceAccess(String),

    /// Audio stream or codec error.
    #[error("audio error: {0}")]
    Audio(String),

    /// Transport connection failed or dropped.
    #[error("transport error: {0}")]
    Transport(String),

    /// A tool handler failed; converted into a textual tool response.
    #[error("tool handler failure: {0}")]
    Handler(String),

    /// An inbound wire message could not be interpreted.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Session lifecycle violation (e.g. start while already active).
    #[error("session error: {0}")]
    Session(String),

    /// Finance backend API error.
    #[error("finance API error: {0}")]
    Finance(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, VoxError>;
