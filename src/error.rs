//! Error types for the gateway endpoint.

/// Top-level error type for the endpoint.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Backend error: {0}")]
    Bridge(#[from] BridgeError),
}

/// Configuration-related errors. These are fatal at startup — the process
/// exits non-zero rather than looping on the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Transport-level failures. Any of these ends the current session
/// generation and hands control back to the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Connect to {url} failed: {reason}")]
    Connect { url: String, reason: String },

    #[error("Registration handshake failed: {0}")]
    Handshake(String),

    #[error("Send failed: {0}")]
    Send(String),

    #[error("Receive failed: {0}")]
    Receive(String),

    #[error("Connection closed by gateway")]
    Closed,
}

/// Backend call failures. These never end a session — they surface as an
/// error result on the job that triggered them.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("No backend endpoints configured")]
    NoEndpoints,

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("Backend request to {url} failed: {reason}")]
    Request { url: String, reason: String },

    #[error("Backend at {url} returned status {status}")]
    Status { url: String, status: u16 },

    #[error("Unparseable backend response from {url}: {reason}")]
    Parse { url: String, reason: String },
}

/// Per-job dispatch failures, converted into error result frames.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

/// Result type alias for the endpoint.
pub type Result<T> = std::result::Result<T, Error>;
