use thiserror::Error;

/// Error types for the relay tunnel system
#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("Invalid secret")]
    InvalidSecret,

    #[error(
        "Invalid subdomain format. Use only lowercase letters, numbers, and hyphens (3-63 chars)"
    )]
    InvalidSubdomain,

    #[error(
        "Subdomain '{0}' is already in use. Choose a different name or omit --subdomain for random."
    )]
    SubdomainTaken(String),

    #[error("Failed to generate unique subdomain")]
    AllocationExhausted,

    #[error("No pending request for id {0}")]
    RequestNotFound(String),

    #[error("Control channel closed")]
    ChannelClosed,

    #[error("Invalid message format: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Server rejected connection: {0}")]
    Rejected(String),
}

impl TunnelError {
    /// Errors that must not be retried by the client's reconnect loop
    pub fn is_fatal(&self) -> bool {
        matches!(self, TunnelError::Rejected(_))
    }
}

/// Type alias for Results using TunnelError
pub type Result<T> = std::result::Result<T, TunnelError>;
