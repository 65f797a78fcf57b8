use thiserror::Error;

/// Result type for Umbra operations
pub type Result<T> = std::result::Result<T, UmbraError>;

/// Errors that can occur when talking to an Umbra console
#[derive(Error, Debug)]
pub enum UmbraError {
    /// WebSocket connection error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Connection was closed unexpectedly
    #[error("Connection closed")]
    ConnectionClosed,

    /// Request timed out waiting for response
    #[error("Request timeout")]
    Timeout,

    /// Console rejected a request at the application level
    #[error("Console error: {detail}")]
    Console {
        /// Error detail message from the console
        detail: String,
    },

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unexpected response from the console
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Operation attempted in the wrong session state
    #[error("Invalid session state: {0}")]
    SessionState(String),
}
