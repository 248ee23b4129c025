use thiserror::Error;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("WebSocket connection error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON serialization/deserialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Connection timeout")]
    Timeout,

    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("No async runtime available to drive the transport")]
    NoRuntime,

    #[error("Maximum reconnection attempts exceeded")]
    MaxReconnectsExceeded,

    #[error("Invalid message format: {0}")]
    InvalidMessage(String),

    #[error("Unknown channel: {0}")]
    UnknownChannel(String),

    #[error("Metrics server error: {0}")]
    MetricsError(String),
}
