/// Shared error type used across all SubRelay crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP: {0}")]
    Http(String),

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("websocket: {0}")]
    WebSocket(String),

    #[error("capture: {0}")]
    Capture(String),

    #[error("stt: {0}")]
    Stt(String),

    #[error("translate: {0}")]
    Translate(String),

    #[error("send via {account}: {message}")]
    Send { account: String, message: String },

    #[error("account not found: {0}")]
    AccountNotFound(String),

    #[error("config: {0}")]
    Config(String),

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
