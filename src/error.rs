use thiserror::Error;

#[derive(Error, Debug)]
pub enum ViewerError {
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP request error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Connection attempt timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("{0}")]
    InvalidSetting(String),

    /// The server refused a request; carries its `detail` text unchanged.
    #[error("{0}")]
    Rejected(String),
}

pub type ViewerResult<T> = Result<T, ViewerError>;
