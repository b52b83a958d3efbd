use thiserror::Error;

/// Errors surfaced by the backend clients and configuration layer.
///
/// Nothing in the chat core treats these as fatal: callers log them and
/// degrade (stop listening, skip a post, fall back to a default).
#[derive(Debug, Error)]
pub enum Error {
    #[error("HTTP transport: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("not signed in")]
    NotSignedIn,
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("config file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("config file: {0}")]
    ConfigWrite(#[from] toml::ser::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
