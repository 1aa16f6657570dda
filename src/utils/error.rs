use config::ConfigError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    ConfigError(#[from] ConfigError),
    #[error("Logging error: {0}")]
    LoggingError(String),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("HTTP error: {status}, body: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("RPC error {code}: {message}")]
    RpcError { code: i64, message: String },
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("JSON parse error: {0}")]
    JsonParseError(String),
    #[error("Invalid chain: {0}")]
    InvalidChain(String),
    #[error("Checkpoint error: {0}")]
    CheckpointError(String),
}
