use thiserror::Error;

#[derive(Error, Debug)]
pub enum BalanceteError {
    #[error("Invalid threshold '{name}': {details}")]
    InvalidThreshold { name: String, details: String },

    #[error("Invalid ranking limit '{0}': must be greater than zero")]
    InvalidRankingLimit(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BalanceteError>;
