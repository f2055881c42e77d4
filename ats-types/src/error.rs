//! Error types for archive timestamp data handling

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Invalid hash length: expected {expected}, got {actual}")]
    InvalidHashLength { expected: usize, actual: usize },

    #[error("Malformed timestamp token: {0}")]
    MalformedToken(String),

    #[error("Malformed archive timestamp: {0}")]
    MalformedRecord(String),

    #[error("DER error: {0}")]
    Der(#[from] der::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Hex encoding error: {0}")]
    HexEncoding(#[from] hex::FromHexError),
}
