//! Archive Timestamp Client Library
//!
//! Obtains RFC 3161 timestamps for hash tree roots and packages them with
//! reduced hash trees into RFC 4998 archive timestamps.

pub mod authority;
pub mod config;
pub mod nonce;
pub mod service;
pub mod storage;

#[cfg(feature = "test-util")]
pub mod testutil;

pub use authority::{AuthorityError, HttpTimestampAuthority, TimestampAuthority};
pub use config::AtsConfig;
pub use nonce::NonceGenerator;
pub use service::ArchiveTimestampService;
pub use storage::RecordStorage;

use ats_types::HashValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("Node not found in hash tree: {0}")]
    NodeNotFound(String),

    #[error("Timestamp authority error: {0}")]
    TimestampAuthority(#[from] AuthorityError),

    #[error("Reduced hash tree does not lead to root hash {0}")]
    InconsistentProof(HashValue),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Encoding error: {0}")]
    Codec(ats_types::Error),
}

impl From<ats_types::Error> for ClientError {
    fn from(err: ats_types::Error) -> Self {
        match err {
            ats_types::Error::UnsupportedAlgorithm(name) => ClientError::UnsupportedAlgorithm(name),
            other => ClientError::Codec(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
