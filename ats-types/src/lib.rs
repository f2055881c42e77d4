//! Core types and wire formats for RFC 4998 archive timestamps
//!
//! This crate defines hash values and digest algorithms, the reduced hash
//! tree proof structures, and the DER encodings of RFC 3161 timestamp
//! messages and of the archive timestamp record.

pub mod asn1;
pub mod error;
pub mod hash;
pub mod messages;
pub mod primitives;

pub use error::{Error, Result};
pub use messages::{
    ArchiveTimestamp, MessageImprint, PartialHashSet, ReducedHashTree, TimestampRequest,
    TimestampResponse, TimestampToken, TokenInfo,
};
pub use der::oid::ObjectIdentifier;
pub use primitives::{HashAlgorithm, HashValue};
