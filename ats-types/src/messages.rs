//! Proof structures and protocol messages for archive timestamps

use chrono::{DateTime, Utc};
use der::asn1::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::asn1;
use crate::error::Result;
use crate::hash::canonical_hash;
use crate::primitives::{HashAlgorithm, HashValue};

/// One level of a reduced hash tree ("partial hash tree" in RFC 4998).
///
/// Holds the hash values that are concatenated and digested to produce one
/// node hash: the node's own content digest plus the hashes of its direct
/// children. Entries are kept in canonical order; duplicates are preserved.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Vec<HashValue>", into = "Vec<HashValue>")]
pub struct PartialHashSet(Vec<HashValue>);

impl PartialHashSet {
    pub fn new(mut hashes: Vec<HashValue>) -> Self {
        hashes.sort();
        Self(hashes)
    }

    pub fn hashes(&self) -> &[HashValue] {
        &self.0
    }

    pub fn contains(&self, hash: &HashValue) -> bool {
        self.0.binary_search(hash).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Digest of the canonical concatenation of this set
    pub fn canonical_hash(&self, algorithm: HashAlgorithm) -> HashValue {
        canonical_hash(&self.0, algorithm)
    }
}

impl From<Vec<HashValue>> for PartialHashSet {
    fn from(hashes: Vec<HashValue>) -> Self {
        Self::new(hashes)
    }
}

impl From<PartialHashSet> for Vec<HashValue> {
    fn from(set: PartialHashSet) -> Self {
        set.0
    }
}

/// Path of partial hash sets from a target node up to the root.
///
/// Index 0 is the set that produces the target node's hash, the last index
/// is the set that produces the root hash.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReducedHashTree(Vec<PartialHashSet>);

impl ReducedHashTree {
    pub fn new(levels: Vec<PartialHashSet>) -> Self {
        Self(levels)
    }

    pub fn levels(&self) -> &[PartialHashSet] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The set surrounding the target node
    pub fn leaf_set(&self) -> Option<&PartialHashSet> {
        self.0.first()
    }

    /// The set producing the root hash
    pub fn root_set(&self) -> Option<&PartialHashSet> {
        self.0.last()
    }

    /// Climb the chain and return the root hash it produces.
    ///
    /// Returns `None` when the tree is empty or when the canonical hash of
    /// some level is missing from the next level.
    pub fn root_hash(&self, algorithm: HashAlgorithm) -> Option<HashValue> {
        let (first, rest) = self.0.split_first()?;
        let mut current = first.canonical_hash(algorithm);
        for level in rest {
            if !level.contains(&current) {
                return None;
            }
            current = level.canonical_hash(algorithm);
        }
        Some(current)
    }
}

/// An RFC 3161 timestamp token (CMS `ContentInfo`), kept as DER bytes
#[derive(Clone, PartialEq, Eq)]
pub struct TimestampToken(Vec<u8>);

impl Serialize for TimestampToken {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&hex::encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for TimestampToken {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        let bytes = hex::decode(hex_str).map_err(serde::de::Error::custom)?;
        Ok(Self(bytes))
    }
}

impl TimestampToken {
    pub fn from_der(der: Vec<u8>) -> Self {
        Self(der)
    }

    pub fn as_der(&self) -> &[u8] {
        &self.0
    }

    /// Read the timestamp fields protected by the token's signature
    pub fn info(&self) -> Result<TokenInfo> {
        asn1::parse_token(&self.0)
    }
}

impl fmt::Debug for TimestampToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimestampToken({} bytes)", self.0.len())
    }
}

/// The hashed message a timestamp was issued over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageImprint {
    pub algorithm: ObjectIdentifier,
    pub digest: HashValue,
}

/// Contents of the `TSTInfo` structure inside a timestamp token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
    /// TSA policy under which the token was issued
    pub policy: ObjectIdentifier,
    pub message_imprint: MessageImprint,
    /// Raw big-endian serial number
    pub serial_number: Vec<u8>,
    pub gen_time: DateTime<Utc>,
    pub nonce: Option<u64>,
}

impl TokenInfo {
    /// Resolve the imprint algorithm identifier
    pub fn imprint_algorithm(&self) -> Result<HashAlgorithm> {
        HashAlgorithm::from_oid(&self.message_imprint.algorithm)
    }
}

/// Request sent to a timestamp authority
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampRequest {
    pub algorithm: HashAlgorithm,
    pub digest: HashValue,
    pub nonce: Option<u64>,
    /// Ask the authority to include its signing certificate
    pub cert_req: bool,
}

impl TimestampRequest {
    pub fn new(algorithm: HashAlgorithm, digest: HashValue) -> Self {
        Self {
            algorithm,
            digest,
            nonce: None,
            cert_req: true,
        }
    }

    pub fn with_nonce(mut self, nonce: u64) -> Self {
        self.nonce = Some(nonce);
        self
    }

    /// DER-encoded `TimeStampReq`
    pub fn to_der(&self) -> Result<Vec<u8>> {
        asn1::encode_request(self)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        asn1::decode_request(der)
    }
}

/// PKI status values of a `TimeStampResp`
pub mod pki_status {
    pub const GRANTED: u32 = 0;
    pub const GRANTED_WITH_MODS: u32 = 1;
    pub const REJECTION: u32 = 2;
    pub const WAITING: u32 = 3;
    pub const REVOCATION_WARNING: u32 = 4;
    pub const REVOCATION_NOTIFICATION: u32 = 5;
}

/// Decoded `TimeStampResp`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampResponse {
    pub status: u32,
    pub status_text: Vec<String>,
    pub token: Option<TimestampToken>,
}

impl TimestampResponse {
    pub fn granted(token: TimestampToken) -> Self {
        Self {
            status: pki_status::GRANTED,
            status_text: Vec::new(),
            token: Some(token),
        }
    }

    pub fn rejected(status: u32, text: impl Into<String>) -> Self {
        Self {
            status,
            status_text: vec![text.into()],
            token: None,
        }
    }

    pub fn to_der(&self) -> Result<Vec<u8>> {
        asn1::encode_response(self)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        asn1::decode_response(der)
    }
}

/// RFC 4998 archive timestamp: a reduced hash tree plus a timestamp over
/// the root hash it produces
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveTimestamp {
    /// Digest algorithm of the hash tree
    pub digest_algorithm: HashAlgorithm,
    /// Partial hash sets from the archived node up to the root
    pub reduced_hash_tree: ReducedHashTree,
    /// Timestamp over the root hash
    pub timestamp_token: TimestampToken,
}

impl ArchiveTimestamp {
    /// The set surrounding the archived node
    pub fn leaf_set(&self) -> Option<&PartialHashSet> {
        self.reduced_hash_tree.leaf_set()
    }

    /// Hash of the archived node
    pub fn node_hash(&self) -> Option<HashValue> {
        self.leaf_set()
            .map(|set| set.canonical_hash(self.digest_algorithm))
    }

    pub fn token_info(&self) -> Result<TokenInfo> {
        self.timestamp_token.info()
    }

    /// DER encoding per RFC 4998 `ArchiveTimeStamp`
    pub fn to_der(&self) -> Result<Vec<u8>> {
        asn1::encode_archive_timestamp(self)
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        asn1::decode_archive_timestamp(der)
    }
}
