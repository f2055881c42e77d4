//! Canonical digesting and ordering of byte strings
//!
//! Every hash in the tree is computed from a *set* of byte strings. The set is
//! sorted in unsigned byte-wise order and concatenated without separators
//! before digesting, so the result never depends on insertion order.

use std::cmp::Ordering;

use der::asn1::ObjectIdentifier;
use sha2::{Digest as _, Sha224, Sha256, Sha384, Sha512};

use crate::error::Result;
use crate::primitives::{HashAlgorithm, HashValue};

/// Digest `data` with `algorithm`
pub fn digest(data: &[u8], algorithm: HashAlgorithm) -> HashValue {
    let bytes = match algorithm {
        HashAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
        HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
        HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
        HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
    };
    HashValue::new(bytes)
}

/// Digest `data` with the algorithm named by `oid`.
///
/// Fails with `UnsupportedAlgorithm` when the identifier is unknown.
pub fn digest_with_oid(data: &[u8], oid: &ObjectIdentifier) -> Result<HashValue> {
    let algorithm = HashAlgorithm::from_oid(oid)?;
    Ok(digest(data, algorithm))
}

/// Unsigned lexicographic comparison, shorter prefix first
pub fn compare_unsigned(a: &[u8], b: &[u8]) -> Ordering {
    // slice Ord on u8 is exactly this
    a.cmp(b)
}

/// Sort `hashes` canonically and concatenate them without separators.
///
/// Duplicates are kept.
pub fn canonical_concat<H: AsRef<[u8]>>(hashes: &[H]) -> Vec<u8> {
    let mut sorted: Vec<&[u8]> = hashes.iter().map(AsRef::as_ref).collect();
    sorted.sort_unstable_by(|a, b| compare_unsigned(a, b));

    let total = sorted.iter().map(|h| h.len()).sum();
    let mut out = Vec::with_capacity(total);
    for hash in sorted {
        out.extend_from_slice(hash);
    }
    out
}

/// digest(canonical_concat(hashes))
pub fn canonical_hash<H: AsRef<[u8]>>(hashes: &[H], algorithm: HashAlgorithm) -> HashValue {
    digest(&canonical_concat(hashes), algorithm)
}
