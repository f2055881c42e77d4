//! Primitive cryptographic types

use crate::error::{Error, Result};
use der::asn1::ObjectIdentifier;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A hash value as produced by one of the supported digest functions.
///
/// The derived ordering is unsigned byte-wise lexicographic with a shorter
/// prefix sorting first, which is the "binary ascending order" RFC 4998
/// requires when hash sets are concatenated.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct HashValue(Vec<u8>);

// Serialized as hex for readability
impl Serialize for HashValue {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for HashValue {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let hex_str = String::deserialize(deserializer)?;
        Self::from_hex(&hex_str).map_err(serde::de::Error::custom)
    }
}

impl HashValue {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn from_slice(slice: &[u8]) -> Self {
        Self(slice.to_vec())
    }

    /// Build a hash value, checking it has the output size of `algorithm`
    pub fn for_algorithm(slice: &[u8], algorithm: HashAlgorithm) -> Result<Self> {
        if slice.len() != algorithm.digest_len() {
            return Err(Error::InvalidHashLength {
                expected: algorithm.digest_len(),
                actual: slice.len(),
            });
        }
        Ok(Self::from_slice(slice))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Ok(Self(hex::decode(s)?))
    }
}

impl AsRef<[u8]> for HashValue {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for HashValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let shown = self.0.len().min(8);
        write!(f, "HashValue({}", hex::encode(&self.0[..shown]))?;
        if self.0.len() > shown {
            write!(f, "...")?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for HashValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

const OID_SHA224: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.4");
const OID_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.1");
const OID_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.2");
const OID_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.16.840.1.101.3.4.2.3");

/// Digest algorithm used for the hash tree and the timestamp request.
///
/// Each algorithm is known under two identifier namespaces: the one used in
/// RFC 3161 timestamp requests and the general digest identifier embedded in
/// signature metadata and archive timestamps. Both resolve to the same
/// digest function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    Sha224,
    #[default]
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [HashAlgorithm; 4] = [
        HashAlgorithm::Sha224,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha384,
        HashAlgorithm::Sha512,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha224 => "SHA-224",
            HashAlgorithm::Sha256 => "SHA-256",
            HashAlgorithm::Sha384 => "SHA-384",
            HashAlgorithm::Sha512 => "SHA-512",
        }
    }

    /// Identifier placed in the message imprint of a timestamp request
    pub fn tsp_oid(&self) -> ObjectIdentifier {
        // The TSP algorithm table reuses the NIST arcs for SHA-2
        self.digest_oid()
    }

    /// General digest identifier used in archive timestamps
    pub fn digest_oid(&self) -> ObjectIdentifier {
        match self {
            HashAlgorithm::Sha224 => OID_SHA224,
            HashAlgorithm::Sha256 => OID_SHA256,
            HashAlgorithm::Sha384 => OID_SHA384,
            HashAlgorithm::Sha512 => OID_SHA512,
        }
    }

    /// Output size in bytes
    pub fn digest_len(&self) -> usize {
        match self {
            HashAlgorithm::Sha224 => 28,
            HashAlgorithm::Sha256 => 32,
            HashAlgorithm::Sha384 => 48,
            HashAlgorithm::Sha512 => 64,
        }
    }

    /// Resolve an identifier from either namespace
    pub fn from_oid(oid: &ObjectIdentifier) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|alg| alg.tsp_oid() == *oid || alg.digest_oid() == *oid)
            .ok_or_else(|| Error::UnsupportedAlgorithm(oid.to_string()))
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    /// Accepts "SHA-256", "sha256", "SHA256" and dotted OIDs
    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_uppercase();

        if let Some(alg) = Self::ALL
            .into_iter()
            .find(|alg| alg.name().replace('-', "") == normalized)
        {
            return Ok(alg);
        }

        match ObjectIdentifier::new(s) {
            Ok(oid) => Self::from_oid(&oid),
            Err(_) => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for HashAlgorithm {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for HashAlgorithm {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_algorithm_names_resolve() {
        assert_eq!("SHA-256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
        assert_eq!("sha512".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha512);
        assert_eq!("Sha_384".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha384);
        assert_eq!(
            "2.16.840.1.101.3.4.2.4".parse::<HashAlgorithm>().unwrap(),
            HashAlgorithm::Sha224
        );
    }

    #[test]
    fn test_unknown_algorithm_is_unsupported() {
        let err = "MD5".parse::<HashAlgorithm>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(_)));

        // SHA-1 is deliberately absent
        let sha1 = ObjectIdentifier::new_unwrap("1.3.14.3.2.26");
        assert!(matches!(
            HashAlgorithm::from_oid(&sha1),
            Err(Error::UnsupportedAlgorithm(_))
        ));
    }

    #[test]
    fn test_both_oid_namespaces_resolve_to_same_algorithm() {
        for alg in HashAlgorithm::ALL {
            assert_eq!(HashAlgorithm::from_oid(&alg.tsp_oid()).unwrap(), alg);
            assert_eq!(HashAlgorithm::from_oid(&alg.digest_oid()).unwrap(), alg);
        }
    }

    #[test]
    fn test_algorithm_serde_uses_name() {
        let json = serde_json::to_string(&HashAlgorithm::Sha384).unwrap();
        assert_eq!(json, "\"SHA-384\"");
        let parsed: HashAlgorithm = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, HashAlgorithm::Sha384);
    }

    #[test]
    fn test_for_algorithm_checks_length() {
        assert!(HashValue::for_algorithm(&[0u8; 32], HashAlgorithm::Sha256).is_ok());
        let err = HashValue::for_algorithm(&[0u8; 31], HashAlgorithm::Sha256).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidHashLength { expected: 32, actual: 31 }
        ));
    }

    #[test]
    fn test_ordering_is_unsigned() {
        let a = HashValue::new(vec![0x01, 0x02]);
        let b = HashValue::new(vec![0x01, 0x7F]);
        let c = HashValue::new(vec![0x80]);
        let prefix = HashValue::new(vec![0x01]);
        assert!(prefix < a);
        assert!(a < b);
        assert!(b < c);
    }

    proptest! {
        #[test]
        fn prop_hash_value_serde_preserves_bytes(bytes in prop::collection::vec(any::<u8>(), 0..80)) {
            let value = HashValue::new(bytes.clone());
            let json = serde_json::to_string(&value).unwrap();
            let parsed: HashValue = serde_json::from_str(&json).unwrap();
            prop_assert_eq!(parsed.as_bytes(), bytes.as_slice());
        }

        #[test]
        fn prop_from_hex_rejects_odd_length(s in "[0-9a-f]{1,99}") {
            prop_assume!(s.len() % 2 == 1);
            prop_assert!(HashValue::from_hex(&s).is_err());
        }
    }
}
