//! Storage for archive timestamps

use ats_types::{ArchiveTimestamp, HashValue};
use sled::Db;

use crate::{ClientError, Result};

/// Archive timestamps keyed by the hash of the archived node
pub struct RecordStorage {
    db: Db,
}

impl RecordStorage {
    /// Open or create a record storage at the given path
    pub fn open(path: &std::path::Path) -> Result<Self> {
        let db = sled::open(path)
            .map_err(|e| ClientError::Storage(format!("Failed to open database: {}", e)))?;

        Ok(Self { db })
    }

    /// Store a record under its node hash and return that hash
    pub fn store(&self, record: &ArchiveTimestamp) -> Result<HashValue> {
        let node_hash = record
            .node_hash()
            .ok_or_else(|| ClientError::Storage("Record has an empty reduced hash tree".to_string()))?;
        let value = serde_json::to_vec(record)
            .map_err(|e| ClientError::Storage(format!("Failed to serialize record: {}", e)))?;

        self.db
            .insert(node_hash.as_bytes(), value)
            .map_err(|e| ClientError::Storage(format!("Failed to store record: {}", e)))?;

        self.db
            .flush()
            .map_err(|e| ClientError::Storage(format!("Failed to flush database: {}", e)))?;

        Ok(node_hash)
    }

    /// Retrieve the record for a node hash
    pub fn get(&self, node_hash: &HashValue) -> Result<Option<ArchiveTimestamp>> {
        let value = self
            .db
            .get(node_hash.as_bytes())
            .map_err(|e| ClientError::Storage(format!("Failed to retrieve record: {}", e)))?;

        match value {
            Some(bytes) => {
                let record = serde_json::from_slice(&bytes).map_err(|e| {
                    ClientError::Storage(format!("Failed to deserialize record: {}", e))
                })?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// List all stored records in key order
    pub fn list(&self) -> Result<Vec<(HashValue, ArchiveTimestamp)>> {
        let mut records = Vec::new();

        for item in self.db.iter() {
            let (key, value) = item
                .map_err(|e| ClientError::Storage(format!("Failed to iterate database: {}", e)))?;

            let record = serde_json::from_slice(&value).map_err(|e| {
                ClientError::Storage(format!("Failed to deserialize record: {}", e))
            })?;

            records.push((HashValue::from_slice(&key), record));
        }

        Ok(records)
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }

    fn require(&self, node_hash: &HashValue) -> Result<ArchiveTimestamp> {
        self.get(node_hash)?
            .ok_or_else(|| ClientError::Storage(format!("No record for node {}", node_hash)))
    }

    /// Export a record as JSON
    pub fn export_json(&self, node_hash: &HashValue) -> Result<String> {
        let record = self.require(node_hash)?;
        serde_json::to_string_pretty(&record)
            .map_err(|e| ClientError::Storage(format!("Failed to serialize record: {}", e)))
    }

    /// Export a record in its RFC 4998 DER encoding
    pub fn export_der(&self, node_hash: &HashValue) -> Result<Vec<u8>> {
        let record = self.require(node_hash)?;
        Ok(record.to_der()?)
    }

    /// Import a record from JSON
    pub fn import_json(&self, json: &str) -> Result<HashValue> {
        let record: ArchiveTimestamp = serde_json::from_str(json)
            .map_err(|e| ClientError::Storage(format!("Failed to parse JSON: {}", e)))?;

        self.store(&record)
    }

    /// Import a record from its DER encoding
    pub fn import_der(&self, der: &[u8]) -> Result<HashValue> {
        let record = ArchiveTimestamp::from_der(der)?;
        self.store(&record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ats_types::asn1::encode_unsigned_token;
    use ats_types::hash::{canonical_hash, digest};
    use ats_types::{
        HashAlgorithm, MessageImprint, ObjectIdentifier, PartialHashSet, ReducedHashTree, TokenInfo,
    };
    use chrono::{TimeZone, Utc};

    const ALG: HashAlgorithm = HashAlgorithm::Sha256;

    fn record(content: &[u8]) -> ArchiveTimestamp {
        let leaf = PartialHashSet::new(vec![digest(content, ALG)]);
        let root = PartialHashSet::new(vec![digest(b"root", ALG), leaf.canonical_hash(ALG)]);
        let root_hash = canonical_hash(root.hashes(), ALG);
        let token = encode_unsigned_token(&TokenInfo {
            policy: ObjectIdentifier::new_unwrap("1.2.3"),
            message_imprint: MessageImprint {
                algorithm: ALG.tsp_oid(),
                digest: root_hash,
            },
            serial_number: vec![9],
            gen_time: Utc.with_ymd_and_hms(2022, 2, 2, 2, 2, 2).unwrap(),
            nonce: None,
        })
        .unwrap();
        ArchiveTimestamp {
            digest_algorithm: ALG,
            reduced_hash_tree: ReducedHashTree::new(vec![leaf, root]),
            timestamp_token: token,
        }
    }

    #[test]
    fn test_storage_roundtrip() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = RecordStorage::open(temp_dir.path()).unwrap();

        let rec = record(b"doc");
        let key = storage.store(&rec).unwrap();
        assert_eq!(Some(key.clone()), rec.node_hash());

        let retrieved = storage.get(&key).unwrap();
        assert_eq!(retrieved, Some(rec));
    }

    #[test]
    fn test_missing_record() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = RecordStorage::open(temp_dir.path()).unwrap();
        let absent = digest(b"absent", ALG);

        assert!(storage.get(&absent).unwrap().is_none());
        assert!(matches!(storage.export_json(&absent), Err(ClientError::Storage(_))));
        assert!(storage.is_empty());
    }

    #[test]
    fn test_list_and_export() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = RecordStorage::open(temp_dir.path()).unwrap();

        let a = storage.store(&record(b"a")).unwrap();
        let b = storage.store(&record(b"b")).unwrap();
        assert_eq!(storage.len(), 2);

        let listed: Vec<HashValue> = storage.list().unwrap().into_iter().map(|(k, _)| k).collect();
        let mut expected = vec![a.clone(), b];
        expected.sort();
        assert_eq!(listed, expected);

        let json = storage.export_json(&a).unwrap();
        let der = storage.export_der(&a).unwrap();

        let other_dir = tempfile::tempdir().unwrap();
        let other = RecordStorage::open(other_dir.path()).unwrap();
        assert_eq!(other.import_json(&json).unwrap(), a);
        assert_eq!(other.import_der(&der).unwrap(), a);
        assert_eq!(other.len(), 1);
    }

    #[test]
    fn test_empty_record_not_stored() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = RecordStorage::open(temp_dir.path()).unwrap();

        let mut rec = record(b"x");
        rec.reduced_hash_tree = ReducedHashTree::default();
        assert!(matches!(storage.store(&rec), Err(ClientError::Storage(_))));
    }

    #[test]
    fn test_import_garbage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let storage = RecordStorage::open(temp_dir.path()).unwrap();
        assert!(storage.import_json("{not json").is_err());
        assert!(storage.import_der(&[0x30, 0x00]).is_err());
    }
}
