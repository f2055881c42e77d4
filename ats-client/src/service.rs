//! Archive timestamp creation

use std::sync::Arc;

use ats_core::{extract_path, extract_path_for, MerkleTree, NodeId};
use ats_types::{ArchiveTimestamp, HashAlgorithm, HashValue, ReducedHashTree, TimestampRequest};
use tracing::{debug, info, warn};

use crate::authority::{AuthorityError, TimestampAuthority};
use crate::{ClientError, Result};

/// Produces archive timestamps by having an authority timestamp the root
/// hash a reduced hash tree leads to
pub struct ArchiveTimestampService {
    authority: Arc<dyn TimestampAuthority>,
    request_certificates: bool,
}

impl ArchiveTimestampService {
    pub fn new(authority: Arc<dyn TimestampAuthority>) -> Self {
        Self {
            authority,
            request_certificates: true,
        }
    }

    /// Whether requests ask the authority to include its certificate
    pub fn with_certificate_request(mut self, request_certificates: bool) -> Self {
        self.request_certificates = request_certificates;
        self
    }

    /// Timestamp `root_hash` and package it with `reduced_tree`.
    ///
    /// Fails without producing a record when the reduced tree does not climb
    /// to `root_hash` or when the authority fails.
    pub async fn create_archive_timestamp(
        &self,
        root_hash: &HashValue,
        reduced_tree: ReducedHashTree,
        algorithm: HashAlgorithm,
    ) -> Result<ArchiveTimestamp> {
        HashValue::for_algorithm(root_hash.as_bytes(), algorithm)?;

        if reduced_tree.root_hash(algorithm).as_ref() != Some(root_hash) {
            warn!(root = %root_hash, levels = reduced_tree.len(), "Reduced hash tree does not lead to root");
            return Err(ClientError::InconsistentProof(root_hash.clone()));
        }

        let mut request = TimestampRequest::new(algorithm, root_hash.clone());
        request.cert_req = self.request_certificates;

        info!(root = %root_hash, %algorithm, levels = reduced_tree.len(), "Requesting archive timestamp");

        let token = self
            .authority
            .request_timestamp(&request)
            .await
            .map_err(|e| {
                warn!(root = %root_hash, error = %e, "Timestamp authority failed");
                ClientError::TimestampAuthority(e)
            })?;

        // Hold every authority to the requested imprint
        let token_info = token.info().map_err(|e| {
            warn!(root = %root_hash, error = %e, "Unreadable timestamp token");
            ClientError::TimestampAuthority(AuthorityError::MalformedResponse(e.to_string()))
        })?;
        let token_algorithm = token_info.imprint_algorithm().ok();
        if token_algorithm != Some(algorithm) {
            warn!(
                root = %root_hash,
                token_oid = %token_info.message_imprint.algorithm,
                "Token covers a different algorithm"
            );
            return Err(ClientError::TimestampAuthority(AuthorityError::ImprintMismatch));
        }
        if &token_info.message_imprint.digest != root_hash {
            warn!(root = %root_hash, "Token covers a different digest");
            return Err(ClientError::TimestampAuthority(AuthorityError::ImprintMismatch));
        }

        debug!(gen_time = %token_info.gen_time, "Timestamp token received");

        Ok(ArchiveTimestamp {
            digest_algorithm: algorithm,
            reduced_hash_tree: reduced_tree,
            timestamp_token: token,
        })
    }

    /// Archive the node identified by `id`
    pub async fn archive_node(&self, tree: &MerkleTree, id: NodeId) -> Result<ArchiveTimestamp> {
        let reduced = extract_path_for(tree, id)
            .ok_or_else(|| ClientError::NodeNotFound(format!("node #{}", id.index())))?;
        self.create_archive_timestamp(tree.root_hash(), reduced, tree.algorithm())
            .await
    }

    /// Archive several nodes of one tree under a single timestamp.
    ///
    /// All records share the token over the tree's root hash. Any unknown id
    /// fails the whole call before the authority is contacted.
    pub async fn archive_nodes(
        &self,
        tree: &MerkleTree,
        ids: &[NodeId],
    ) -> Result<Vec<ArchiveTimestamp>> {
        let reduced = ids
            .iter()
            .map(|id| {
                extract_path_for(tree, *id)
                    .ok_or_else(|| ClientError::NodeNotFound(format!("node #{}", id.index())))
            })
            .collect::<Result<Vec<_>>>()?;

        let root_set = match tree.partial_hash_set(tree.root_id()) {
            Some(set) => set,
            None => return Err(ClientError::NodeNotFound("root".to_string())),
        };
        let anchor = self
            .create_archive_timestamp(
                tree.root_hash(),
                ReducedHashTree::new(vec![root_set]),
                tree.algorithm(),
            )
            .await?;

        info!(count = reduced.len(), root = %tree.root_hash(), "Archived nodes under one timestamp");

        Ok(reduced
            .into_iter()
            .map(|reduced_hash_tree| ArchiveTimestamp {
                digest_algorithm: anchor.digest_algorithm,
                reduced_hash_tree,
                timestamp_token: anchor.timestamp_token.clone(),
            })
            .collect())
    }

    /// Archive the first node in pre-order whose hash equals `target`
    pub async fn archive_hash(
        &self,
        tree: &MerkleTree,
        target: &HashValue,
    ) -> Result<ArchiveTimestamp> {
        let reduced = extract_path(tree, target)
            .ok_or_else(|| ClientError::NodeNotFound(target.to_hex()))?;
        self.create_archive_timestamp(tree.root_hash(), reduced, tree.algorithm())
            .await
    }
}
