//! Hash trees, reduced hash tree extraction and archive timestamp verification
//!
//! This crate provides:
//! - Content-addressed trees whose node hashes ignore child order
//! - Extraction of the reduced hash tree proving one node up to the root
//! - Offline verification of RFC 4998 archive timestamps

pub mod merkle;
pub mod path;
pub mod verify;

pub use ats_types::hash;

pub use merkle::{Document, MerkleTree, NodeId, TreeBuilder, TreeNode};
pub use path::{extract_path, extract_path_for};
pub use verify::{
    verify, verify_content_digest, ArchiveTimestampVerifier, Verdict, VerificationError,
    VerifiedTimestamp, VerifierState, VerifierStep,
};
