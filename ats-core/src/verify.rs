//! Archive timestamp verification
//!
//! Verification runs as an explicit state machine:
//!
//! ```text
//! Start -> LeafCheck -> ChainClimb(0) -> ... -> ChainClimb(n-1) -> RootCheck -> Verified
//! ```
//!
//! Any failed check moves to `Rejected`, recording the step that failed.
//! The token's signature and certificate chain are not checked here.

use ats_types::{hash, ArchiveTimestamp, HashAlgorithm, HashValue};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("Reduced hash tree is empty")]
    EmptyReducedTree,

    #[error("Content digest is not part of the archived node's hash set")]
    ContentNotInProof,

    #[error("Hash of level {level} is missing from the next level")]
    BrokenChain { level: usize },

    #[error("Timestamp covers {timestamped}, but the reduced tree yields {computed}")]
    RootMismatch {
        computed: HashValue,
        timestamped: HashValue,
    },

    #[error("Timestamp imprint uses {token}, but the hash tree uses {tree}")]
    AlgorithmMismatch { tree: HashAlgorithm, token: String },

    #[error("Timestamp digest has {actual} bytes, expected {expected}")]
    InvalidDigestLength { expected: usize, actual: usize },

    #[error("Malformed timestamp token: {0}")]
    MalformedToken(String),
}

/// Verifier step, used to report where a record was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifierStep {
    Start,
    LeafCheck,
    ChainClimb(usize),
    RootCheck,
}

/// Facts established by a successful verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedTimestamp {
    /// Time asserted by the timestamp authority
    pub gen_time: DateTime<Utc>,
    /// Root hash covered by the timestamp
    pub root_hash: HashValue,
    /// Number of levels in the reduced hash tree
    pub depth: usize,
    /// Serial number of the token, big-endian
    pub serial_number: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerifierState {
    Start,
    LeafCheck { content_hash: HashValue },
    ChainClimb { level: usize },
    RootCheck { root_hash: HashValue },
    Verified(VerifiedTimestamp),
    Rejected {
        step: VerifierStep,
        reason: VerificationError,
    },
}

impl VerifierState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Verified(_) | Self::Rejected { .. })
    }
}

/// Terminal outcome of a verification run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Verified(VerifiedTimestamp),
    Rejected {
        step: VerifierStep,
        reason: VerificationError,
    },
}

impl Verdict {
    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified(_))
    }

    pub fn into_result(self) -> Result<VerifiedTimestamp, VerificationError> {
        match self {
            Self::Verified(verified) => Ok(verified),
            Self::Rejected { reason, .. } => Err(reason),
        }
    }
}

/// Step-by-step verifier for one archive timestamp and one content object
pub struct ArchiveTimestampVerifier<'a> {
    record: &'a ArchiveTimestamp,
    content: &'a [u8],
    state: VerifierState,
}

impl<'a> ArchiveTimestampVerifier<'a> {
    /// Verify `content` against `record`, starting from the raw bytes
    pub fn new(record: &'a ArchiveTimestamp, content: &'a [u8]) -> Self {
        Self {
            record,
            content,
            state: VerifierState::Start,
        }
    }

    /// Verify a precomputed content digest, skipping the hashing step
    pub fn with_content_digest(record: &'a ArchiveTimestamp, content_hash: HashValue) -> Self {
        Self {
            record,
            content: &[],
            state: VerifierState::LeafCheck { content_hash },
        }
    }

    pub fn state(&self) -> &VerifierState {
        &self.state
    }

    /// Perform one transition. Terminal states are left unchanged.
    pub fn step(&mut self) -> &VerifierState {
        let next = match &self.state {
            VerifierState::Start => VerifierState::LeafCheck {
                content_hash: hash::digest(self.content, self.record.digest_algorithm),
            },
            VerifierState::LeafCheck { content_hash } => self.check_leaf(content_hash),
            VerifierState::ChainClimb { level } => self.climb(*level),
            VerifierState::RootCheck { root_hash } => self.check_root(root_hash),
            terminal => terminal.clone(),
        };
        self.state = next;
        &self.state
    }

    /// Run to a terminal state
    pub fn run(mut self) -> Verdict {
        loop {
            match self.state {
                VerifierState::Verified(verified) => return Verdict::Verified(verified),
                VerifierState::Rejected { step, reason } => {
                    return Verdict::Rejected { step, reason }
                }
                _ => {
                    self.step();
                }
            }
        }
    }

    fn check_leaf(&self, content_hash: &HashValue) -> VerifierState {
        match self.record.leaf_set() {
            None => reject(VerifierStep::LeafCheck, VerificationError::EmptyReducedTree),
            Some(set) if !set.contains(content_hash) => {
                reject(VerifierStep::LeafCheck, VerificationError::ContentNotInProof)
            }
            Some(_) => VerifierState::ChainClimb { level: 0 },
        }
    }

    fn climb(&self, level: usize) -> VerifierState {
        let levels = self.record.reduced_hash_tree.levels();
        let node_hash = levels[level].canonical_hash(self.record.digest_algorithm);
        match levels.get(level + 1) {
            None => VerifierState::RootCheck {
                root_hash: node_hash,
            },
            Some(parent) if parent.contains(&node_hash) => {
                VerifierState::ChainClimb { level: level + 1 }
            }
            Some(_) => reject(
                VerifierStep::ChainClimb(level),
                VerificationError::BrokenChain { level },
            ),
        }
    }

    fn check_root(&self, root_hash: &HashValue) -> VerifierState {
        let info = match self.record.token_info() {
            Ok(info) => info,
            Err(e) => {
                return reject(
                    VerifierStep::RootCheck,
                    VerificationError::MalformedToken(e.to_string()),
                )
            }
        };

        let algorithm = self.record.digest_algorithm;
        match info.imprint_algorithm() {
            Ok(token_alg) if token_alg == algorithm => {}
            _ => {
                return reject(
                    VerifierStep::RootCheck,
                    VerificationError::AlgorithmMismatch {
                        tree: algorithm,
                        token: info.message_imprint.algorithm.to_string(),
                    },
                )
            }
        }

        let timestamped = info.message_imprint.digest;
        if timestamped.len() != algorithm.digest_len() {
            return reject(
                VerifierStep::RootCheck,
                VerificationError::InvalidDigestLength {
                    expected: algorithm.digest_len(),
                    actual: timestamped.len(),
                },
            );
        }
        if &timestamped != root_hash {
            return reject(
                VerifierStep::RootCheck,
                VerificationError::RootMismatch {
                    computed: root_hash.clone(),
                    timestamped,
                },
            );
        }

        VerifierState::Verified(VerifiedTimestamp {
            gen_time: info.gen_time,
            root_hash: timestamped,
            depth: self.record.reduced_hash_tree.len(),
            serial_number: info.serial_number,
        })
    }
}

fn reject(step: VerifierStep, reason: VerificationError) -> VerifierState {
    VerifierState::Rejected { step, reason }
}

/// Verify that `content` is covered by `record`
pub fn verify(record: &ArchiveTimestamp, content: &[u8]) -> Verdict {
    ArchiveTimestampVerifier::new(record, content).run()
}

/// Verify that a content digest is covered by `record`
pub fn verify_content_digest(record: &ArchiveTimestamp, content_hash: &HashValue) -> Verdict {
    ArchiveTimestampVerifier::with_content_digest(record, content_hash.clone()).run()
}
