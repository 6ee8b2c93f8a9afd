use thiserror::Error;

use crate::database;

/// The error taxonomy of spec §7. Each variant is produced at a specific
/// pipeline step and determines whether the orchestrator treats the
/// failure as fatal (revert accepted requests to PENDING) or local
/// (fail just the offending candidate's requests and continue).
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("could not load metadata for stream: {0}")]
    RequestLoad(String),

    #[error("conflict resolution rejected commit: {0}")]
    ConflictRejection(String),

    #[error("merkle tree construction failed: {0}")]
    MerkleBuildFailure(anyhow::Error),

    #[error("merkle root digest is {0} bytes, expected 32")]
    InvalidRootDigest(usize),

    #[error("ledger transaction failed: {0}")]
    LedgerFailure(anyhow::Error),

    #[error("proof block publish failed: {0}")]
    ProofPublishFailure(anyhow::Error),

    #[error("anchor commit publish failed: {0}")]
    AnchorCommitPublishFailure(anyhow::Error),

    #[error("persisting batch results failed: {0}")]
    PersistFailure(#[from] database::Error),
}

impl BatchError {
    /// Whether this failure class is fatal to the whole batch (spec §4.1
    /// step 11 / §7), as opposed to local to one candidate.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::AnchorCommitPublishFailure(_))
    }
}

/// Surfaced verbatim to callers of the Witness Service (spec §4.3).
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidWitness {
    #[error("witness archive has no root")]
    MissingRoot,

    #[error("witness archive has more than one root")]
    MultipleRoots,

    #[error("anchor commit block {0} not found in archive")]
    MissingAnchorCommit(String),

    #[error("proof block {0} not found in archive")]
    MissingProof(String),

    #[error("merkle root block {0} not found in archive")]
    MissingMerkleRoot(String),

    #[error("internal node block {0} not found in archive")]
    MissingInternalNode(String),

    #[error("path walk terminated at {reached}, expected {expected}")]
    TerminalMismatch { reached: String, expected: String },

    #[error("anchor commit path is malformed: {0}")]
    MalformedPath(String),
}
