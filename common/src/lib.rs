pub mod types;

use ethers::types::H256;
use thiserror::Error;

pub use types::*;

/// Fatal failures of a deployment step
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("contract artifact `{0}` not found")]
    ArtifactNotFound(String),
    #[error("invalid artifact for `{name}`: {reason}")]
    InvalidArtifact { name: String, reason: String },
    #[error("constructor arguments rejected for `{name}`: {reason}")]
    ConstructorArgs { name: String, reason: String },
    #[error("deployment of `{name}` rejected: {reason}")]
    Rejected { name: String, reason: String },
    #[error("deployment transaction {tx:?} for `{name}` reverted")]
    Reverted { name: String, tx: H256 },
    #[error("deployment transaction {tx:?} for `{name}` was dropped before inclusion")]
    Dropped { name: String, tx: H256 },
    #[error("receipt of {tx:?} for `{name}` carries no contract address")]
    MissingAddress { name: String, tx: H256 },
    #[error("{step} timed out after {secs}s")]
    Timeout { step: String, secs: u64 },
    #[error("network error: {0}")]
    Network(String),
}

/// Failures of a single verification request. Never fatal to a run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("explorer rejected verification: {0}")]
    Rejected(String),
    #[error("verification timed out after {0}s")]
    Timeout(u64),
    #[error("explorer unavailable: {0}")]
    Service(String),
    #[error("artifact unusable for verification: {0}")]
    Artifact(String),
    #[error("compiler version mismatch: configured {configured}, artifact built with {artifact}")]
    CompilerMismatch { configured: String, artifact: String },
    #[error("no verification service configured for this network")]
    NotConfigured,
}
