//! Deployment harness for the NFT marketplace and token contracts.
//!
//! A run deploys `NFTMarket`, deploys `NFT` bound to the marketplace address,
//! and verifies both on the explorer when targeting the verification chain.

pub mod artifacts;
pub mod config;
pub mod context;
pub mod ethereum;
pub mod orchestrator;
pub mod report;

pub use artifacts::{ArtifactStore, ContractArtifact, ContractFactory};
pub use config::{ConfigManager, HarnessConfig};
pub use context::NetworkContext;
pub use orchestrator::{DeploymentOrchestrator, DeploymentRun, DeploymentStage};
pub use report::{DeploymentReport, ReportFormat, ReportFormatter};
