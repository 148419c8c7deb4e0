// Deployment reports
//
// Summarises a finished run for the operator and for later tooling, and maps
// the run to the process exit status.

use std::fs;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use common::{format_token, ContractRole, DeployedContract, VerificationOutcome};
use ethers::types::{Address, H256, U64};
use serde::{Deserialize, Serialize};

use crate::context::NetworkContext;
use crate::orchestrator::{DeploymentRun, VerificationResult, VerificationSummary};

/// Exit status when every step succeeded
pub const EXIT_SUCCESS: u8 = 0;

/// Exit status for an aborted run
pub const EXIT_FAILURE: u8 = 1;

/// Exit status when contracts are deployed but verification failed
pub const EXIT_VERIFICATION_FAILED: u8 = 2;

/// Report output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Json,
}

/// One deployed contract
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractRecord {
    pub role: ContractRole,
    pub name: String,
    pub address: Address,
    pub transaction_hash: H256,
    pub block_number: Option<U64>,
    pub constructor_args: Vec<String>,
    /// Explorer page, when the network has an explorer
    pub explorer_url: Option<String>,
}

/// Result of one verification attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationStatus {
    Verified { guid: String },
    AlreadyVerified,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRecord {
    pub role: ContractRole,
    pub name: String,
    pub address: Address,
    #[serde(flatten)]
    pub status: VerificationStatus,
}

/// Verification branch as reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "branch", rename_all = "snake_case")]
pub enum VerificationReport {
    Skipped,
    Attempted { results: Vec<VerificationRecord> },
}

/// Summary of a completed deployment run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub network: String,
    pub chain_id: u64,
    pub timestamp: DateTime<Utc>,
    pub contracts: Vec<ContractRecord>,
    pub verification: VerificationReport,
}

impl DeploymentReport {
    /// Build the report for a run on `ctx`
    pub fn new(ctx: &NetworkContext, run: &DeploymentRun) -> Self {
        let record = |role: ContractRole, contract: &DeployedContract| ContractRecord {
            role,
            name: contract.name().to_string(),
            address: contract.address,
            transaction_hash: contract.transaction_hash,
            block_number: contract.block_number,
            constructor_args: contract
                .target
                .constructor_args
                .iter()
                .map(format_token)
                .collect(),
            explorer_url: ctx
                .explorer
                .as_ref()
                .map(|e| e.address_url(&format!("{:?}", contract.address))),
        };

        let verification = match &run.verification {
            VerificationSummary::Skipped => VerificationReport::Skipped,
            VerificationSummary::Attempted(results) => VerificationReport::Attempted {
                results: results.iter().map(VerificationRecord::from).collect(),
            },
        };

        Self {
            network: ctx.network.clone(),
            chain_id: ctx.chain_id,
            timestamp: Utc::now(),
            contracts: vec![
                record(ContractRole::Marketplace, &run.marketplace),
                record(ContractRole::Token, &run.token),
            ],
            verification,
        }
    }

    /// Verification attempts that failed
    pub fn verification_failures(&self) -> usize {
        match &self.verification {
            VerificationReport::Skipped => 0,
            VerificationReport::Attempted { results } => results
                .iter()
                .filter(|r| matches!(r.status, VerificationStatus::Failed { .. }))
                .count(),
        }
    }

    /// Process exit status for this run
    pub fn exit_code(&self) -> u8 {
        if self.verification_failures() == 0 {
            EXIT_SUCCESS
        } else {
            EXIT_VERIFICATION_FAILED
        }
    }
}

impl From<&VerificationResult> for VerificationRecord {
    fn from(result: &VerificationResult) -> Self {
        let status = match &result.result {
            Ok(VerificationOutcome::Verified { guid }) => VerificationStatus::Verified { guid: guid.clone() },
            Ok(VerificationOutcome::AlreadyVerified) => VerificationStatus::AlreadyVerified,
            Err(e) => VerificationStatus::Failed { error: e.to_string() },
        };
        Self {
            role: result.role,
            name: result.request.contract_name.clone(),
            address: result.request.address,
            status,
        }
    }
}

/// Renders and stores deployment reports
pub struct ReportFormatter;

impl ReportFormatter {
    /// Format report as JSON
    pub fn to_json(report: &DeploymentReport) -> Result<String> {
        Ok(serde_json::to_string_pretty(report)?)
    }

    /// Format report as plain text
    pub fn to_text(report: &DeploymentReport) -> String {
        let mut output = String::new();
        output.push_str(&format!("Deployment to {} (chain {})\n", report.network, report.chain_id));
        output.push_str(&format!("Completed: {}\n\n", report.timestamp.to_rfc3339()));

        for contract in &report.contracts {
            output.push_str(&format!("{} deployed to: {:?}\n", contract.name, contract.address));
            output.push_str(&format!("  transaction: {:?}\n", contract.transaction_hash));
            if let Some(block) = contract.block_number {
                output.push_str(&format!("  block: {}\n", block));
            }
            if !contract.constructor_args.is_empty() {
                output.push_str(&format!("  constructor args: [{}]\n", contract.constructor_args.join(", ")));
            }
            if let Some(url) = &contract.explorer_url {
                output.push_str(&format!("  explorer: {}\n", url));
            }
        }
        output.push('\n');

        match &report.verification {
            VerificationReport::Skipped => output.push_str("verification skipped...\n"),
            VerificationReport::Attempted { results } => {
                for result in results {
                    let status = match &result.status {
                        VerificationStatus::Verified { .. } => "verified".to_string(),
                        VerificationStatus::AlreadyVerified => "already verified".to_string(),
                        VerificationStatus::Failed { error } => format!("FAILED: {}", error),
                    };
                    output.push_str(&format!("{} verification: {}\n", result.name, status));
                }
            }
        }

        output
    }

    /// Render in the requested format
    pub fn render(report: &DeploymentReport, format: ReportFormat) -> Result<String> {
        match format {
            ReportFormat::Json => Self::to_json(report),
            ReportFormat::Text => Ok(Self::to_text(report)),
        }
    }

    /// Save report to file
    pub fn save_to_file<P: AsRef<Path>>(report: &DeploymentReport, path: P, format: ReportFormat) -> Result<()> {
        fs::write(path, Self::render(report, format)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HarnessConfig;
    use crate::orchestrator::DeploymentStage;
    use common::{DeploymentTarget, VerificationRequest, VerifyError};
    use ethers::abi::Token;
    use tempfile::tempdir;

    fn context(network: &str) -> NetworkContext {
        HarnessConfig::default()
            .resolve_with(Some(network), |_| Some("0x01".to_string()))
            .unwrap()
    }

    fn run(verification: VerificationSummary) -> DeploymentRun {
        let marketplace = DeployedContract {
            address: Address::repeat_byte(0xaa),
            target: DeploymentTarget::marketplace(),
            transaction_hash: H256::repeat_byte(0x01),
            block_number: Some(U64::from(10)),
        };
        let token = DeployedContract {
            address: Address::repeat_byte(0xbb),
            target: DeploymentTarget::token(&marketplace),
            transaction_hash: H256::repeat_byte(0x02),
            block_number: Some(U64::from(11)),
        };
        DeploymentRun {
            marketplace,
            token,
            verification,
            stages: vec![DeploymentStage::Start, DeploymentStage::Done],
        }
    }

    fn attempted(token_result: Result<VerificationOutcome, VerifyError>) -> VerificationSummary {
        VerificationSummary::Attempted(vec![
            VerificationResult {
                role: ContractRole::Marketplace,
                request: VerificationRequest::new("NFTMarket", Address::repeat_byte(0xaa), vec![]),
                result: Ok(VerificationOutcome::AlreadyVerified),
            },
            VerificationResult {
                role: ContractRole::Token,
                request: VerificationRequest::new(
                    "NFT",
                    Address::repeat_byte(0xbb),
                    vec![Token::Address(Address::repeat_byte(0xaa))],
                ),
                result: token_result,
            },
        ])
    }

    #[test]
    fn test_skipped_report() {
        let report = DeploymentReport::new(&context("localhost"), &run(VerificationSummary::Skipped));

        assert_eq!(report.exit_code(), EXIT_SUCCESS);
        assert_eq!(report.contracts.len(), 2);
        assert_eq!(report.contracts[1].constructor_args, vec![format!("{:?}", Address::repeat_byte(0xaa))]);
        assert!(report.contracts[0].explorer_url.is_none());

        let text = ReportFormatter::to_text(&report);
        assert!(text.contains("NFTMarket deployed to: 0xaaaa"));
        assert!(text.contains("verification skipped..."));
    }

    #[test]
    fn test_verification_failure_sets_exit_code() {
        let report = DeploymentReport::new(
            &context("snowtrace"),
            &run(attempted(Err(VerifyError::Rejected("bytecode mismatch".to_string())))),
        );

        assert_eq!(report.verification_failures(), 1);
        assert_eq!(report.exit_code(), EXIT_VERIFICATION_FAILED);
        assert!(ReportFormatter::to_text(&report).contains("NFT verification: FAILED"));
        assert_eq!(
            report.contracts[0].explorer_url.as_deref(),
            Some("https://testnet.snowtrace.io/address/0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa")
        );
    }

    #[test]
    fn test_json_report_save_load() -> Result<()> {
        let report = DeploymentReport::new(
            &context("snowtrace"),
            &run(attempted(Ok(VerificationOutcome::Verified {
                guid: "abc".to_string(),
            }))),
        );
        let dir = tempdir()?;
        let path = dir.path().join("snowtrace.json");

        ReportFormatter::save_to_file(&report, &path, ReportFormat::Json)?;
        let loaded: DeploymentReport = serde_json::from_str(&fs::read_to_string(&path)?)?;

        assert_eq!(loaded, report);
        assert_eq!(loaded.exit_code(), EXIT_SUCCESS);
        Ok(())
    }
}
