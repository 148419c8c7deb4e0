// Deployment orchestrator
//
// Deploys the marketplace, then the token bound to the marketplace address,
// then verifies both when the run targets the verification chain. Deployment
// failures abort the run; verification failures are collected and reported.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use common::{
    format_token, ContractRole, DeployError, DeployedContract, DeploymentTarget,
    VerificationOutcome, VerificationRequest, VerifyError,
};
use log::{debug, error, info, warn};
use thiserror::Error;

use crate::artifacts::ContractFactory;
use crate::context::NetworkContext;
use crate::ethereum::{NetworkClient, VerificationService};

/// Progress of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentStage {
    Start,
    MarketplaceDeployed,
    TokenDeployed,
    Verifying,
    SkipVerify,
    Done,
    Aborted,
}

impl fmt::Display for DeploymentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeploymentStage::Start => "start",
            DeploymentStage::MarketplaceDeployed => "marketplace deployed",
            DeploymentStage::TokenDeployed => "token deployed",
            DeploymentStage::Verifying => "verifying",
            DeploymentStage::SkipVerify => "verification skipped",
            DeploymentStage::Done => "done",
            DeploymentStage::Aborted => "aborted",
        };
        f.write_str(name)
    }
}

/// Outcome of one verification request
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationResult {
    pub role: ContractRole,
    pub request: VerificationRequest,
    pub result: Result<VerificationOutcome, VerifyError>,
}

/// What happened in the verification branch
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationSummary {
    /// The chain is not the verification chain
    Skipped,
    /// Both requests were attempted, in order
    Attempted(Vec<VerificationResult>),
}

impl VerificationSummary {
    /// Number of requests that did not end verified
    pub fn failures(&self) -> usize {
        match self {
            VerificationSummary::Skipped => 0,
            VerificationSummary::Attempted(results) => {
                results.iter().filter(|r| r.result.is_err()).count()
            }
        }
    }
}

/// A run that got both contracts on chain
#[derive(Debug, Clone)]
pub struct DeploymentRun {
    pub marketplace: DeployedContract,
    pub token: DeployedContract,
    pub verification: VerificationSummary,
    /// Stages passed through, in order
    pub stages: Vec<DeploymentStage>,
}

impl DeploymentRun {
    /// True when nothing needs operator attention
    pub fn is_complete(&self) -> bool {
        self.verification.failures() == 0
    }
}

/// A run aborted by a deployment failure
#[derive(Debug, Error)]
#[error("deployment aborted at stage `{stage}`: {error}{}", orphan_note(.orphaned))]
pub struct DeploymentFailure {
    /// Last stage reached before the failure
    pub stage: DeploymentStage,
    #[source]
    pub error: DeployError,
    /// Marketplace left on chain without a token
    pub orphaned: Option<DeployedContract>,
}

fn orphan_note(orphaned: &Option<DeployedContract>) -> String {
    match orphaned {
        Some(contract) => format!("; {} remains deployed at {:?}", contract.name(), contract.address),
        None => String::new(),
    }
}

/// Runs the deployment sequence against one network
pub struct DeploymentOrchestrator<'a, F, N, V> {
    ctx: &'a NetworkContext,
    factory: &'a F,
    network: &'a N,
    verifier: Option<&'a V>,
    stages: Vec<DeploymentStage>,
}

impl<'a, F, N, V> DeploymentOrchestrator<'a, F, N, V>
where
    F: ContractFactory,
    N: NetworkClient,
    V: VerificationService,
{
    pub fn new(
        ctx: &'a NetworkContext,
        factory: &'a F,
        network: &'a N,
        verifier: Option<&'a V>,
    ) -> Self {
        Self {
            ctx,
            factory,
            network,
            verifier,
            stages: vec![DeploymentStage::Start],
        }
    }

    /// Current stage
    pub fn stage(&self) -> DeploymentStage {
        self.stages.last().copied().unwrap_or(DeploymentStage::Start)
    }

    fn advance(&mut self, stage: DeploymentStage) {
        debug!("stage: {} -> {}", self.stage(), stage);
        self.stages.push(stage);
    }

    fn abort(&mut self, error: DeployError, orphaned: Option<DeployedContract>) -> DeploymentFailure {
        let stage = self.stage();
        error!("{}", error);
        if let Some(contract) = &orphaned {
            warn!(
                "{} remains deployed at {:?} without a token contract",
                contract.name(),
                contract.address
            );
        }
        self.advance(DeploymentStage::Aborted);
        DeploymentFailure {
            stage,
            error,
            orphaned,
        }
    }

    /// Execute the full sequence
    pub async fn run(mut self) -> Result<DeploymentRun, DeploymentFailure> {
        info!(
            "deploying to {} (chain {})",
            self.ctx.network, self.ctx.chain_id
        );

        let deployed = self
            .deploy(
                &DeploymentTarget::marketplace(),
                self.ctx.settings.marketplace_confirmations,
            )
            .await;
        let marketplace = match deployed {
            Ok(contract) => contract,
            Err(e) => return Err(self.abort(e, None)),
        };
        self.advance(DeploymentStage::MarketplaceDeployed);

        let deployed = self
            .deploy(
                &DeploymentTarget::token(&marketplace),
                self.ctx.settings.token_confirmations,
            )
            .await;
        let token = match deployed {
            Ok(contract) => contract,
            Err(e) => return Err(self.abort(e, Some(marketplace))),
        };
        self.advance(DeploymentStage::TokenDeployed);

        let verification = if self.ctx.verification_enabled() {
            self.advance(DeploymentStage::Verifying);
            info!("chain {} is the verification chain, verifying contracts", self.ctx.chain_id);
            let results = self
                .verify_all(vec![
                    (ContractRole::Marketplace, VerificationRequest::for_deployment(&marketplace)),
                    (ContractRole::Token, VerificationRequest::for_deployment(&token)),
                ])
                .await;
            VerificationSummary::Attempted(results)
        } else {
            self.advance(DeploymentStage::SkipVerify);
            info!("verification skipped on chain {}", self.ctx.chain_id);
            VerificationSummary::Skipped
        };

        self.advance(DeploymentStage::Done);

        Ok(DeploymentRun {
            marketplace,
            token,
            verification,
            stages: self.stages,
        })
    }

    async fn deploy(
        &self,
        target: &DeploymentTarget,
        confirmations: usize,
    ) -> Result<DeployedContract, DeployError> {
        let artifact = self.factory.load(&target.name)?;
        let args: Vec<String> = target.constructor_args.iter().map(format_token).collect();
        info!("deploying {} with args [{}]", target.name, args.join(", "));

        let tx = with_timeout(
            format!("submitting {}", target.name),
            self.ctx.rpc_timeout(),
            self.network.deploy(&artifact, &target.constructor_args),
        )
        .await?;
        info!(
            "{} creation transaction {:?}, waiting for {} confirmation(s)",
            target.name, tx, confirmations
        );

        let confirmation = with_timeout(
            format!("confirming {}", target.name),
            self.ctx.confirmation_timeout(),
            self.network
                .wait_for_confirmation(&target.name, tx, confirmations),
        )
        .await?;
        info!("{} deployed to: {:?}", target.name, confirmation.address);

        Ok(DeployedContract {
            address: confirmation.address,
            target: target.clone(),
            transaction_hash: tx,
            block_number: confirmation.block_number,
        })
    }

    /// Attempt every request; one failure never prevents the next attempt
    async fn verify_all(
        &self,
        requests: Vec<(ContractRole, VerificationRequest)>,
    ) -> Vec<VerificationResult> {
        let mut results = Vec::with_capacity(requests.len());
        for (role, request) in requests {
            let result = match self.verifier {
                Some(verifier) => {
                    verify_with_timeout(verifier, &request, self.ctx.verification_timeout()).await
                }
                None => Err(VerifyError::NotConfigured),
            };
            results.push(VerificationResult {
                role,
                request,
                result,
            });
        }
        results
    }
}

/// Verify one request under a time limit, logging the outcome
pub async fn verify_with_timeout<V: VerificationService + ?Sized>(
    verifier: &V,
    request: &VerificationRequest,
    limit: Duration,
) -> Result<VerificationOutcome, VerifyError> {
    info!("verifying {} at {:?}", request.contract_name, request.address);
    let result = match tokio::time::timeout(limit, verifier.verify(request)).await {
        Ok(result) => result,
        Err(_) => Err(VerifyError::Timeout(limit.as_secs())),
    };

    match &result {
        Ok(VerificationOutcome::Verified { .. }) => {
            info!("{} verified", request.contract_name)
        }
        Ok(VerificationOutcome::AlreadyVerified) => {
            info!("{} was already verified", request.contract_name)
        }
        Err(e) => warn!("verification of {} failed: {}", request.contract_name, e),
    }
    result
}

async fn with_timeout<T, Fut>(step: String, limit: Duration, fut: Fut) -> Result<T, DeployError>
where
    Fut: Future<Output = Result<T, DeployError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(DeployError::Timeout {
            step,
            secs: limit.as_secs(),
        }),
    }
}
