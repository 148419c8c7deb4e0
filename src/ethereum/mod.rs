// Network and explorer clients
//
// The orchestrator talks to the chain and to the explorer only through the
// `NetworkClient` and `VerificationService` traits defined here.

pub mod chain;
pub mod etherscan;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use common::{DeployError, VerificationOutcome, VerificationRequest};
use ethers::{
    abi::Token,
    middleware::SignerMiddleware,
    providers::{Http, Middleware, PendingTransaction, Provider},
    signers::{LocalWallet, Signer},
    types::{Address, TransactionRequest, H256, U64},
};

use crate::artifacts::ContractArtifact;
use crate::context::NetworkContext;

pub use chain::{ChainConfig, ChainRegistry};
pub use etherscan::EtherscanVerifier;

/// Where and when a creation transaction landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirmation {
    pub address: Address,
    pub block_number: Option<U64>,
}

/// Submits contract creations and waits for them to be confirmed
#[async_trait]
pub trait NetworkClient {
    /// Send a creation transaction for `artifact` and return its hash
    async fn deploy(&self, artifact: &ContractArtifact, args: &[Token]) -> Result<H256, DeployError>;

    /// Wait until `tx` is buried under `confirmations` blocks
    async fn wait_for_confirmation(
        &self,
        name: &str,
        tx: H256,
        confirmations: usize,
    ) -> Result<Confirmation, DeployError>;
}

/// Registers deployed contracts with an explorer
#[async_trait]
pub trait VerificationService {
    async fn verify(&self, request: &VerificationRequest) -> Result<VerificationOutcome, common::VerifyError>;
}

type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

/// Interface to an EVM network through a signing HTTP provider
pub struct EthereumConnector {
    client: Arc<SignerClient>,
    poll_interval: Duration,
}

impl EthereumConnector {
    /// Create a connector for the context's RPC endpoint and signing key
    pub fn new(ctx: &NetworkContext) -> Result<Self> {
        let poll_interval = ChainRegistry::new().poll_interval(ctx.chain_id);
        let provider = Provider::<Http>::try_from(ctx.rpc_url.as_str())
            .with_context(|| format!("invalid RPC url {}", ctx.rpc_url))?
            .interval(poll_interval);

        let wallet = ctx
            .signing_key
            .expose()
            .parse::<LocalWallet>()
            .context("signing key is not a valid secp256k1 private key")?
            .with_chain_id(ctx.chain_id);

        Ok(Self {
            client: Arc::new(SignerMiddleware::new(provider, wallet)),
            poll_interval,
        })
    }

    /// Account that signs and pays for deployments
    pub fn deployer(&self) -> Address {
        self.client.address()
    }

    /// Fail unless the RPC endpoint serves the configured chain
    pub async fn ensure_chain_id(&self, expected: u64) -> Result<()> {
        let actual = self
            .client
            .get_chainid()
            .await
            .context("failed to query chain id")?
            .as_u64();
        if actual != expected {
            bail!(
                "RPC endpoint serves chain {} but the network is configured for chain {}",
                actual,
                expected
            );
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkClient for EthereumConnector {
    async fn deploy(&self, artifact: &ContractArtifact, args: &[Token]) -> Result<H256, DeployError> {
        let data = artifact.deployment_data(args)?;
        let tx = TransactionRequest::new().from(self.deployer()).data(data);

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| DeployError::Rejected {
                name: artifact.name.clone(),
                reason: e.to_string(),
            })?;

        Ok(pending.tx_hash())
    }

    async fn wait_for_confirmation(
        &self,
        name: &str,
        tx: H256,
        confirmations: usize,
    ) -> Result<Confirmation, DeployError> {
        let receipt = PendingTransaction::new(tx, self.client.provider())
            .interval(self.poll_interval)
            .confirmations(confirmations.max(1))
            .await
            .map_err(|e| DeployError::Network(e.to_string()))?
            .ok_or_else(|| DeployError::Dropped {
                name: name.to_string(),
                tx,
            })?;

        if receipt.status == Some(U64::zero()) {
            return Err(DeployError::Reverted {
                name: name.to_string(),
                tx,
            });
        }

        let address = receipt
            .contract_address
            .ok_or_else(|| DeployError::MissingAddress {
                name: name.to_string(),
                tx,
            })?;

        Ok(Confirmation {
            address,
            block_number: receipt.block_number,
        })
    }
}
