use ethers::abi::Token;
use ethers::types::{Address, H256, U64};
use serde::{Deserialize, Serialize};

/// Artifact name of the marketplace contract
pub const MARKETPLACE_CONTRACT: &str = "NFTMarket";

/// Artifact name of the token contract
pub const TOKEN_CONTRACT: &str = "NFT";

/// Which of the two harness contracts a value refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractRole {
    Marketplace,
    Token,
}

impl ContractRole {
    /// Artifact name backing this role
    pub fn contract_name(&self) -> &'static str {
        match self {
            ContractRole::Marketplace => MARKETPLACE_CONTRACT,
            ContractRole::Token => TOKEN_CONTRACT,
        }
    }
}

/// A contract to deploy: artifact name plus ordered constructor arguments
#[derive(Debug, Clone, PartialEq)]
pub struct DeploymentTarget {
    /// Contract name as found in the compiler artifacts
    pub name: String,
    /// Constructor arguments, in declaration order
    pub constructor_args: Vec<Token>,
}

impl DeploymentTarget {
    pub fn new(name: impl Into<String>, constructor_args: Vec<Token>) -> Self {
        Self {
            name: name.into(),
            constructor_args,
        }
    }

    /// The marketplace takes no constructor arguments
    pub fn marketplace() -> Self {
        Self::new(MARKETPLACE_CONTRACT, Vec::new())
    }

    /// The token is parameterised by a confirmed marketplace deployment.
    ///
    /// Taking a `DeployedContract` rather than a bare address keeps the token
    /// from being targeted before the marketplace is on chain.
    pub fn token(marketplace: &DeployedContract) -> Self {
        Self::new(TOKEN_CONTRACT, vec![Token::Address(marketplace.address)])
    }
}

/// A confirmed deployment
#[derive(Debug, Clone, PartialEq)]
pub struct DeployedContract {
    /// On-chain address of the contract
    pub address: Address,
    /// What was deployed
    pub target: DeploymentTarget,
    /// Creation transaction
    pub transaction_hash: H256,
    /// Block the creation transaction was included in
    pub block_number: Option<U64>,
}

impl DeployedContract {
    pub fn name(&self) -> &str {
        &self.target.name
    }
}

/// Request to register a deployed contract's source with an explorer
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationRequest {
    pub contract_name: String,
    pub address: Address,
    pub constructor_args: Vec<Token>,
}

impl VerificationRequest {
    pub fn new(contract_name: impl Into<String>, address: Address, constructor_args: Vec<Token>) -> Self {
        Self {
            contract_name: contract_name.into(),
            address,
            constructor_args,
        }
    }

    /// Build a request from a confirmed deployment, reusing its constructor arguments
    pub fn for_deployment(contract: &DeployedContract) -> Self {
        Self::new(
            contract.target.name.clone(),
            contract.address,
            contract.target.constructor_args.clone(),
        )
    }
}

/// Successful verification results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationOutcome {
    /// The explorer accepted and verified the submission
    Verified { guid: String },
    /// The explorer already had source for this address
    AlreadyVerified,
}

/// Render an ABI token for logs and reports. Addresses keep their `0x` prefix.
pub fn format_token(token: &Token) -> String {
    match token {
        Token::Address(address) => format!("{:?}", address),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deployed(address: Address) -> DeployedContract {
        DeployedContract {
            address,
            target: DeploymentTarget::marketplace(),
            transaction_hash: H256::repeat_byte(0x11),
            block_number: Some(U64::from(7)),
        }
    }

    #[test]
    fn test_token_target_uses_marketplace_address() {
        let marketplace = deployed(Address::repeat_byte(0xaa));
        let token = DeploymentTarget::token(&marketplace);

        assert_eq!(token.name, TOKEN_CONTRACT);
        assert_eq!(token.constructor_args, vec![Token::Address(marketplace.address)]);
    }

    #[test]
    fn test_verification_request_copies_constructor_args() {
        let marketplace = deployed(Address::repeat_byte(0xaa));
        let request = VerificationRequest::for_deployment(&marketplace);

        assert_eq!(request.contract_name, MARKETPLACE_CONTRACT);
        assert_eq!(request.address, marketplace.address);
        assert!(request.constructor_args.is_empty());
    }

    #[test]
    fn test_format_token_keeps_address_prefix() {
        let token = Token::Address(Address::repeat_byte(0xaa));
        assert_eq!(
            format_token(&token),
            "0xaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
        );
    }

    #[test]
    fn test_role_names() {
        assert_eq!(ContractRole::Marketplace.contract_name(), "NFTMarket");
        assert_eq!(ContractRole::Token.contract_name(), "NFT");
    }
}
