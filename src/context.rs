// Network context
//
// Everything a deployment run needs to know about its target network, resolved
// once at startup and handed to the orchestrator by reference.

use std::fmt;
use std::time::Duration;

use crate::config::DeploymentSettings;

/// Private key used to sign transactions. Never printed.
#[derive(Clone, PartialEq, Eq)]
pub struct SigningKey(String);

impl SigningKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Raw key material, without a `0x` prefix
    pub fn expose(&self) -> &str {
        self.0.trim().trim_start_matches("0x")
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SigningKey(<redacted>)")
    }
}

/// Etherscan-compatible explorer endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerEndpoint {
    /// Base URL of the explorer API
    pub api_url: String,
    /// Human-facing explorer URL
    pub browser_url: String,
    /// API key, may be a placeholder for explorers that do not need one
    pub api_key: String,
}

impl ExplorerEndpoint {
    /// Browser link to a contract page
    pub fn address_url(&self, address: &str) -> String {
        format!("{}/address/{}", self.browser_url.trim_end_matches('/'), address)
    }
}

/// Read-only description of the network a run targets
#[derive(Debug, Clone)]
pub struct NetworkContext {
    /// Network name from the configuration file
    pub network: String,
    /// Configured chain identifier
    pub chain_id: u64,
    /// JSON-RPC endpoint
    pub rpc_url: String,
    /// Signing credential
    pub signing_key: SigningKey,
    /// Verification endpoint, if the network has one
    pub explorer: Option<ExplorerEndpoint>,
    /// Chain on which deployments are verified
    pub verification_chain_id: u64,
    /// Compiler version the artifacts are expected to be built with
    pub compiler_version: String,
    /// Confirmation counts and timeouts
    pub settings: DeploymentSettings,
}

impl NetworkContext {
    /// Whether deployments on this network go through explorer verification
    pub fn verification_enabled(&self) -> bool {
        self.chain_id == self.verification_chain_id
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.rpc_timeout_secs)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.confirmation_timeout_secs)
    }

    pub fn verification_timeout(&self) -> Duration {
        Duration::from_secs(self.settings.verification_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signing_key_is_redacted() {
        let key = SigningKey::new("0xdeadbeef");
        assert_eq!(format!("{:?}", key), "SigningKey(<redacted>)");
        assert_eq!(key.expose(), "deadbeef");
    }

    #[test]
    fn test_address_url() {
        let explorer = ExplorerEndpoint {
            api_url: "https://api.example.org".to_string(),
            browser_url: "https://testnet.snowtrace.io/".to_string(),
            api_key: "snowtrace".to_string(),
        };
        assert_eq!(
            explorer.address_url("0xabc"),
            "https://testnet.snowtrace.io/address/0xabc"
        );
    }
}
