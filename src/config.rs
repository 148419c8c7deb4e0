// Configuration for nft-deploy
//
// The harness configuration names the compiler version, the networks a run can
// target and the explorers used for verification. It is loaded from JSON and
// resolved into a `NetworkContext` before any transaction is sent.

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::context::{ExplorerEndpoint, NetworkContext, SigningKey};
use crate::ethereum::chain::{ChainRegistry, AVALANCHE_FUJI_CHAIN_ID, LOCAL_DEV_CHAIN_ID};

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "deploy.config.json";

/// Environment variable holding the signing key unless a network overrides it
pub const DEFAULT_PRIVATE_KEY_ENV: &str = "PRIVATEKEY";

/// Top-level harness configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Solidity compiler version the artifacts are built with
    pub solidity: String,

    /// Network used when none is given on the command line
    pub default_network: String,

    /// Chain on which deployments are verified
    pub verification_chain_id: u64,

    /// Directory holding compiler artifacts
    pub artifacts: PathBuf,

    /// Named networks
    pub networks: BTreeMap<String, NetworkConfig>,

    /// Explorer settings
    pub etherscan: EtherscanConfig,

    /// Confirmation counts and timeouts
    pub deployment: DeploymentSettings,
}

/// A named network
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// JSON-RPC endpoint
    pub url: String,

    /// Expected chain id
    pub chain_id: u64,

    /// Environment variable holding the signing key
    #[serde(default = "default_private_key_env")]
    pub private_key_env: String,
}

fn default_private_key_env() -> String {
    DEFAULT_PRIVATE_KEY_ENV.to_string()
}

impl NetworkConfig {
    pub fn new(url: &str, chain_id: u64) -> Self {
        Self {
            url: url.to_string(),
            chain_id,
            private_key_env: default_private_key_env(),
        }
    }
}

/// Explorer API keys and custom explorer endpoints
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EtherscanConfig {
    /// API key per network name
    pub api_key: BTreeMap<String, String>,

    /// Explorers for chains not covered by the built-in registry
    pub custom_chains: Vec<CustomChain>,
}

/// Explorer endpoint bound to a network name and chain id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomChain {
    pub network: String,
    pub chain_id: u64,
    pub urls: CustomChainUrls,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomChainUrls {
    pub api_url: String,
    pub browser_url: String,
}

/// Confirmation policy and per-call timeouts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentSettings {
    /// Confirmations awaited for the marketplace deployment
    pub marketplace_confirmations: usize,

    /// Confirmations awaited for the token deployment
    pub token_confirmations: usize,

    /// Timeout for submitting a transaction
    pub rpc_timeout_secs: u64,

    /// Timeout for reaching the requested confirmations
    pub confirmation_timeout_secs: u64,

    /// Timeout for one verification request, polling included
    pub verification_timeout_secs: u64,
}

impl Default for DeploymentSettings {
    fn default() -> Self {
        Self {
            marketplace_confirmations: 1,
            token_confirmations: 6,
            rpc_timeout_secs: 60,
            confirmation_timeout_secs: 600,
            verification_timeout_secs: 300,
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        let mut networks = BTreeMap::new();
        networks.insert(
            "localhost".to_string(),
            NetworkConfig::new("http://127.0.0.1:8545", LOCAL_DEV_CHAIN_ID),
        );
        networks.insert(
            "snowtrace".to_string(),
            NetworkConfig::new(
                "https://api.avax-test.network/ext/bc/C/rpc",
                AVALANCHE_FUJI_CHAIN_ID,
            ),
        );

        let mut api_key = BTreeMap::new();
        // Routescan does not need a key, any placeholder is accepted
        api_key.insert("snowtrace".to_string(), "snowtrace".to_string());

        Self {
            solidity: "0.8.27".to_string(),
            default_network: "localhost".to_string(),
            verification_chain_id: AVALANCHE_FUJI_CHAIN_ID,
            artifacts: PathBuf::from("artifacts"),
            networks,
            etherscan: EtherscanConfig {
                api_key,
                custom_chains: vec![CustomChain {
                    network: "snowtrace".to_string(),
                    chain_id: AVALANCHE_FUJI_CHAIN_ID,
                    urls: CustomChainUrls {
                        api_url: "https://api.routescan.io/v2/network/testnet/evm/43113/etherscan"
                            .to_string(),
                        browser_url: "https://testnet.snowtrace.io".to_string(),
                    },
                }],
            },
            deployment: DeploymentSettings::default(),
        }
    }
}

impl HarnessConfig {
    /// Resolve a network against the process environment
    pub fn resolve(&self, network: Option<&str>) -> Result<NetworkContext> {
        self.resolve_with(network, |var| env::var(var).ok())
    }

    /// Resolve a network, reading secrets through `lookup`
    pub fn resolve_with<F>(&self, network: Option<&str>, lookup: F) -> Result<NetworkContext>
    where
        F: Fn(&str) -> Option<String>,
    {
        let name = network.unwrap_or(&self.default_network);
        let net = self.networks.get(name).ok_or_else(|| {
            let known: Vec<&str> = self.networks.keys().map(String::as_str).collect();
            anyhow!("unknown network `{}` (configured: {})", name, known.join(", "))
        })?;

        let key = lookup(&net.private_key_env)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "signing key for network `{}` not found: set {}",
                    name,
                    net.private_key_env
                )
            })?;

        let explorer = self.explorer_for(name, net.chain_id);
        if net.chain_id == self.verification_chain_id && explorer.is_none() {
            bail!(
                "network `{}` (chain {}) requires verification but has no explorer configured",
                name,
                net.chain_id
            );
        }

        Ok(NetworkContext {
            network: name.to_string(),
            chain_id: net.chain_id,
            rpc_url: net.url.clone(),
            signing_key: SigningKey::new(key),
            explorer,
            verification_chain_id: self.verification_chain_id,
            compiler_version: self.solidity.clone(),
            settings: self.deployment.clone(),
        })
    }

    /// Explorer for a network: a matching custom chain first, then the built-in registry
    fn explorer_for(&self, network: &str, chain_id: u64) -> Option<ExplorerEndpoint> {
        let api_key = self
            .etherscan
            .api_key
            .get(network)
            .cloned()
            .unwrap_or_default();

        if let Some(custom) = self
            .etherscan
            .custom_chains
            .iter()
            .find(|c| c.network == network && c.chain_id == chain_id)
        {
            return Some(ExplorerEndpoint {
                api_url: custom.urls.api_url.clone(),
                browser_url: custom.urls.browser_url.clone(),
                api_key,
            });
        }

        ChainRegistry::new()
            .get_config(chain_id)
            .and_then(|chain| chain.explorer.clone())
            .map(|urls| ExplorerEndpoint {
                api_url: urls.api_url,
                browser_url: urls.browser_url,
                api_key,
            })
    }
}

/// Configuration manager for nft-deploy
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from a file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<HarnessConfig> {
        let path = path.as_ref();
        let config_str = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let config = serde_json::from_str(&config_str)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Load the file if it exists, otherwise fall back to the defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<HarnessConfig> {
        if path.as_ref().exists() {
            Self::load_from_file(path)
        } else {
            log::warn!(
                "{} not found, using built-in configuration",
                path.as_ref().display()
            );
            Ok(HarnessConfig::default())
        }
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &HarnessConfig, path: P) -> Result<()> {
        let config_str = serde_json::to_string_pretty(config)?;
        fs::write(path, config_str)?;
        Ok(())
    }

    /// Create a builder for configuration
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for creating configurations
#[derive(Default)]
pub struct ConfigBuilder {
    config: HarnessConfig,
}

impl ConfigBuilder {
    /// Set the compiler version
    pub fn solidity(mut self, version: &str) -> Self {
        self.config.solidity = version.to_string();
        self
    }

    /// Set the network used when none is requested
    pub fn default_network(mut self, name: &str) -> Self {
        self.config.default_network = name.to_string();
        self
    }

    /// Set the chain on which deployments are verified
    pub fn verification_chain_id(mut self, chain_id: u64) -> Self {
        self.config.verification_chain_id = chain_id;
        self
    }

    /// Set the artifacts directory
    pub fn artifacts<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.artifacts = dir.into();
        self
    }

    /// Add or replace a network
    pub fn network(mut self, name: &str, network: NetworkConfig) -> Self {
        self.config.networks.insert(name.to_string(), network);
        self
    }

    /// Set the explorer API key for a network
    pub fn api_key(mut self, network: &str, key: &str) -> Self {
        self.config
            .etherscan
            .api_key
            .insert(network.to_string(), key.to_string());
        self
    }

    /// Register an explorer for a network
    pub fn custom_chain(mut self, network: &str, chain_id: u64, api_url: &str, browser_url: &str) -> Self {
        self.config
            .etherscan
            .custom_chains
            .retain(|c| c.network != network);
        self.config.etherscan.custom_chains.push(CustomChain {
            network: network.to_string(),
            chain_id,
            urls: CustomChainUrls {
                api_url: api_url.to_string(),
                browser_url: browser_url.to_string(),
            },
        });
        self
    }

    /// Set the confirmations awaited for the marketplace
    pub fn marketplace_confirmations(mut self, value: usize) -> Self {
        self.config.deployment.marketplace_confirmations = value;
        self
    }

    /// Set the confirmations awaited for the token
    pub fn token_confirmations(mut self, value: usize) -> Self {
        self.config.deployment.token_confirmations = value;
        self
    }

    /// Set the submission timeout
    pub fn rpc_timeout_secs(mut self, value: u64) -> Self {
        self.config.deployment.rpc_timeout_secs = value;
        self
    }

    /// Set the confirmation timeout
    pub fn confirmation_timeout_secs(mut self, value: u64) -> Self {
        self.config.deployment.confirmation_timeout_secs = value;
        self
    }

    /// Set the per-request verification timeout
    pub fn verification_timeout_secs(mut self, value: u64) -> Self {
        self.config.deployment.verification_timeout_secs = value;
        self
    }

    /// Build the configuration
    pub fn build(self) -> HarnessConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn with_key(var: &str) -> Option<String> {
        (var == DEFAULT_PRIVATE_KEY_ENV).then(|| "0x01".to_string())
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigManager::builder()
            .solidity("0.8.20")
            .token_confirmations(2)
            .network("dev", NetworkConfig::new("http://localhost:9545", 1337))
            .build();

        assert_eq!(config.solidity, "0.8.20");
        assert_eq!(config.deployment.token_confirmations, 2);
        assert_eq!(config.deployment.marketplace_confirmations, 1);
        assert_eq!(config.networks["dev"].chain_id, 1337);
        assert!(config.networks.contains_key("snowtrace"));
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("deploy.config.json");

        let config = ConfigManager::builder()
            .token_confirmations(3)
            .api_key("snowtrace", "key")
            .build();

        ConfigManager::save_to_file(&config, &file_path)?;
        let loaded_config = ConfigManager::load_from_file(&file_path)?;

        assert_eq!(loaded_config, config);

        Ok(())
    }

    #[test]
    fn test_partial_file_uses_defaults() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("deploy.config.json");
        fs::write(
            &file_path,
            r#"{ "networks": { "fuji": { "url": "https://rpc.example", "chain_id": 43113 } } }"#,
        )?;

        let config = ConfigManager::load_from_file(&file_path)?;
        assert_eq!(config.solidity, "0.8.27");
        assert_eq!(config.deployment.token_confirmations, 6);
        assert_eq!(config.networks["fuji"].private_key_env, "PRIVATEKEY");
        assert!(!config.networks.contains_key("localhost"));

        Ok(())
    }

    #[test]
    fn test_load_or_default_without_file() -> Result<()> {
        let dir = tempdir()?;
        let config = ConfigManager::load_or_default(dir.path().join("missing.json"))?;
        assert_eq!(config, HarnessConfig::default());
        Ok(())
    }

    #[test]
    fn test_resolve_test_network() -> Result<()> {
        let config = HarnessConfig::default();
        let ctx = config.resolve_with(Some("snowtrace"), with_key)?;

        assert_eq!(ctx.chain_id, AVALANCHE_FUJI_CHAIN_ID);
        assert!(ctx.verification_enabled());
        let explorer = ctx.explorer.as_ref().unwrap();
        assert_eq!(
            explorer.api_url,
            "https://api.routescan.io/v2/network/testnet/evm/43113/etherscan"
        );
        assert_eq!(explorer.api_key, "snowtrace");
        assert_eq!(ctx.signing_key.expose(), "01");
        Ok(())
    }

    #[test]
    fn test_resolve_default_network_skips_verification() -> Result<()> {
        let ctx = HarnessConfig::default().resolve_with(None, with_key)?;

        assert_eq!(ctx.network, "localhost");
        assert_eq!(ctx.chain_id, LOCAL_DEV_CHAIN_ID);
        assert!(!ctx.verification_enabled());
        assert!(ctx.explorer.is_none());
        Ok(())
    }

    #[test]
    fn test_resolve_falls_back_to_registry_explorer() -> Result<()> {
        let config = ConfigManager::builder()
            .network("sepolia", NetworkConfig::new("https://rpc.sepolia.example", 11155111))
            .build();
        let ctx = config.resolve_with(Some("sepolia"), with_key)?;

        let explorer = ctx.explorer.unwrap();
        assert_eq!(explorer.api_url, "https://api-sepolia.etherscan.io/api");
        assert_eq!(explorer.api_key, "");
        Ok(())
    }

    #[test]
    fn test_resolve_unknown_network() {
        let err = HarnessConfig::default()
            .resolve_with(Some("mainnet"), with_key)
            .unwrap_err();
        assert!(err.to_string().contains("unknown network `mainnet`"));
    }

    #[test]
    fn test_resolve_missing_key() {
        let err = HarnessConfig::default()
            .resolve_with(Some("snowtrace"), |_| None)
            .unwrap_err();
        assert!(err.to_string().contains("PRIVATEKEY"));
    }

    #[test]
    fn test_resolve_verification_network_without_explorer() {
        let config = ConfigManager::builder()
            .verification_chain_id(777)
            .network("private", NetworkConfig::new("http://10.0.0.1:8545", 777))
            .build();

        let err = config.resolve_with(Some("private"), with_key).unwrap_err();
        assert!(err.to_string().contains("no explorer configured"));
    }
}
