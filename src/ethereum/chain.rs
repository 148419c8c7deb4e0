// Known EVM chains
//
// Block times drive confirmation polling, and explorer URLs are the fallback
// verification endpoint when the configuration file does not name one.

use std::collections::BTreeMap;
use std::time::Duration;

/// Chain id of the Avalanche Fuji test network
pub const AVALANCHE_FUJI_CHAIN_ID: u64 = 43113;

/// Chain id used by local development nodes
pub const LOCAL_DEV_CHAIN_ID: u64 = 31337;

/// Explorer API and browser URLs for a chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorerUrls {
    pub api_url: String,
    pub browser_url: String,
}

/// Chain configuration
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// Chain ID
    pub chain_id: u64,

    /// Chain name
    pub name: String,

    /// Average block time in seconds
    pub block_time: u64,

    /// Native currency symbol
    pub currency_symbol: String,

    /// Etherscan-compatible explorer, if one exists
    pub explorer: Option<ExplorerUrls>,
}

impl ChainConfig {
    /// Create a new chain configuration
    pub fn new(
        chain_id: u64,
        name: &str,
        block_time: u64,
        currency_symbol: &str,
        explorer: Option<(&str, &str)>,
    ) -> Self {
        Self {
            chain_id,
            name: name.to_string(),
            block_time,
            currency_symbol: currency_symbol.to_string(),
            explorer: explorer.map(|(api_url, browser_url)| ExplorerUrls {
                api_url: api_url.to_string(),
                browser_url: browser_url.to_string(),
            }),
        }
    }

    /// Interval between receipt polls while waiting for confirmations
    pub fn poll_interval(&self) -> Duration {
        // Poll twice per block, but never spin faster than every 500ms
        Duration::from_millis((self.block_time * 500).max(500))
    }

    /// Get Ethereum Mainnet configuration
    pub fn ethereum() -> Self {
        Self::new(
            1,
            "Ethereum Mainnet",
            12,
            "ETH",
            Some(("https://api.etherscan.io/api", "https://etherscan.io")),
        )
    }

    /// Get Sepolia configuration
    pub fn sepolia() -> Self {
        Self::new(
            11155111,
            "Sepolia",
            12,
            "ETH",
            Some((
                "https://api-sepolia.etherscan.io/api",
                "https://sepolia.etherscan.io",
            )),
        )
    }

    /// Get Polygon configuration
    pub fn polygon() -> Self {
        Self::new(
            137,
            "Polygon",
            2,
            "MATIC",
            Some(("https://api.polygonscan.com/api", "https://polygonscan.com")),
        )
    }

    /// Get Binance Smart Chain configuration
    pub fn bsc() -> Self {
        Self::new(
            56,
            "Binance Smart Chain",
            3,
            "BNB",
            Some(("https://api.bscscan.com/api", "https://bscscan.com")),
        )
    }

    /// Get Arbitrum configuration
    pub fn arbitrum() -> Self {
        Self::new(
            42161,
            "Arbitrum",
            1,
            "ETH",
            Some(("https://api.arbiscan.io/api", "https://arbiscan.io")),
        )
    }

    /// Get Optimism configuration
    pub fn optimism() -> Self {
        Self::new(
            10,
            "Optimism",
            1,
            "ETH",
            Some((
                "https://api-optimistic.etherscan.io/api",
                "https://optimistic.etherscan.io",
            )),
        )
    }

    /// Get Avalanche C-Chain configuration
    pub fn avalanche() -> Self {
        Self::new(
            43114,
            "Avalanche C-Chain",
            2,
            "AVAX",
            Some((
                "https://api.routescan.io/v2/network/mainnet/evm/43114/etherscan",
                "https://snowtrace.io",
            )),
        )
    }

    /// Get Avalanche Fuji testnet configuration
    pub fn avalanche_fuji() -> Self {
        Self::new(
            AVALANCHE_FUJI_CHAIN_ID,
            "Avalanche Fuji Testnet",
            2,
            "AVAX",
            Some((
                "https://api.routescan.io/v2/network/testnet/evm/43113/etherscan",
                "https://testnet.snowtrace.io",
            )),
        )
    }

    /// Local development node (anvil, hardhat node)
    pub fn local() -> Self {
        Self::new(LOCAL_DEV_CHAIN_ID, "Local Development Chain", 1, "ETH", None)
    }
}

/// Chain registry for looking up chain configurations
pub struct ChainRegistry {
    /// Map of chain ID to chain configuration
    configs: BTreeMap<u64, ChainConfig>,
}

impl ChainRegistry {
    /// Create a new chain registry with default configurations
    pub fn new() -> Self {
        let mut registry = Self {
            configs: BTreeMap::new(),
        };

        for config in [
            ChainConfig::ethereum(),
            ChainConfig::sepolia(),
            ChainConfig::polygon(),
            ChainConfig::bsc(),
            ChainConfig::arbitrum(),
            ChainConfig::optimism(),
            ChainConfig::avalanche(),
            ChainConfig::avalanche_fuji(),
            ChainConfig::local(),
        ] {
            registry.add_config(config);
        }

        registry
    }

    /// Get chain configuration by chain ID
    pub fn get_config(&self, chain_id: u64) -> Option<&ChainConfig> {
        self.configs.get(&chain_id)
    }

    /// Add or update a chain configuration
    pub fn add_config(&mut self, config: ChainConfig) {
        self.configs.insert(config.chain_id, config);
    }

    /// All known chains ordered by chain ID
    pub fn chains(&self) -> impl Iterator<Item = &ChainConfig> {
        self.configs.values()
    }

    /// Poll interval for a chain, falling back to one second for unknown chains
    pub fn poll_interval(&self, chain_id: u64) -> Duration {
        self.get_config(chain_id)
            .map(ChainConfig::poll_interval)
            .unwrap_or_else(|| Duration::from_secs(1))
    }
}

impl Default for ChainRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuji_is_registered_with_routescan() {
        let registry = ChainRegistry::new();
        let fuji = registry.get_config(AVALANCHE_FUJI_CHAIN_ID).unwrap();

        assert_eq!(fuji.currency_symbol, "AVAX");
        let explorer = fuji.explorer.as_ref().unwrap();
        assert!(explorer.api_url.contains("routescan.io"));
        assert_eq!(explorer.browser_url, "https://testnet.snowtrace.io");
    }

    #[test]
    fn test_poll_interval() {
        let registry = ChainRegistry::new();
        assert_eq!(registry.poll_interval(1), Duration::from_secs(6));
        assert_eq!(registry.poll_interval(LOCAL_DEV_CHAIN_ID), Duration::from_millis(500));
        assert_eq!(registry.poll_interval(999_999), Duration::from_secs(1));
    }

    #[test]
    fn test_add_config_overrides() {
        let mut registry = ChainRegistry::new();
        registry.add_config(ChainConfig::new(1, "Custom", 5, "ETH", None));

        let config = registry.get_config(1).unwrap();
        assert_eq!(config.name, "Custom");
        assert!(config.explorer.is_none());
    }

    #[test]
    fn test_chains_are_ordered() {
        let registry = ChainRegistry::new();
        let ids: Vec<u64> = registry.chains().map(|c| c.chain_id).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
    }
}
