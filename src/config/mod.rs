use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy::primitives::Address;
use eyre::{eyre, Result};
use log::LevelFilter;
use url::Url;

use crate::utils::constants::{MULTICALL3, POLYGON_CHAIN_ID, VAULT};

/// Configuration struct for the application
#[derive(Debug, Clone)]
pub struct Config {
    pub venue_name: String,
    pub network_id: u64,
    pub rpc_url: Url,
    pub rpc_ws_url: Url,
    pub subgraph_url: Url,
    pub vault: Address,
    pub multicall: Address,
    pub catalog_ttl: Duration,
    pub multicall_chunk_size: usize,
    pub cache_dir: PathBuf,
    pub log_level: LevelFilter,
}

fn var<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| eyre!("Invalid {name}={value}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Default values for configuration
    fn defaults() -> Result<Self> {
        Ok(Self {
            venue_name: "Verified".to_string(),
            network_id: POLYGON_CHAIN_ID,
            rpc_url: Url::parse("http://localhost:8545")?,
            rpc_ws_url: Url::parse("ws://localhost:8546")?,
            subgraph_url: Url::parse("http://localhost:8000/subgraphs/name/verified/vault")?,
            vault: VAULT,
            multicall: MULTICALL3,
            catalog_ttl: Duration::from_secs(3_600),
            multicall_chunk_size: 100,
            cache_dir: PathBuf::from("/tmp/issue-pools-cache"),
            log_level: LevelFilter::Info,
        })
    }

    /// Load configuration from environment variables
    ///
    /// # Environment Variables:
    /// - `ISSUE_VENUE_NAME`: venue name used in cache keys and pool identifiers
    /// - `NETWORK_ID`: chain id
    /// - `RPC_URL`: HTTP endpoint for batched reads
    /// - `RPC_WS_URL`: WebSocket endpoint for log subscriptions
    /// - `SUBGRAPH_URL`: GraphQL endpoint of the pool catalog
    /// - `VAULT_ADDRESS`, `MULTICALL_ADDRESS`: contract addresses
    /// - `CATALOG_TTL_SECS`: catalog cache lifetime
    /// - `MULTICALL_CHUNK_SIZE`: calls per multicall batch
    /// - `CACHE_DIR`: on-disk cache location
    /// - `LOG_LEVEL`: `error`, `warn`, `info`, `debug` or `trace`
    ///
    /// # Errors
    /// * If a variable is set but does not parse
    /// * If `MULTICALL_CHUNK_SIZE` is zero
    pub fn from_env() -> Result<Self> {
        let defaults = Self::defaults()?;

        let config = Self {
            venue_name: env::var("ISSUE_VENUE_NAME").unwrap_or(defaults.venue_name),
            network_id: var("NETWORK_ID", defaults.network_id)?,
            rpc_url: var("RPC_URL", defaults.rpc_url)?,
            rpc_ws_url: var("RPC_WS_URL", defaults.rpc_ws_url)?,
            subgraph_url: var("SUBGRAPH_URL", defaults.subgraph_url)?,
            vault: var("VAULT_ADDRESS", defaults.vault)?,
            multicall: var("MULTICALL_ADDRESS", defaults.multicall)?,
            catalog_ttl: Duration::from_secs(var(
                "CATALOG_TTL_SECS",
                defaults.catalog_ttl.as_secs(),
            )?),
            multicall_chunk_size: var("MULTICALL_CHUNK_SIZE", defaults.multicall_chunk_size)?,
            cache_dir: var("CACHE_DIR", defaults.cache_dir)?,
            log_level: var("LOG_LEVEL", defaults.log_level)?,
        };

        if config.multicall_chunk_size == 0 {
            return Err(eyre!("MULTICALL_CHUNK_SIZE must be positive"));
        }
        Ok(config)
    }

    /// Create a test configuration
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self::defaults().unwrap()
    }
}
