//! Daemon configuration loaded from environment variables.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use alloy_primitives::Address;

use crate::origin::RpcConfig;
use crate::poller::PollConfig;
use crate::roles::DEFAULT_ROLES;
use crate::{Error, Result};

/// Daemon configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Chain node JSON-RPC endpoint.
    pub rpc_url: String,

    /// Contract addresses whose logs are mirrored.
    pub addresses: Vec<Address>,

    /// ABI or artifact files the registry is loaded from.
    pub schema_paths: Vec<PathBuf>,

    /// SQLite database file.
    pub db_path: PathBuf,

    /// Role entries, each a role name or `0x<hash>=NAME`.
    pub roles: Vec<String>,

    pub poll_interval: Duration,
    pub rpc_timeout: Duration,

    /// First block to mirror when the store has no cursor yet.
    /// Without it, mirroring starts at the current head.
    pub start_block: Option<u64>,

    /// Largest block span requested in one `eth_getLogs` call.
    pub max_block_range: u64,

    /// Blocks to stay behind the head.
    pub confirmations: u64,

    pub pool_size: usize,

    /// Metrics HTTP server port (0 disables the server).
    pub metrics_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `TRACEMIRROR_RPC_URL`: node endpoint
    /// - `TRACEMIRROR_ADDRESSES`: comma-separated contract addresses
    /// - `TRACEMIRROR_SCHEMAS`: comma-separated ABI/artifact paths
    ///
    /// Optional:
    /// - `TRACEMIRROR_DB_PATH` (default: "./data/tracemirror.db")
    /// - `TRACEMIRROR_ROLES` (default: "FARMER_ROLE,INSPECTOR_ROLE,RETAILER_ROLE")
    /// - `TRACEMIRROR_POLL_INTERVAL_SECS` (default: 10)
    /// - `TRACEMIRROR_RPC_TIMEOUT_SECS` (default: 15)
    /// - `TRACEMIRROR_START_BLOCK` (default: current head)
    /// - `TRACEMIRROR_MAX_BLOCK_RANGE` (default: 2000)
    /// - `TRACEMIRROR_CONFIRMATIONS` (default: 0)
    /// - `TRACEMIRROR_POOL_SIZE` (default: 4)
    /// - `TRACEMIRROR_METRICS_PORT` (default: 9090, 0 disables)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| Error::Config(format!("{key} is not set")));

        let rpc_url = required("TRACEMIRROR_RPC_URL")?.trim().to_string();

        let addresses = split_list(&required("TRACEMIRROR_ADDRESSES")?)
            .map(|s| {
                s.parse::<Address>()
                    .map_err(|e| Error::Config(format!("invalid address '{s}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let schema_paths: Vec<PathBuf> = split_list(&required("TRACEMIRROR_SCHEMAS")?)
            .map(PathBuf::from)
            .collect();

        let db_path = var("TRACEMIRROR_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./data/tracemirror.db"));

        let roles = match var("TRACEMIRROR_ROLES") {
            Some(list) => split_list(&list).map(str::to_string).collect(),
            None => DEFAULT_ROLES.iter().map(|r| r.to_string()).collect(),
        };

        let parsed = |key: &str| -> Result<Option<u64>> {
            var(key).map(|v| parse_number(key, &v)).transpose()
        };

        let poll_interval = parsed("TRACEMIRROR_POLL_INTERVAL_SECS")?.unwrap_or(10);
        let rpc_timeout = parsed("TRACEMIRROR_RPC_TIMEOUT_SECS")?.unwrap_or(15);
        let start_block = parsed("TRACEMIRROR_START_BLOCK")?;
        let max_block_range = parsed("TRACEMIRROR_MAX_BLOCK_RANGE")?.unwrap_or(2000);
        let confirmations = parsed("TRACEMIRROR_CONFIRMATIONS")?.unwrap_or(0);

        let pool_size = var("TRACEMIRROR_POOL_SIZE")
            .map(|v| parse_number::<usize>("TRACEMIRROR_POOL_SIZE", &v))
            .transpose()?
            .unwrap_or(4);
        let metrics_port = var("TRACEMIRROR_METRICS_PORT")
            .map(|v| parse_number::<u16>("TRACEMIRROR_METRICS_PORT", &v))
            .transpose()?
            .unwrap_or(9090);

        let config = Self {
            rpc_url,
            addresses,
            schema_paths,
            db_path,
            roles,
            poll_interval: Duration::from_secs(poll_interval),
            rpc_timeout: Duration::from_secs(rpc_timeout),
            start_block,
            max_block_range,
            confirmations,
            pool_size,
            metrics_port,
        };
        config.validate()?;

        tracing::info!(
            rpc_url = %config.rpc_url,
            addresses = config.addresses.len(),
            schemas = config.schema_paths.len(),
            db_path = %config.db_path.display(),
            poll_interval_secs = poll_interval,
            "sync configuration loaded"
        );

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.addresses.is_empty() {
            return Err(Error::Config("no contract addresses configured".to_string()));
        }
        if self.schema_paths.is_empty() {
            return Err(Error::Config("no schema files configured".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(Error::Config("poll interval must be positive".to_string()));
        }
        if self.rpc_timeout.is_zero() {
            return Err(Error::Config("RPC timeout must be positive".to_string()));
        }
        if self.max_block_range == 0 {
            return Err(Error::Config("max block range must be at least 1".to_string()));
        }
        if self.pool_size == 0 {
            return Err(Error::Config("pool size must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn rpc_config(&self) -> RpcConfig {
        RpcConfig {
            url: self.rpc_url.clone(),
            timeout: self.rpc_timeout,
        }
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            addresses: self.addresses.clone(),
            interval: self.poll_interval,
            start_block: self.start_block,
            max_block_range: self.max_block_range,
            confirmations: self.confirmations,
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty())
}

fn parse_number<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("{key}='{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const ADDRESS: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";

    fn load(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("TRACEMIRROR_RPC_URL", "http://localhost:8545"),
            ("TRACEMIRROR_ADDRESSES", ADDRESS),
            ("TRACEMIRROR_SCHEMAS", "abi/SupplyChain.json"),
        ]
    }

    #[test]
    fn config_defaults() {
        let config = load(&required()).unwrap();
        assert_eq!(config.rpc_url, "http://localhost:8545");
        assert_eq!(config.addresses, vec![ADDRESS.parse::<Address>().unwrap()]);
        assert_eq!(config.db_path, PathBuf::from("./data/tracemirror.db"));
        assert_eq!(config.roles, DEFAULT_ROLES);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.rpc_timeout, Duration::from_secs(15));
        assert_eq!(config.start_block, None);
        assert_eq!(config.max_block_range, 2000);
        assert_eq!(config.confirmations, 0);
        assert_eq!(config.pool_size, 4);
        assert_eq!(config.metrics_port, 9090);
    }

    #[test]
    fn config_custom_values() {
        let mut vars = required();
        vars.extend([
            ("TRACEMIRROR_SCHEMAS", "a.json, b.json,"),
            ("TRACEMIRROR_ROLES", "FARMER_ROLE"),
            ("TRACEMIRROR_POLL_INTERVAL_SECS", "3"),
            ("TRACEMIRROR_START_BLOCK", "1200"),
            ("TRACEMIRROR_CONFIRMATIONS", "6"),
            ("TRACEMIRROR_METRICS_PORT", "0"),
        ]);

        let config = load(&vars).unwrap();
        assert_eq!(config.schema_paths, [PathBuf::from("a.json"), PathBuf::from("b.json")]);
        assert_eq!(config.roles, ["FARMER_ROLE"]);
        assert_eq!(config.poll_interval, Duration::from_secs(3));
        assert_eq!(config.start_block, Some(1200));
        assert_eq!(config.confirmations, 6);
        assert_eq!(config.metrics_port, 0);

        let poll = config.poll_config();
        assert_eq!(poll.start_block, Some(1200));
        assert_eq!(poll.addresses.len(), 1);
    }

    #[test]
    fn config_missing_required() {
        let err = load(&required()[..2]).unwrap_err();
        assert!(err.to_string().contains("TRACEMIRROR_SCHEMAS"));
    }

    #[test]
    fn config_invalid_values() {
        for (key, value) in [
            ("TRACEMIRROR_ADDRESSES", "0x1234"),
            ("TRACEMIRROR_POLL_INTERVAL_SECS", "ten"),
            ("TRACEMIRROR_POLL_INTERVAL_SECS", "0"),
            ("TRACEMIRROR_MAX_BLOCK_RANGE", "0"),
            ("TRACEMIRROR_POOL_SIZE", "-1"),
            ("TRACEMIRROR_METRICS_PORT", "70000"),
        ] {
            let mut vars = required();
            vars.push((key, value));
            assert!(
                matches!(load(&vars), Err(Error::Config(_))),
                "{key}={value} accepted"
            );
        }
    }
}
