// Copyright 2026 Boundless Foundation, Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::{collections::HashSet, path::Path, time::Duration};

use alloy::primitives::{Address, Bytes};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use url::Url;

use crate::{
    call::{Call, ChainId},
    errors::CodedError,
    impl_coded_debug,
    retry::RetryPolicy,
};

#[derive(Error)]
pub enum ConfigErr {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl_coded_debug!(ConfigErr);

impl CodedError for ConfigErr {
    fn code(&self) -> &str {
        match self {
            ConfigErr::InvalidConfig(_) => "[C-CON-001]",
        }
    }
}

pub mod defaults {
    use alloy::primitives::Address;

    pub const fn chunk_size() -> usize {
        crate::DEFAULT_CHUNK_SIZE
    }

    pub const fn min_wait_ms() -> u64 {
        2500
    }

    pub const fn max_wait_ms() -> u64 {
        3500
    }

    pub const fn backoff_multiplier() -> f64 {
        1.0
    }

    pub const fn poll_interval_ms() -> u64 {
        4000
    }

    pub const fn blocks_per_fetch() -> u64 {
        1
    }

    pub const fn multicall_address() -> Address {
        crate::aggregate::MULTICALL3_ADDRESS
    }
}

/// Batching options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    /// Maximum number of calls per aggregate request
    #[serde(default = "defaults::chunk_size")]
    pub chunk_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { chunk_size: defaults::chunk_size() }
    }
}

/// Wait between retries of a failed aggregate
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default = "defaults::min_wait_ms")]
    pub min_wait_ms: u64,
    #[serde(default = "defaults::max_wait_ms")]
    pub max_wait_ms: u64,
    #[serde(default = "defaults::backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            min_wait_ms: defaults::min_wait_ms(),
            max_wait_ms: defaults::max_wait_ms(),
            backoff_multiplier: defaults::backoff_multiplier(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            min_wait: Duration::from_millis(config.min_wait_ms),
            max_wait: Duration::from_millis(config.max_wait_ms),
            backoff_multiplier: config.backoff_multiplier,
        }
    }
}

/// Block number polling
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MonitorConfig {
    #[serde(default = "defaults::poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { poll_interval_ms: defaults::poll_interval_ms() }
    }
}

impl MonitorConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// One chain to keep a cache for
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
    pub chain_id: ChainId,
    pub rpc_url: Url,
    /// Multicall3 deployment, defaults to the canonical address
    #[serde(default = "defaults::multicall_address")]
    pub multicall_address: Address,
}

/// A call subscribed for the lifetime of the process
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WatchConfig {
    pub chain_id: ChainId,
    pub target: Address,
    pub call_data: Bytes,
    #[serde(default = "defaults::blocks_per_fetch")]
    pub blocks_per_fetch: u64,
}

impl WatchConfig {
    pub fn call(&self) -> Call {
        Call::new(self.target, self.call_data.clone())
    }
}

/// Top level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub chains: Vec<ChainConfig>,
    #[serde(default)]
    pub watch: Vec<WatchConfig>,
}

impl Config {
    /// Load and validate a TOML config file
    pub async fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .await
            .context(format!("Failed to read config file from {path:?}"))?;
        let config: Self =
            toml::from_str(&data).context(format!("Failed to parse toml file from {path:?}"))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigErr> {
        if self.cache.chunk_size == 0 {
            return Err(ConfigErr::InvalidConfig("cache.chunk_size must be positive".into()));
        }
        if self.retry.min_wait_ms > self.retry.max_wait_ms {
            return Err(ConfigErr::InvalidConfig(format!(
                "retry.min_wait_ms ({}) exceeds retry.max_wait_ms ({})",
                self.retry.min_wait_ms, self.retry.max_wait_ms
            )));
        }
        if self.retry.backoff_multiplier.is_nan() || self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigErr::InvalidConfig(format!(
                "retry.backoff_multiplier must be at least 1.0, got {}",
                self.retry.backoff_multiplier
            )));
        }

        let mut chain_ids = HashSet::new();
        for chain in &self.chains {
            if !chain_ids.insert(chain.chain_id) {
                return Err(ConfigErr::InvalidConfig(format!(
                    "chain {} configured more than once",
                    chain.chain_id
                )));
            }
        }

        for watch in &self.watch {
            if watch.blocks_per_fetch == 0 {
                return Err(ConfigErr::InvalidConfig(format!(
                    "watch entry {} has zero blocks_per_fetch",
                    watch.call()
                )));
            }
            if !chain_ids.contains(&watch.chain_id) {
                return Err(ConfigErr::InvalidConfig(format!(
                    "watch entry {} references unknown chain {}",
                    watch.call(),
                    watch.chain_id
                )));
            }
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }

    pub fn chain(&self, chain_id: ChainId) -> Option<&ChainConfig> {
        self.chains.iter().find(|chain| chain.chain_id == chain_id)
    }

    /// Watch entries of one chain
    pub fn watches_for(&self, chain_id: ChainId) -> impl Iterator<Item = &WatchConfig> {
        self.watch.iter().filter(move |watch| watch.chain_id == chain_id)
    }
}
