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

use std::{sync::Arc, time::Duration};

use alloy::providers::Provider;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::call::ChainId;

/// Anything that can report the latest block number of a chain.
#[async_trait]
pub trait BlockNumberSource: Send + Sync {
    async fn latest_block_number(&self) -> Result<u64>;
}

#[async_trait]
impl<P: Provider + 'static> BlockNumberSource for P {
    async fn latest_block_number(&self) -> Result<u64> {
        self.get_block_number().await.context("Failed to get block number")
    }
}

/// Polls a [BlockNumberSource] and publishes every new block number.
///
/// The published value only ever increases; a node answering with an older
/// block than already seen is ignored.
pub struct ChainMonitor {
    chain_id: ChainId,
    source: Arc<dyn BlockNumberSource>,
    poll_interval: Duration,
    block_number: watch::Sender<Option<u64>>,
}

impl ChainMonitor {
    pub fn new(chain_id: ChainId, source: Arc<dyn BlockNumberSource>, poll_interval: Duration) -> Self {
        let (block_number, _) = watch::channel(None);
        Self { chain_id, source, poll_interval, block_number }
    }

    /// Block number feed, `None` until the first successful poll
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.block_number.subscribe()
    }

    pub fn current_block_number(&self) -> Option<u64> {
        *self.block_number.borrow()
    }

    /// Query the source once and publish the result if it is newer.
    pub async fn poll_once(&self) -> Result<u64> {
        let latest = self.source.latest_block_number().await?;
        let published = self.block_number.send_if_modified(|current| {
            if current.is_none_or(|seen| latest > seen) {
                *current = Some(latest);
                true
            } else {
                false
            }
        });
        if published {
            tracing::trace!("Chain {}: new block {latest}", self.chain_id);
        }
        Ok(latest)
    }

    /// Poll until `shutdown` is cancelled. Failed polls are logged and retried
    /// on the next tick.
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!("Starting chain monitor for chain {}", self.chain_id);
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    tracing::info!("Chain monitor for chain {} shutting down", self.chain_id);
                    break;
                }
                _ = interval.tick() => {}
            }

            if let Err(err) = self.poll_once().await {
                tracing::warn!("Chain {}: failed to poll block number: {err:?}", self.chain_id);
            }
        }
    }
}
