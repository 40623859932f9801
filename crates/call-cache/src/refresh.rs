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

//! Per-chain refresh cycle driven by new block numbers.

use std::{
    collections::HashMap,
    ops::Range,
    sync::{Arc, Mutex, PoisonError},
};

use tokio::{
    sync::watch,
    task::{AbortHandle, JoinHandle},
};
use tokio_util::sync::CancellationToken;

use crate::{
    aggregate::{fetch_chunk, AggregateCaller},
    call::{Call, ChainId},
    chunk::{chunk_calls, chunk_ranges},
    retry::{retry, CancelHandle, RetryError, RetryPolicy},
    store::{min_fresh_block, CallCache},
    DEFAULT_CHUNK_SIZE,
};

struct InFlightFetch {
    cancel: CancelHandle,
    task: AbortHandle,
    calls: Arc<[Call]>,
    block_number: u64,
}

impl InFlightFetch {
    /// Whether the fetch will still satisfy at least one listened call at `latest_block`.
    fn serves(&self, active: &HashMap<Call, u64>, latest_block: u64) -> bool {
        self.calls.iter().any(|call| {
            active.get(call).is_some_and(|blocks_per_fetch| {
                self.block_number >= min_fresh_block(*blocks_per_fetch, latest_block)
            })
        })
    }
}

/// Keeps the listened calls of one chain fresh.
pub struct RefreshService {
    chain_id: ChainId,
    cache: CallCache,
    caller: Arc<dyn AggregateCaller>,
    chunk_size: usize,
    retry_policy: RetryPolicy,
    in_flight: Mutex<Vec<InFlightFetch>>,
}

impl RefreshService {
    pub fn new(chain_id: ChainId, cache: CallCache, caller: Arc<dyn AggregateCaller>) -> Self {
        Self {
            chain_id,
            cache,
            caller,
            chunk_size: DEFAULT_CHUNK_SIZE,
            retry_policy: RetryPolicy::default(),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    /// Maximum number of calls per aggregate
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    /// Start fetching every outdated call for `latest_block`.
    ///
    /// Returns immediately with one task per chunk. Running fetches whose
    /// block no longer satisfies any of their listened calls are cancelled
    /// first; the others keep running and keep their calls from being
    /// requested again.
    pub fn on_block(&self, latest_block: u64) -> Vec<JoinHandle<()>> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        in_flight.retain(|fetch| !fetch.task.is_finished());
        let active = self.cache.active_listening_keys(self.chain_id);
        let (kept, superseded): (Vec<_>, Vec<_>) =
            in_flight.drain(..).partition(|fetch| fetch.serves(&active, latest_block));
        *in_flight = kept;
        self.cancel_fetches(superseded);

        let outdated = self.cache.outdated_keys(self.chain_id, latest_block);
        if outdated.is_empty() {
            return Vec::new();
        }

        let chunks = chunk_calls(outdated, self.chunk_size);
        let ranges = chunk_ranges(chunks.iter().map(Vec::len));
        let outdated: Arc<[Call]> = chunks.into_iter().flatten().collect();

        tracing::debug!(
            "Chain {}: fetching {} outdated calls in {} chunks for block {latest_block}",
            self.chain_id,
            outdated.len(),
            ranges.len()
        );
        self.cache.fetching_results(self.chain_id, &outdated, latest_block);

        let mut handles = Vec::with_capacity(ranges.len());
        for range in ranges {
            let calls: Arc<[Call]> = outdated[range.clone()].into();
            let (handle, cancel) = self.spawn_chunk(outdated.clone(), range, latest_block);
            in_flight.push(InFlightFetch {
                cancel,
                task: handle.abort_handle(),
                calls,
                block_number: latest_block,
            });
            handles.push(handle);
        }
        handles
    }

    // Cancelled fetches give up their in-flight marks so the keys are eligible again.
    fn cancel_fetches(&self, fetches: Vec<InFlightFetch>) {
        for fetch in fetches {
            fetch.cancel.cancel();
            self.cache.cancel_fetching_results(self.chain_id, &fetch.calls, fetch.block_number);
            tracing::debug!(
                "Chain {}: cancelled fetch of {} calls for superseded block {}",
                self.chain_id,
                fetch.calls.len(),
                fetch.block_number
            );
        }
    }

    fn spawn_chunk(
        &self,
        outdated: Arc<[Call]>,
        range: Range<usize>,
        latest_block: u64,
    ) -> (JoinHandle<()>, CancelHandle) {
        let chain_id = self.chain_id;
        let cache = self.cache.clone();
        let caller = self.caller.clone();
        let chunk: Arc<[Call]> = outdated[range.clone()].into();

        let (fetch, cancel) = retry(self.retry_policy.clone(), move || {
            let caller = caller.clone();
            let chunk = chunk.clone();
            async move { fetch_chunk(caller.as_ref(), &chunk, latest_block).await }
        });

        // A result that resolves after cancellation comes back as `RetryError::Cancelled`.
        let handle = tokio::spawn(async move {
            match fetch.await {
                Ok(response) => {
                    // Results line up positionally with the slice of outdated keys owned by this chunk.
                    let end = (range.start + response.outcomes.len()).min(range.end);
                    let keys = outdated[range.start..end].iter().cloned();
                    let applied = cache.update_results(
                        chain_id,
                        keys.zip(response.outcomes),
                        response.block_number,
                    );
                    tracing::trace!(
                        "Chain {chain_id}: committed {applied} results at block {}",
                        response.block_number
                    );
                }
                Err(RetryError::Cancelled) => {
                    tracing::debug!("Chain {chain_id}: cancelled fetch for block {latest_block}");
                }
                Err(RetryError::Failed(err)) => {
                    tracing::error!(
                        "Chain {chain_id}: failed to fetch chunk of {} calls for block {latest_block}: {err:?}",
                        range.len()
                    );
                    cache.error_fetching_results(
                        chain_id,
                        &outdated[range],
                        latest_block,
                        &err.to_string(),
                    );
                }
            }
        });

        (handle, cancel)
    }

    /// Cancel every in-flight fetch.
    pub fn cancel_all(&self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        let fetches = std::mem::take(&mut *in_flight);
        self.cancel_fetches(fetches);
    }

    /// Drive [Self::on_block] from `blocks` and from listener changes until
    /// `shutdown` fires or the block feed closes. `None` means no block has
    /// been observed yet.
    pub async fn run(self, mut blocks: watch::Receiver<Option<u64>>, shutdown: CancellationToken) {
        tracing::info!("Starting refresh service for chain {}", self.chain_id);
        let mut listeners = self.cache.listener_generation();
        listeners.borrow_and_update();

        let latest = *blocks.borrow_and_update();
        if let Some(latest) = latest {
            self.on_block(latest);
        }

        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    tracing::info!("Refresh service for chain {} shutting down", self.chain_id);
                    break;
                }

                changed = blocks.changed() => {
                    if changed.is_err() {
                        tracing::warn!("Block feed for chain {} closed", self.chain_id);
                        break;
                    }
                }

                changed = listeners.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    listeners.borrow_and_update();
                }
            }

            let latest = *blocks.borrow_and_update();
            if let Some(latest) = latest {
                self.on_block(latest);
            }
        }

        self.cancel_all();
    }
}
