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

//! The shared listener and result tables.

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tokio::sync::watch;

use crate::{
    aggregate::CallOutcome,
    call::{Call, CallError, CallResult, ChainId},
    listeners::ListenerTable,
    subscription::Subscription,
};

#[derive(Debug, Default)]
struct CacheState {
    listeners: ListenerTable,
    results: HashMap<ChainId, HashMap<Call, CallResult>>,
}

/// Deduplicated, block-aware cache of call results.
///
/// Cheap to clone; all clones share the same tables. Every read-modify-write
/// of the tables happens under a single write lock.
#[derive(Debug, Clone)]
pub struct CallCache {
    state: Arc<RwLock<CacheState>>,
    listener_generation: Arc<watch::Sender<u64>>,
}

impl Default for CallCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Oldest block whose data still satisfies `blocks_per_fetch` at `latest_block`.
pub fn min_fresh_block(blocks_per_fetch: u64, latest_block: u64) -> u64 {
    latest_block.saturating_sub(blocks_per_fetch.max(1) - 1)
}

/// Whether an entry must be refetched to satisfy `blocks_per_fetch` at `latest_block`.
pub fn is_outdated(entry: Option<&CallResult>, blocks_per_fetch: u64, latest_block: u64) -> bool {
    let Some(entry) = entry else {
        return true;
    };
    let min_block = min_fresh_block(blocks_per_fetch, latest_block);

    if entry.fetching_block_number.is_some_and(|fetching| fetching >= min_block) {
        return false;
    }
    entry.block_number.is_none_or(|block| block < min_block)
}

impl CallCache {
    pub fn new() -> Self {
        let (listener_generation, _) = watch::channel(0);
        Self {
            state: Arc::new(RwLock::new(CacheState::default())),
            listener_generation: Arc::new(listener_generation),
        }
    }

    // Table invariants hold between statements, so a poisoned lock is still usable.
    fn read(&self) -> RwLockReadGuard<'_, CacheState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, CacheState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register interest in `call` with data at most `blocks_per_fetch` blocks old.
    pub fn add_listener(&self, chain_id: ChainId, call: Call, blocks_per_fetch: u64) {
        let blocks_per_fetch = blocks_per_fetch.max(1);
        let count = self.write().listeners.add(chain_id, call, blocks_per_fetch);
        tracing::trace!("Listener added on chain {chain_id} (bound {blocks_per_fetch}, count {count})");
        self.listener_generation.send_modify(|generation| *generation += 1);
    }

    /// Drop one listener previously added with the same arguments.
    pub fn remove_listener(&self, chain_id: ChainId, call: &Call, blocks_per_fetch: u64) {
        let blocks_per_fetch = blocks_per_fetch.max(1);
        if !self.write().listeners.remove(chain_id, call, blocks_per_fetch) {
            tracing::warn!(
                "Tried to remove unknown listener for {call} on chain {chain_id} (bound {blocks_per_fetch})"
            );
        }
    }

    /// Register a listener for the lifetime of the returned [Subscription].
    pub fn subscribe(&self, chain_id: ChainId, call: Call, blocks_per_fetch: u64) -> Subscription {
        let blocks_per_fetch = blocks_per_fetch.max(1);
        self.add_listener(chain_id, call.clone(), blocks_per_fetch);
        Subscription::new(self.clone(), chain_id, call, blocks_per_fetch)
    }

    /// Current cached entry, without triggering a fetch.
    pub fn get_result(&self, chain_id: ChainId, call: &Call) -> Option<CallResult> {
        self.read().results.get(&chain_id)?.get(call).cloned()
    }

    /// Effective bound of a call, if anyone is listening to it.
    pub fn blocks_per_fetch(&self, chain_id: ChainId, call: &Call) -> Option<u64> {
        self.read().listeners.effective_blocks_per_fetch(chain_id, call)
    }

    /// Every listened call on `chain_id` mapped to the smallest requested bound.
    pub fn active_listening_keys(&self, chain_id: ChainId) -> HashMap<Call, u64> {
        self.read().listeners.active_keys(chain_id)
    }

    /// Listened calls that need a fetch at `latest_block`, sorted by key.
    pub fn outdated_keys(&self, chain_id: ChainId, latest_block: u64) -> Vec<Call> {
        let state = self.read();
        let results = state.results.get(&chain_id);
        let mut outdated: Vec<Call> = state
            .listeners
            .active_keys(chain_id)
            .into_iter()
            .filter(|(call, blocks_per_fetch)| {
                is_outdated(results.and_then(|r| r.get(call)), *blocks_per_fetch, latest_block)
            })
            .map(|(call, _)| call)
            .collect();
        outdated.sort();
        outdated
    }

    /// Record that a fetch for `fetching_block` is in flight for `calls`.
    ///
    /// An entry that already has an equal or newer fetch in flight is left as is.
    pub fn fetching_results(&self, chain_id: ChainId, calls: &[Call], fetching_block: u64) {
        let mut state = self.write();
        let results = state.results.entry(chain_id).or_default();
        for call in calls {
            let entry = results.entry(call.clone()).or_default();
            if entry.fetching_block_number.is_some_and(|fetching| fetching >= fetching_block) {
                continue;
            }
            entry.fetching_block_number = Some(fetching_block);
        }
    }

    /// Commit the outcomes of an aggregate answered at `block_number`.
    ///
    /// Entries already holding data for a newer block are left untouched.
    /// Returns how many entries were written.
    pub fn update_results(
        &self,
        chain_id: ChainId,
        results: impl IntoIterator<Item = (Call, CallOutcome)>,
        block_number: u64,
    ) -> usize {
        let mut state = self.write();
        let entries = state.results.entry(chain_id).or_default();
        let mut applied = 0;

        for (call, outcome) in results {
            let entry = entries.entry(call).or_default();
            if let Some(current) = entry.block_number.filter(|current| *current > block_number) {
                tracing::debug!(
                    "Discarding result from block {block_number}, already cached at block {current}"
                );
                continue;
            }

            if outcome.success {
                entry.data = Some(outcome.return_data);
                entry.error = None;
            } else {
                entry.error = Some(CallError::Reverted { return_data: outcome.return_data });
            }
            entry.block_number = Some(block_number);
            if entry.fetching_block_number.is_some_and(|fetching| fetching <= block_number) {
                entry.fetching_block_number = None;
            }
            applied += 1;
        }
        applied
    }

    /// Record a failed fetch for `fetching_block`.
    ///
    /// Only entries whose in-flight fetch is for that same block are touched.
    /// Cached data is kept and the block number is not advanced, so the key
    /// stays outdated and is fetched again on the next block.
    pub fn error_fetching_results(
        &self,
        chain_id: ChainId,
        calls: &[Call],
        fetching_block: u64,
        message: &str,
    ) {
        let mut state = self.write();
        let Some(entries) = state.results.get_mut(&chain_id) else {
            return;
        };
        for call in calls {
            let Some(entry) = entries.get_mut(call) else {
                continue;
            };
            if entry.fetching_block_number == Some(fetching_block) {
                entry.fetching_block_number = None;
                entry.error = Some(CallError::Fetch { message: message.to_string() });
            }
        }
    }

    /// Drop the in-flight mark of an abandoned fetch for `fetching_block`.
    pub fn cancel_fetching_results(&self, chain_id: ChainId, calls: &[Call], fetching_block: u64) {
        let mut state = self.write();
        let Some(entries) = state.results.get_mut(&chain_id) else {
            return;
        };
        for call in calls {
            if let Some(entry) = entries.get_mut(call) {
                if entry.fetching_block_number == Some(fetching_block) {
                    entry.fetching_block_number = None;
                }
            }
        }
    }

    /// Receiver that changes whenever a listener is added.
    pub fn listener_generation(&self) -> watch::Receiver<u64> {
        self.listener_generation.subscribe()
    }
}
