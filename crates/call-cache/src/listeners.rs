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

//! Reference counted listener registrations.

use std::collections::{BTreeMap, HashMap};

use crate::call::{Call, ChainId};

/// chain -> call -> blocks-per-fetch -> active listener count
#[derive(Debug, Clone, Default)]
pub struct ListenerTable {
    chains: HashMap<ChainId, HashMap<Call, BTreeMap<u64, usize>>>,
}

impl ListenerTable {
    /// Register one listener. Returns the new count for that bound.
    pub fn add(&mut self, chain_id: ChainId, call: Call, blocks_per_fetch: u64) -> usize {
        let count = self
            .chains
            .entry(chain_id)
            .or_default()
            .entry(call)
            .or_default()
            .entry(blocks_per_fetch)
            .or_default();
        *count += 1;
        *count
    }

    /// Drop one listener. Returns false if no such listener was registered.
    pub fn remove(&mut self, chain_id: ChainId, call: &Call, blocks_per_fetch: u64) -> bool {
        let Some(calls) = self.chains.get_mut(&chain_id) else {
            return false;
        };
        let Some(bounds) = calls.get_mut(call) else {
            return false;
        };
        let Some(count) = bounds.get_mut(&blocks_per_fetch) else {
            return false;
        };

        *count -= 1;
        if *count == 0 {
            bounds.remove(&blocks_per_fetch);
        }
        if bounds.is_empty() {
            calls.remove(call);
        }
        if calls.is_empty() {
            self.chains.remove(&chain_id);
        }
        true
    }

    /// The most demanding bound for a call, if anyone is listening.
    pub fn effective_blocks_per_fetch(&self, chain_id: ChainId, call: &Call) -> Option<u64> {
        self.chains
            .get(&chain_id)?
            .get(call)?
            .iter()
            .find(|(_, count)| **count > 0)
            .map(|(bound, _)| *bound)
    }

    /// Every call with at least one listener on `chain_id`, mapped to its effective bound.
    pub fn active_keys(&self, chain_id: ChainId) -> HashMap<Call, u64> {
        let Some(calls) = self.chains.get(&chain_id) else {
            return HashMap::new();
        };
        calls
            .iter()
            .filter_map(|(call, bounds)| {
                bounds
                    .iter()
                    .find(|(_, count)| **count > 0)
                    .map(|(bound, _)| (call.clone(), *bound))
            })
            .collect()
    }

    /// Number of listeners registered for a call across all bounds.
    pub fn listener_count(&self, chain_id: ChainId, call: &Call) -> usize {
        self.chains
            .get(&chain_id)
            .and_then(|calls| calls.get(call))
            .map(|bounds| bounds.values().sum())
            .unwrap_or_default()
    }
}
