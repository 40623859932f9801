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

use crate::{
    call::{Call, CallResult, ChainId},
    store::CallCache,
};

/// A listener registration that is released when dropped.
#[derive(Debug)]
pub struct Subscription {
    cache: CallCache,
    chain_id: ChainId,
    call: Call,
    blocks_per_fetch: u64,
    active: bool,
}

impl Subscription {
    pub(crate) fn new(cache: CallCache, chain_id: ChainId, call: Call, blocks_per_fetch: u64) -> Self {
        Self { cache, chain_id, call, blocks_per_fetch, active: true }
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn call(&self) -> &Call {
        &self.call
    }

    pub fn blocks_per_fetch(&self) -> u64 {
        self.blocks_per_fetch
    }

    /// Latest cached entry for the subscribed call
    pub fn result(&self) -> Option<CallResult> {
        self.cache.get_result(self.chain_id, &self.call)
    }

    /// Release the listener now instead of on drop
    pub fn unsubscribe(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if std::mem::take(&mut self.active) {
            self.cache.remove_listener(self.chain_id, &self.call, self.blocks_per_fetch);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use tracing_test::traced_test;

    #[test]
    #[traced_test]
    fn listener_released_exactly_once() {
        let cache = CallCache::new();
        let call = Call::new(Address::repeat_byte(7), vec![1, 2]);

        let first = cache.subscribe(1, call.clone(), 3);
        let second = cache.subscribe(1, call.clone(), 3);
        assert_eq!(cache.blocks_per_fetch(1, &call), Some(3));

        first.unsubscribe();
        assert_eq!(cache.blocks_per_fetch(1, &call), Some(3));

        drop(second);
        assert_eq!(cache.blocks_per_fetch(1, &call), None);
        assert!(!logs_contain("unknown listener"));
    }

    #[test]
    fn zero_bound_is_treated_as_one() {
        let cache = CallCache::new();
        let call = Call::new(Address::repeat_byte(7), vec![]);
        let sub = cache.subscribe(5, call.clone(), 0);
        assert_eq!(sub.blocks_per_fetch(), 1);
        assert_eq!(cache.blocks_per_fetch(5, &call), Some(1));
    }
}
