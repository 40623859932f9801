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

use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use call_cache::{
    AggregateCaller, AggregateError, AggregateResponse, Call, CallCache, CallError, CallOutcome,
    RefreshService, RetryPolicy,
};
use tokio::sync::{watch, Mutex};
use tokio_util::sync::CancellationToken;

const CHAIN: u64 = 1;

/// Answers every call with its own payload followed by the answering block.
#[derive(Default)]
struct MockCaller {
    block_number: AtomicU64,
    stale_attempts: AtomicUsize,
    short_answer: AtomicBool,
    delay_ms: AtomicU64,
    reverting: Mutex<HashSet<Call>>,
    requests: Mutex<Vec<Vec<Call>>>,
    /// Runs once, after the next answer is built and before it is returned.
    before_answer: std::sync::Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl MockCaller {
    fn at_block(block_number: u64) -> Arc<Self> {
        let caller = Self::default();
        caller.block_number.store(block_number, Ordering::SeqCst);
        Arc::new(caller)
    }

    async fn request_sizes(&self) -> Vec<usize> {
        self.requests.lock().await.iter().map(Vec::len).collect()
    }
}

fn answer(call: &Call, block_number: u64) -> Bytes {
    let mut data = call.call_data.to_vec();
    data.extend_from_slice(&block_number.to_be_bytes());
    data.into()
}

#[async_trait]
impl AggregateCaller for MockCaller {
    async fn aggregate(&self, calls: &[Call]) -> Result<AggregateResponse, AggregateError> {
        self.requests.lock().await.push(calls.to_vec());

        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }

        let mut block_number = self.block_number.load(Ordering::SeqCst);
        if self
            .stale_attempts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            block_number -= 1;
        }

        let reverting = self.reverting.lock().await;
        let mut outcomes: Vec<CallOutcome> = calls
            .iter()
            .map(|call| {
                if reverting.contains(call) {
                    CallOutcome::failure(vec![0xff])
                } else {
                    CallOutcome::success(answer(call, block_number))
                }
            })
            .collect();
        drop(reverting);
        if self.short_answer.load(Ordering::SeqCst) {
            outcomes.pop();
        }

        let hook = self.before_answer.lock().unwrap().take();
        if let Some(hook) = hook {
            hook();
        }
        Ok(AggregateResponse { block_number, outcomes })
    }
}

fn call(i: u8) -> Call {
    Call::new(Address::repeat_byte(i), vec![i, i])
}

fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        min_wait: Duration::from_millis(100),
        max_wait: Duration::from_millis(200),
        backoff_multiplier: 1.0,
    }
}

fn service(cache: &CallCache, caller: Arc<MockCaller>, chunk_size: usize) -> RefreshService {
    RefreshService::new(CHAIN, cache.clone(), caller)
        .with_chunk_size(chunk_size)
        .with_retry_policy(fast_policy())
}

async fn join(handles: Vec<tokio::task::JoinHandle<()>>) {
    for handle in handles {
        handle.await.unwrap();
    }
}

#[tokio::test(start_paused = true)]
async fn results_are_reassociated_by_position() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(100);
    let refresh = service(&cache, caller.clone(), 3);
    for i in 1..=5 {
        cache.add_listener(CHAIN, call(i), 1);
    }

    let handles = refresh.on_block(100);
    assert_eq!(handles.len(), 2);
    assert!(cache.get_result(CHAIN, &call(4)).unwrap().is_loading());
    join(handles).await;

    // Chunk two holds keys 3 and 4 of the sorted outdated list.
    let mut requests = caller.requests.lock().await.clone();
    requests.sort();
    assert_eq!(requests, vec![vec![call(1), call(2), call(3)], vec![call(4), call(5)]]);

    for i in 1..=5 {
        let entry = cache.get_result(CHAIN, &call(i)).unwrap();
        assert_eq!(entry.data, Some(answer(&call(i), 100)));
        assert_eq!(entry.block_number, Some(100));
        assert_eq!(entry.fetching_block_number, None);
    }

    // Everything is fresh now.
    assert!(refresh.on_block(100).is_empty());
    assert_eq!(caller.request_sizes().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn reverted_call_does_not_affect_siblings() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(10);
    caller.reverting.lock().await.insert(call(2));
    let refresh = service(&cache, caller.clone(), 10);
    for i in 1..=3 {
        cache.add_listener(CHAIN, call(i), 1);
    }

    join(refresh.on_block(10)).await;

    assert!(cache.get_result(CHAIN, &call(1)).unwrap().is_valid());
    assert!(cache.get_result(CHAIN, &call(3)).unwrap().is_valid());
    let failed = cache.get_result(CHAIN, &call(2)).unwrap();
    assert_eq!(failed.error, Some(CallError::Reverted { return_data: Bytes::from(vec![0xff]) }));

    caller.reverting.lock().await.clear();
    caller.block_number.store(11, Ordering::SeqCst);
    join(refresh.on_block(11)).await;
    assert_eq!(cache.get_result(CHAIN, &call(2)).unwrap().data, Some(answer(&call(2), 11)));
}

#[tokio::test(start_paused = true)]
async fn stale_block_is_retried_until_fresh() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(50);
    caller.stale_attempts.store(3, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 1);

    join(refresh.on_block(50)).await;

    assert_eq!(caller.request_sizes().await, vec![1, 1, 1, 1]);
    let entry = cache.get_result(CHAIN, &call(1)).unwrap();
    assert_eq!(entry.block_number, Some(50));
    assert!(entry.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn new_block_cancels_superseded_fetch() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(100);
    caller.delay_ms.store(10_000, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 1);

    let first = refresh.on_block(100);
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(caller.request_sizes().await.len(), 1);

    caller.block_number.store(101, Ordering::SeqCst);
    let second = refresh.on_block(101);
    assert_eq!(second.len(), 1);
    assert_eq!(cache.get_result(CHAIN, &call(1)).unwrap().fetching_block_number, Some(101));

    join(first).await;
    // The cancelled fetch never wrote anything.
    assert_eq!(cache.get_result(CHAIN, &call(1)).unwrap().block_number, None);

    join(second).await;
    let entry = cache.get_result(CHAIN, &call(1)).unwrap();
    assert_eq!(entry.block_number, Some(101));
    assert_eq!(entry.data, Some(answer(&call(1), 101)));
    assert_eq!(caller.request_sizes().await.len(), 2);
}

#[tokio::test(start_paused = true)]
async fn answer_arriving_after_cancel_is_discarded() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(100);
    let refresh = Arc::new(service(&cache, caller.clone(), 10));
    cache.add_listener(CHAIN, call(1), 1);

    // Block 101 supersedes the fetch while its answer for block 100 is on the way back.
    let weak = Arc::downgrade(&refresh);
    *caller.before_answer.lock().unwrap() = Some(Box::new(move || {
        if let Some(refresh) = weak.upgrade() {
            refresh.on_block(101);
        }
    }));

    join(refresh.on_block(100)).await;
    let entry = cache.get_result(CHAIN, &call(1)).unwrap();
    assert_eq!(entry.data, None);
    assert_eq!(entry.block_number, None);
    assert_eq!(entry.fetching_block_number, Some(101));

    caller.block_number.store(101, Ordering::SeqCst);
    wait_for_block(&cache, &call(1), 101).await;
    assert_eq!(cache.get_result(CHAIN, &call(1)).unwrap().data, Some(answer(&call(1), 101)));
}

#[tokio::test(start_paused = true)]
async fn fetch_within_freshness_bound_survives_new_block() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(100);
    caller.delay_ms.store(10_000, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 10);

    let first = refresh.on_block(100);
    tokio::time::sleep(Duration::from_secs(1)).await;

    caller.block_number.store(101, Ordering::SeqCst);
    assert!(refresh.on_block(101).is_empty());
    assert_eq!(cache.get_result(CHAIN, &call(1)).unwrap().fetching_block_number, Some(100));

    join(first).await;
    assert_eq!(caller.request_sizes().await, vec![1]);
    let entry = cache.get_result(CHAIN, &call(1)).unwrap();
    assert_eq!(entry.block_number, Some(101));
    assert_eq!(entry.fetching_block_number, None);
}

#[tokio::test(start_paused = true)]
async fn slow_endpoint_keeps_up_with_tolerant_listener() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(100);
    // Every answer takes longer than a block.
    caller.delay_ms.store(5_000, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 10);

    let mut handles = Vec::new();
    for block in 100..=110 {
        caller.block_number.store(block, Ordering::SeqCst);
        handles.extend(refresh.on_block(block));
        tokio::time::sleep(Duration::from_secs(4)).await;
    }
    join(handles).await;

    assert_eq!(caller.request_sizes().await, vec![1]);
    let entry = cache.get_result(CHAIN, &call(1)).unwrap();
    assert_eq!(entry.block_number, Some(101));
    assert_eq!(entry.data, Some(answer(&call(1), 101)));
}

#[tokio::test(start_paused = true)]
async fn kept_fetch_does_not_hold_back_stricter_listener() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(100);
    caller.delay_ms.store(10_000, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 10);
    cache.add_listener(CHAIN, call(2), 1);

    let first = refresh.on_block(100);
    tokio::time::sleep(Duration::from_secs(1)).await;

    // The running fetch still serves call(1); only call(2) needs block 101.
    caller.block_number.store(101, Ordering::SeqCst);
    let second = refresh.on_block(101);
    assert_eq!(second.len(), 1);
    assert_eq!(cache.get_result(CHAIN, &call(1)).unwrap().fetching_block_number, Some(100));
    assert_eq!(cache.get_result(CHAIN, &call(2)).unwrap().fetching_block_number, Some(101));

    join(first).await;
    join(second).await;

    let mut requests = caller.requests.lock().await.clone();
    requests.sort();
    assert_eq!(requests, vec![vec![call(1), call(2)], vec![call(2)]]);
    for i in 1..=2 {
        let entry = cache.get_result(CHAIN, &call(i)).unwrap();
        assert_eq!(entry.block_number, Some(101));
        assert_eq!(entry.fetching_block_number, None);
    }
}

#[tokio::test(start_paused = true)]
async fn in_flight_fetch_is_not_reissued_for_same_block() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(7);
    caller.delay_ms.store(1_000, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 1);

    let first = refresh.on_block(7);
    cache.add_listener(CHAIN, call(2), 1);
    let second = refresh.on_block(7);

    join(first).await;
    join(second).await;

    let mut requests = caller.requests.lock().await.clone();
    requests.sort();
    assert_eq!(requests, vec![vec![call(1)], vec![call(2)]]);
    assert!(cache.get_result(CHAIN, &call(1)).unwrap().is_valid());
    assert!(cache.get_result(CHAIN, &call(2)).unwrap().is_valid());
}

#[tokio::test(start_paused = true)]
async fn malformed_answer_is_recorded_as_fetch_error() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(20);
    caller.short_answer.store(true, Ordering::SeqCst);
    let refresh = service(&cache, caller.clone(), 10);
    cache.add_listener(CHAIN, call(1), 1);
    cache.add_listener(CHAIN, call(2), 1);

    join(refresh.on_block(20)).await;

    // Not retryable: exactly one request.
    assert_eq!(caller.request_sizes().await, vec![2]);
    for i in 1..=2 {
        let entry = cache.get_result(CHAIN, &call(i)).unwrap();
        assert!(matches!(entry.error, Some(CallError::Fetch { .. })));
        assert_eq!(entry.fetching_block_number, None);
    }
    assert_eq!(cache.outdated_keys(CHAIN, 21), vec![call(1), call(2)]);
}

#[tokio::test(start_paused = true)]
async fn run_follows_blocks_and_listeners() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(5);
    let refresh = service(&cache, caller.clone(), 10);
    let (blocks_tx, blocks_rx) = watch::channel(None);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(refresh.run(blocks_rx, shutdown.clone()));

    let first = cache.subscribe(CHAIN, call(1), 1);
    // No block observed yet.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(caller.request_sizes().await.is_empty());

    blocks_tx.send(Some(5)).unwrap();
    wait_for_block(&cache, &call(1), 5).await;

    // A new listener is served without waiting for the next block.
    let second = cache.subscribe(CHAIN, call(2), 1);
    wait_for_block(&cache, &call(2), 5).await;

    drop(second);
    caller.block_number.store(6, Ordering::SeqCst);
    blocks_tx.send(Some(6)).unwrap();
    wait_for_block(&cache, &call(1), 6).await;
    assert_eq!(cache.get_result(CHAIN, &call(2)).unwrap().block_number, Some(5));

    shutdown.cancel();
    task.await.unwrap();
    assert_eq!(first.result().unwrap().data, Some(answer(&call(1), 6)));
}

#[tokio::test(start_paused = true)]
async fn run_refreshes_at_genesis() {
    let cache = CallCache::new();
    let caller = MockCaller::at_block(0);
    let refresh = service(&cache, caller.clone(), 10);
    let (blocks_tx, blocks_rx) = watch::channel(None);
    let shutdown = CancellationToken::new();
    let task = tokio::spawn(refresh.run(blocks_rx, shutdown.clone()));

    let _subscription = cache.subscribe(CHAIN, call(1), 1);
    blocks_tx.send(Some(0)).unwrap();
    wait_for_block(&cache, &call(1), 0).await;
    assert_eq!(cache.get_result(CHAIN, &call(1)).unwrap().data, Some(answer(&call(1), 0)));

    shutdown.cancel();
    task.await.unwrap();
}

async fn wait_for_block(cache: &CallCache, call: &Call, block_number: u64) {
    for _ in 0..100 {
        if cache.get_result(CHAIN, call).and_then(|entry| entry.block_number) == Some(block_number)
        {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("{call} never reached block {block_number}");
}
