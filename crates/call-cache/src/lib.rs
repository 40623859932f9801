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

//! Deduplicated, block-driven cache of on-chain read calls.
//!
//! Consumers register interest in a [Call] together with how stale the data
//! may get (blocks per fetch). On every new block a [RefreshService] collects
//! the outdated calls of its chain, splits them into aggregate sized chunks and
//! fetches each chunk through an [AggregateCaller], retrying until the answer
//! is fresh enough or a newer block supersedes it. Results are committed to the
//! shared [CallCache], which never moves a key back to an older block.

pub mod aggregate;
pub mod call;
pub mod chunk;
pub mod config;
pub mod errors;
pub mod listeners;
pub mod monitor;
pub mod refresh;
pub mod retry;
pub mod store;
pub mod subscription;

pub use aggregate::{
    fetch_chunk, AggregateCaller, AggregateError, AggregateResponse, CallOutcome,
    MulticallAggregator, MULTICALL3_ADDRESS,
};
pub use call::{Call, CallError, CallResult, ChainId};
pub use chunk::{chunk_calls, chunk_ranges};
pub use config::Config;
pub use monitor::{BlockNumberSource, ChainMonitor};
pub use refresh::RefreshService;
pub use retry::{retry, CancelHandle, RetryError, RetryPolicy, Retryable};
pub use store::{is_outdated, min_fresh_block, CallCache};
pub use subscription::Subscription;

/// Maximum number of calls bundled into one aggregate request.
pub const DEFAULT_CHUNK_SIZE: usize = 500;
