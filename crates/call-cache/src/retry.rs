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

//! Unbounded retry with bounded waits and explicit cancellation.

use std::{fmt, future::Future, time::Duration};

use rand::Rng;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that know whether another attempt could succeed.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Error, Debug)]
pub enum RetryError<E> {
    /// The [CancelHandle] was triggered before a result was produced
    #[error("Cancelled")]
    Cancelled,
    /// The operation failed with a non-retryable error
    #[error("{0}")]
    Failed(E),
}

/// Configuration for the wait between attempts
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Shortest wait between attempts
    pub min_wait: Duration,
    /// Longest wait between attempts, regardless of backoff
    pub max_wait: Duration,
    /// Multiplier applied to `min_wait` after each failed attempt
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            min_wait: Duration::from_millis(2500),
            max_wait: Duration::from_millis(3500),
            backoff_multiplier: 1.0,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `retry_count` failures.
    ///
    /// The backed-off floor is capped at `max_wait`, then a uniform jitter
    /// up to `max_wait` is applied.
    pub fn calculate_retry_delay(&self, retry_count: usize) -> Duration {
        let max_ms = self.max_wait.as_millis() as u64;
        let backoff = self.min_wait.as_millis() as f64
            * self.backoff_multiplier.max(1.0).powi(retry_count.min(64) as i32);
        let floor_ms = (backoff.min(max_ms as f64) as u64).min(max_ms);

        let wait_ms =
            if max_ms > floor_ms { rand::rng().random_range(floor_ms..=max_ms) } else { floor_ms };
        Duration::from_millis(wait_ms)
    }
}

/// Stops a running [retry] loop.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    token: CancellationToken,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Run `op` until it succeeds, fails with a non-retryable error or is cancelled.
///
/// The returned future does nothing until polled. Cancelling interrupts both
/// an in-progress attempt and the wait between attempts, and a result that
/// completes after cancellation is reported as [RetryError::Cancelled].
pub fn retry<T, E, F, Fut>(
    policy: RetryPolicy,
    mut op: F,
) -> (impl Future<Output = Result<T, RetryError<E>>>, CancelHandle)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + fmt::Display,
{
    let handle = CancelHandle::default();
    let token = handle.token.clone();

    let fut = async move {
        let mut retry_count = 0;
        loop {
            let res = tokio::select! {
                biased;
                _ = token.cancelled() => return Err(RetryError::Cancelled),
                res = op() => res,
            };

            match res {
                Ok(value) => {
                    if token.is_cancelled() {
                        return Err(RetryError::Cancelled);
                    }
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    let delay = policy.calculate_retry_delay(retry_count);
                    retry_count += 1;
                    tracing::debug!(
                        "Retryable failure (attempt {retry_count}): {err}, waiting {delay:?}"
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Err(err) => return Err(RetryError::Failed(err)),
            }
        }
    };

    (fut, handle)
}
