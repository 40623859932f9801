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

//! The aggregate read endpoint and the chunk fetch built on top of it.

use alloy::{
    primitives::{address, Address, Bytes},
    providers::Provider,
    sol,
};
use async_trait::async_trait;
use thiserror::Error;

use crate::{call::Call, errors::CodedError, impl_coded_debug, retry::Retryable};

/// Canonical Multicall3 deployment, identical on every major EVM chain.
pub const MULTICALL3_ADDRESS: Address = address!("0xcA11bde05977b3631167028862bE2a173976CA11");

sol! {
    #[sol(rpc)]
    interface IMulticall3 {
        struct Call {
            address target;
            bytes callData;
        }

        struct Outcome {
            bool success;
            bytes returnData;
        }

        function tryBlockAndAggregate(bool requireSuccess, Call[] calldata calls)
            external
            payable
            returns (uint256 blockNumber, bytes32 blockHash, Outcome[] memory returnData);
    }
}

/// Result of one call inside an aggregate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
    /// False if the sub-call reverted
    pub success: bool,
    /// Return data, or revert data when `success` is false
    pub return_data: Bytes,
}

impl CallOutcome {
    pub fn success(return_data: impl Into<Bytes>) -> Self {
        Self { success: true, return_data: return_data.into() }
    }

    pub fn failure(return_data: impl Into<Bytes>) -> Self {
        Self { success: false, return_data: return_data.into() }
    }
}

/// All outcomes of one aggregate, in request order, observed at one block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateResponse {
    pub block_number: u64,
    pub outcomes: Vec<CallOutcome>,
}

#[derive(Error)]
pub enum AggregateError {
    #[error("Aggregate answered for block {got}, need at least {min}")]
    StaleBlock { got: u64, min: u64 },

    #[error("RPC error: {0}")]
    Rpc(#[from] alloy::contract::Error),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Aggregate returned {got} outcomes for {expected} calls")]
    LengthMismatch { expected: usize, got: usize },
}

impl_coded_debug!(AggregateError);

impl CodedError for AggregateError {
    fn code(&self) -> &str {
        match self {
            AggregateError::StaleBlock { .. } => "[C-AGG-001]",
            AggregateError::Rpc(_) => "[C-AGG-002]",
            AggregateError::Transport(_) => "[C-AGG-003]",
            AggregateError::LengthMismatch { .. } => "[C-AGG-004]",
        }
    }
}

impl Retryable for AggregateError {
    fn is_retryable(&self) -> bool {
        match self {
            AggregateError::StaleBlock { .. }
            | AggregateError::Rpc(_)
            | AggregateError::Transport(_) => true,
            AggregateError::LengthMismatch { .. } => false,
        }
    }
}

/// A batched read endpoint: executes `calls` against a single block.
///
/// A reverting sub-call must be reported as a failed [CallOutcome] rather than
/// as an error of the whole aggregate.
#[async_trait]
pub trait AggregateCaller: Send + Sync {
    async fn aggregate(&self, calls: &[Call]) -> Result<AggregateResponse, AggregateError>;
}

/// [AggregateCaller] backed by a Multicall3 contract.
#[derive(Clone)]
pub struct MulticallAggregator<P> {
    provider: P,
    address: Address,
}

impl<P> MulticallAggregator<P> {
    pub fn new(provider: P, address: Address) -> Self {
        Self { provider, address }
    }

    /// Use the canonical Multicall3 deployment
    pub fn canonical(provider: P) -> Self {
        Self::new(provider, MULTICALL3_ADDRESS)
    }

    pub fn address(&self) -> Address {
        self.address
    }
}

#[async_trait]
impl<P: Provider + Clone + 'static> AggregateCaller for MulticallAggregator<P> {
    async fn aggregate(&self, calls: &[Call]) -> Result<AggregateResponse, AggregateError> {
        let multicall = IMulticall3::new(self.address, &self.provider);
        let calls: Vec<IMulticall3::Call> = calls
            .iter()
            .map(|call| IMulticall3::Call { target: call.target, callData: call.call_data.clone() })
            .collect();

        let result = multicall.tryBlockAndAggregate(false, calls).call().await?;

        let block_number: u64 = result
            .blockNumber
            .try_into()
            .map_err(|_| AggregateError::Transport("block number overflows u64".to_string()))?;
        let outcomes = result
            .returnData
            .into_iter()
            .map(|outcome| CallOutcome { success: outcome.success, return_data: outcome.returnData })
            .collect();

        Ok(AggregateResponse { block_number, outcomes })
    }
}

/// Run one aggregate for `chunk`, requiring the answer to be for `min_block` or newer.
pub async fn fetch_chunk(
    caller: &dyn AggregateCaller,
    chunk: &[Call],
    min_block: u64,
) -> Result<AggregateResponse, AggregateError> {
    tracing::trace!("Fetching chunk of {} calls for block {min_block}", chunk.len());
    let response = caller.aggregate(chunk).await?;

    if response.block_number < min_block {
        return Err(AggregateError::StaleBlock { got: response.block_number, min: min_block });
    }
    if response.outcomes.len() != chunk.len() {
        return Err(AggregateError::LengthMismatch {
            expected: chunk.len(),
            got: response.outcomes.len(),
        });
    }
    Ok(response)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCaller(AggregateResponse);

    #[async_trait]
    impl AggregateCaller for FixedCaller {
        async fn aggregate(&self, _calls: &[Call]) -> Result<AggregateResponse, AggregateError> {
            Ok(self.0.clone())
        }
    }

    fn calls(n: u8) -> Vec<Call> {
        (0..n).map(|i| Call::new(Address::repeat_byte(i), vec![i])).collect()
    }

    #[tokio::test]
    async fn stale_block_is_retryable() {
        let caller = FixedCaller(AggregateResponse {
            block_number: 99,
            outcomes: vec![CallOutcome::success(vec![1])],
        });

        let err = fetch_chunk(&caller, &calls(1), 100).await.unwrap_err();
        assert!(matches!(err, AggregateError::StaleBlock { got: 99, min: 100 }));
        assert!(err.is_retryable());
        assert!(format!("{err:?}").starts_with("[C-AGG-001]"));
    }

    #[tokio::test]
    async fn newer_block_is_accepted() {
        let caller = FixedCaller(AggregateResponse {
            block_number: 105,
            outcomes: vec![CallOutcome::success(vec![1]), CallOutcome::failure(vec![])],
        });

        let response = fetch_chunk(&caller, &calls(2), 100).await.unwrap();
        assert_eq!(response.block_number, 105);
        assert!(!response.outcomes[1].success);
    }

    #[tokio::test]
    async fn outcome_count_must_match() {
        let caller = FixedCaller(AggregateResponse {
            block_number: 100,
            outcomes: vec![CallOutcome::success(vec![1])],
        });

        let err = fetch_chunk(&caller, &calls(3), 100).await.unwrap_err();
        assert!(matches!(err, AggregateError::LengthMismatch { expected: 3, got: 1 }));
        assert!(!err.is_retryable());
    }
}
