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

//! Call identity and the per-key cached result entry.

use std::{fmt, str::FromStr};

use alloy::{
    hex,
    primitives::{Address, Bytes},
    sol_types::SolCall,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Numeric chain identifier.
pub type ChainId = u64;

/// One on-chain read: a target contract and the ABI encoded call payload.
///
/// A call is its own deduplication key. Two calls are identical iff both the
/// target and the payload are byte-for-byte equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Call {
    /// Contract the call is executed against
    pub target: Address,
    /// Encoded selector and arguments
    pub call_data: Bytes,
}

impl Call {
    /// Create a call from a raw payload
    pub fn new(target: Address, call_data: impl Into<Bytes>) -> Self {
        Self { target, call_data: call_data.into() }
    }

    /// Create a call from a typed `sol!` call
    pub fn from_sol<C: SolCall>(target: Address, call: &C) -> Self {
        Self::new(target, call.abi_encode())
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.target, hex::encode_prefixed(&self.call_data))
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ParseCallError {
    #[error("call key must have the form <address>-<calldata>: {0}")]
    Malformed(String),

    #[error("invalid target address: {0}")]
    Address(String),

    #[error("invalid call data hex: {0}")]
    CallData(String),
}

impl FromStr for Call {
    type Err = ParseCallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (target, data) =
            s.split_once('-').ok_or_else(|| ParseCallError::Malformed(s.to_string()))?;
        let target =
            Address::from_str(target).map_err(|err| ParseCallError::Address(err.to_string()))?;
        let call_data = hex::decode(data).map_err(|err| ParseCallError::CallData(err.to_string()))?;
        Ok(Self::new(target, call_data))
    }
}

/// Error recorded against a single call key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The sub-call reverted inside an otherwise successful aggregate
    Reverted {
        /// Revert payload returned by the target
        return_data: Bytes,
    },
    /// The whole aggregate failed with a non-retryable error
    Fetch {
        /// Rendered error
        message: String,
    },
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::Reverted { return_data } => {
                write!(f, "call reverted ({})", hex::encode_prefixed(return_data))
            }
            CallError::Fetch { message } => write!(f, "fetch failed: {message}"),
        }
    }
}

/// Cached state of one call key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallResult {
    /// Last successfully fetched return data
    pub data: Option<Bytes>,
    /// Block the current `data` (or error) was observed at
    pub block_number: Option<u64>,
    /// Block a fetch is currently in flight for
    pub fetching_block_number: Option<u64>,
    /// Error of the most recent attempt, cleared by the next success
    pub error: Option<CallError>,
}

impl CallResult {
    /// No data has ever been received but a fetch is underway
    pub fn is_loading(&self) -> bool {
        self.data.is_none() && self.error.is_none() && self.fetching_block_number.is_some()
    }

    /// Data is present and the latest attempt did not fail
    pub fn is_valid(&self) -> bool {
        self.data.is_some() && self.error.is_none()
    }

    /// Decode the cached return data as the output of `C`
    pub fn decode<C: SolCall>(&self) -> Option<alloy::sol_types::Result<C::Return>> {
        self.data.as_ref().map(|data| C::abi_decode_returns(data))
    }
}
