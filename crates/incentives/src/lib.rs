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

//! Client side model of the linear vesting incentives contract.
//!
//! Given a [Campaign] and a [Balance] read from chain, the functions in
//! [accrual] reproduce the contract's reward-per-token accumulator, the
//! instant / delayed reward split and the vesting of the delayed part, so that
//! "claimable now" and "still locked" amounts can be shown without sending a
//! transaction.
//!
//! Token amounts are [U256] base units. The accumulator and the instant exit
//! fraction are WAD (1e18) fixed point, exactly as the contract stores them,
//! and every division truncates like the contract does.

use alloy::primitives::U256;

pub mod accrual;
pub mod campaign;
pub mod snapshot;
pub mod summary;

pub use accrual::{
    currently_claimable_reward, currently_locked_reward, earned, get_locked_reward, get_reward,
    reward_per_token, RewardError,
};
pub use campaign::{Balance, Campaign};
pub use snapshot::CampaignReader;
pub use summary::RewardSummary;

/// Fixed point unit of the accumulator and of the instant exit fraction.
pub const WAD: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
