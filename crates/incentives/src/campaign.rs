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

//! Snapshots of campaign and participant state.

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

/// State of one reward campaign at read time
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Campaign {
    /// Unix timestamp the campaign starts emitting at
    pub start_time: u64,
    /// Emission period in seconds
    pub duration: u64,
    /// Total staked supply
    pub total_supply: U256,
    /// Reward tokens emitted per second
    pub reward_rate: U256,
    /// Share of a claim paid out immediately, WAD scaled (0..=1e18)
    pub instant_exit_fraction: U256,
    /// Seconds over which the delayed share vests after the campaign ends
    pub reward_delay: u64,
    /// Reward-per-token accumulator, WAD scaled
    pub reward_per_token_stored: U256,
    /// Timestamp `reward_per_token_stored` was last updated at
    pub last_update_time: u64,
}

impl Campaign {
    /// Timestamp emission stops at
    pub fn finish(&self) -> u64 {
        self.start_time.saturating_add(self.duration)
    }

    /// Timestamp the delayed share is fully vested at
    pub fn vesting_end(&self) -> u64 {
        self.finish().saturating_add(self.reward_delay)
    }

    /// `now` clamped to the emission window
    pub fn last_time_reward_applicable(&self, now: u64) -> u64 {
        now.clamp(self.start_time, self.finish())
    }
}

/// One participant's position in a campaign
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Amount staked
    pub staked_balance: U256,
    /// Accumulator value at the participant's last checkpoint, WAD scaled
    pub user_reward_per_token_paid: U256,
    /// Reward accrued but not yet claimed
    pub reward: U256,
    /// Delayed reward granted so far
    pub delayed_reward_total: U256,
    /// Delayed reward already withdrawn
    pub delayed_reward_exited: U256,
    /// Timestamp of the last delayed reward withdrawal
    pub delayed_reward_latest_exit_time: u64,
}
