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

use alloy::primitives::U256;
use serde::{Deserialize, Serialize};

use crate::{
    accrual::{
        currently_claimable_reward, currently_locked_reward, earned, reward_per_token, RewardError,
    },
    campaign::{Balance, Campaign},
};

/// Everything a position view shows, computed from one snapshot pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSummary {
    /// Accumulator as of `now`, WAD scaled
    pub reward_per_token: U256,
    /// Total reward accrued to the participant
    pub earned: U256,
    /// Withdrawable now; `None` while nothing is earned and the campaign is
    /// still running, since locked rewards are undefined then
    pub claimable: Option<U256>,
    /// Delayed reward that has not vested yet
    pub locked: U256,
}

impl RewardSummary {
    pub fn compute(campaign: &Campaign, balance: &Balance, now: u64) -> Result<Self, RewardError> {
        let claimable = match currently_claimable_reward(campaign, balance, now) {
            Ok(claimable) => Some(claimable),
            Err(RewardError::CampaignNotFinished { .. }) => None,
            Err(err) => return Err(err),
        };

        let summary = Self {
            reward_per_token: reward_per_token(campaign, now),
            earned: earned(campaign, balance, now),
            claimable,
            locked: currently_locked_reward(campaign, balance, now)?,
        };
        tracing::trace!("Reward summary at {now}: {summary:?}");
        Ok(summary)
    }
}
