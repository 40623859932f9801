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

//! Reward accrual and vesting, as computed by the incentives contract.
//!
//! All functions are pure over a `(Campaign, Balance, now)` triple.

use alloy::primitives::U256;
use thiserror::Error;

use crate::{
    campaign::{Balance, Campaign},
    WAD,
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RewardError {
    /// Locked rewards only exist once emission has ended; the contract reverts here.
    #[error("Campaign still running at {now}, locked rewards are defined from {finish}")]
    CampaignNotFinished { now: u64, finish: u64 },

    #[error("Instant exit fraction {0} exceeds 1e18")]
    InvalidExitFraction(U256),
}

/// Reward-per-token accumulator as of `now`, WAD scaled.
pub fn reward_per_token(campaign: &Campaign, now: u64) -> U256 {
    let last_applicable = campaign.last_time_reward_applicable(now);
    if campaign.total_supply.is_zero() || last_applicable <= campaign.last_update_time {
        return campaign.reward_per_token_stored;
    }

    let elapsed = U256::from(last_applicable - campaign.last_update_time);
    let accrued =
        elapsed.saturating_mul(campaign.reward_rate).saturating_mul(WAD) / campaign.total_supply;
    campaign.reward_per_token_stored.saturating_add(accrued)
}

/// Total reward accrued to the participant by `now`.
pub fn earned(campaign: &Campaign, balance: &Balance, now: u64) -> U256 {
    let per_token = reward_per_token(campaign, now)
        .saturating_sub(balance.user_reward_per_token_paid);
    balance.reward.saturating_add(per_token.saturating_mul(balance.staked_balance) / WAD)
}

/// Delayed reward that can be withdrawn at `now`.
///
/// Fails with [RewardError::CampaignNotFinished] before the campaign ends.
pub fn get_locked_reward(
    campaign: &Campaign,
    balance: &Balance,
    now: u64,
) -> Result<U256, RewardError> {
    let finish = campaign.finish();
    if now < finish {
        return Err(RewardError::CampaignNotFinished { now, finish });
    }

    if now >= campaign.vesting_end() {
        return Ok(balance.delayed_reward_total.saturating_sub(balance.delayed_reward_exited));
    }

    // `reward_delay` is non-zero here, otherwise vesting would already have ended.
    let since_exit = U256::from(now.saturating_sub(balance.delayed_reward_latest_exit_time));
    Ok(balance.delayed_reward_total.saturating_mul(since_exit) / U256::from(campaign.reward_delay))
}

/// Split an earned amount into its instant and delayed shares.
fn split_reward(campaign: &Campaign, total: U256) -> Result<(U256, U256), RewardError> {
    if campaign.instant_exit_fraction > WAD {
        return Err(RewardError::InvalidExitFraction(campaign.instant_exit_fraction));
    }
    let instant = total.saturating_mul(campaign.instant_exit_fraction) / WAD;
    Ok((instant, total - instant))
}

/// Amount transferred if the participant claimed at `now`.
pub fn get_reward(campaign: &Campaign, balance: &Balance, now: u64) -> Result<U256, RewardError> {
    let finish = campaign.finish();
    let (instant, delayed) = split_reward(campaign, earned(campaign, balance, now))?;

    let mut reward = U256::ZERO;
    if !delayed.is_zero() {
        let mut pending = balance.clone();
        if pending.delayed_reward_total.is_zero() {
            pending.delayed_reward_latest_exit_time = finish;
        }
        pending.delayed_reward_total = pending.delayed_reward_total.saturating_add(delayed);

        if finish < now {
            reward = reward.saturating_add(get_locked_reward(campaign, &pending, now)?);
        }
    }

    Ok(reward.saturating_add(instant))
}

/// What the participant can withdraw at `now`.
///
/// Without fresh earnings this is only the vested part of earlier delayed
/// rewards, which is undefined before the campaign ends.
pub fn currently_claimable_reward(
    campaign: &Campaign,
    balance: &Balance,
    now: u64,
) -> Result<U256, RewardError> {
    if earned(campaign, balance, now).is_zero() {
        get_locked_reward(campaign, balance, now)
    } else {
        get_reward(campaign, balance, now)
    }
}

/// Delayed reward, recorded or still to be recorded, that has not vested by `now`.
pub fn currently_locked_reward(
    campaign: &Campaign,
    balance: &Balance,
    now: u64,
) -> Result<U256, RewardError> {
    let (_, delayed) = split_reward(campaign, earned(campaign, balance, now))?;
    let total_delayed = balance.delayed_reward_total.saturating_add(delayed);
    let outstanding = total_delayed.saturating_sub(balance.delayed_reward_exited);

    let vesting_end = campaign.vesting_end();
    if now < campaign.finish() {
        return Ok(outstanding);
    }
    if now >= vesting_end {
        return Ok(U256::ZERO);
    }

    let remaining = U256::from(vesting_end - now);
    let locked = total_delayed.saturating_mul(remaining) / U256::from(campaign.reward_delay);
    Ok(locked.min(outstanding))
}
