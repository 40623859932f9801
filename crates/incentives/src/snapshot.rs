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

//! Reading [Campaign] and [Balance] snapshots from the incentives contract.

use alloy::{
    primitives::{Address, U256},
    providers::Provider,
    sol,
};
use anyhow::{Context, Result};

use crate::campaign::{Balance, Campaign};

sol! {
    #[sol(rpc)]
    interface IIncentives {
        function campaigns(uint256 campaignId)
            external
            view
            returns (
                uint256 reward,
                uint256 startTime,
                uint256 duration,
                uint256 rewardRate,
                uint256 lastUpdateTime,
                uint256 rewardPerTokenStored,
                uint256 instantExitPercentage,
                uint256 rewardDelay
            );

        function totalSupply() external view returns (uint256);

        function balanceOf(address account) external view returns (uint256);

        function rewards(uint256 campaignId, address account) external view returns (uint256);

        function userRewardPerTokenPaid(uint256 campaignId, address account)
            external
            view
            returns (uint256);

        function delayedRewards(address account, uint256 campaignId)
            external
            view
            returns (uint256 totalAmount, uint256 exitedAmount, uint256 latestExitTime);
    }
}

fn to_seconds(value: U256, field: &str) -> Result<u64> {
    u64::try_from(value).ok().with_context(|| format!("{field} does not fit in u64: {value}"))
}

impl Campaign {
    /// Build a snapshot from the contract's campaign tuple and total supply
    pub fn from_contract(
        campaign: IIncentives::campaignsReturn,
        total_supply: U256,
    ) -> Result<Self> {
        Ok(Self {
            start_time: to_seconds(campaign.startTime, "startTime")?,
            duration: to_seconds(campaign.duration, "duration")?,
            total_supply,
            reward_rate: campaign.rewardRate,
            instant_exit_fraction: campaign.instantExitPercentage,
            reward_delay: to_seconds(campaign.rewardDelay, "rewardDelay")?,
            reward_per_token_stored: campaign.rewardPerTokenStored,
            last_update_time: to_seconds(campaign.lastUpdateTime, "lastUpdateTime")?,
        })
    }
}

impl Balance {
    /// Build a snapshot from the participant's contract state
    pub fn from_contract(
        staked_balance: U256,
        user_reward_per_token_paid: U256,
        reward: U256,
        delayed: IIncentives::delayedRewardsReturn,
    ) -> Result<Self> {
        Ok(Self {
            staked_balance,
            user_reward_per_token_paid,
            reward,
            delayed_reward_total: delayed.totalAmount,
            delayed_reward_exited: delayed.exitedAmount,
            delayed_reward_latest_exit_time: to_seconds(delayed.latestExitTime, "latestExitTime")?,
        })
    }
}

/// Reads snapshots of one incentives contract.
#[derive(Clone)]
pub struct CampaignReader<P> {
    provider: P,
    address: Address,
}

impl<P: Provider> CampaignReader<P> {
    pub fn new(provider: P, address: Address) -> Self {
        Self { provider, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Read a campaign snapshot
    pub async fn campaign(&self, campaign_id: U256) -> Result<Campaign> {
        let incentives = IIncentives::new(self.address, &self.provider);
        let (campaign, total_supply) = self
            .provider
            .multicall()
            .add(incentives.campaigns(campaign_id))
            .add(incentives.totalSupply())
            .aggregate()
            .await
            .with_context(|| format!("Failed to read campaign {campaign_id}"))?;
        Campaign::from_contract(campaign, total_supply)
    }

    /// Read a campaign and the position of `account` in it, at one block
    pub async fn snapshot(&self, campaign_id: U256, account: Address) -> Result<(Campaign, Balance)> {
        tracing::debug!("Reading campaign {campaign_id} snapshot for {account}");
        let incentives = IIncentives::new(self.address, &self.provider);
        let (campaign, total_supply, staked, paid, reward, delayed) = self
            .provider
            .multicall()
            .add(incentives.campaigns(campaign_id))
            .add(incentives.totalSupply())
            .add(incentives.balanceOf(account))
            .add(incentives.userRewardPerTokenPaid(campaign_id, account))
            .add(incentives.rewards(campaign_id, account))
            .add(incentives.delayedRewards(account, campaign_id))
            .aggregate()
            .await
            .with_context(|| format!("Failed to read campaign {campaign_id} for {account}"))?;

        Ok((
            Campaign::from_contract(campaign, total_supply)?,
            Balance::from_contract(staked, paid, reward, delayed)?,
        ))
    }
}
