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

use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy::{
    providers::{Provider, ProviderBuilder},
    rpc::client::RpcClient,
    transports::layers::RetryBackoffLayer,
};
use anyhow::{bail, Context, Result};
use call_cache::{
    config::{ChainConfig, Config},
    CallCache, ChainMonitor, MulticallAggregator, RefreshService, Subscription,
};
use clap::Parser;
use futures_util::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Keeps a set of on-chain reads fresh and logs every update.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML configuration file.
    #[clap(short, long, env = "CALL_WATCH_CONFIG", default_value = "call-watch.toml")]
    config: PathBuf,
    /// Emit logs as JSON.
    #[clap(long, env, default_value_t = false)]
    log_json: bool,
    /// Maximum number of RPC retries on rate limit errors.
    #[clap(long, env, default_value_t = 10)]
    rpc_retry_max: u32,
    /// Initial backoff in milliseconds for RPC retries.
    #[clap(long, env, default_value_t = 1000)]
    rpc_retry_backoff: u64,
    /// Compute units per second budget of the RPC provider.
    #[clap(long, env, default_value_t = 100)]
    rpc_retry_cu: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.log_json {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .json()
            .with_ansi(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .init();
    }

    let config = Config::load(&args.config).await.context("Failed to load call-watch config")?;
    if config.chains.is_empty() {
        bail!("No chains configured in {:?}", args.config);
    }

    let cache = CallCache::new();
    let shutdown = CancellationToken::new();
    let mut tasks = Vec::new();

    for chain in &config.chains {
        tasks.extend(start_chain(&args, &config, chain, &cache, &shutdown).await?);
    }

    tokio::signal::ctrl_c().await.context("Failed to listen for ctrl-c")?;
    tracing::info!("Received ctrl-c, shutting down");
    shutdown.cancel();

    for res in join_all(tasks).await {
        if let Err(err) = res {
            tracing::error!("Task failed during shutdown: {err:?}");
        }
    }
    Ok(())
}

async fn start_chain(
    args: &Args,
    config: &Config,
    chain: &ChainConfig,
    cache: &CallCache,
    shutdown: &CancellationToken,
) -> Result<Vec<JoinHandle<()>>> {
    let retry_layer =
        RetryBackoffLayer::new(args.rpc_retry_max, args.rpc_retry_backoff, args.rpc_retry_cu);
    let client = RpcClient::builder().layer(retry_layer).http(chain.rpc_url.clone());
    let provider = ProviderBuilder::new().connect_client(client);

    let remote_chain_id = provider
        .get_chain_id()
        .await
        .with_context(|| format!("Failed to query chain id from {}", chain.rpc_url))?;
    if remote_chain_id != chain.chain_id {
        bail!(
            "RPC {} serves chain {remote_chain_id}, configured as chain {}",
            chain.rpc_url,
            chain.chain_id
        );
    }
    tracing::info!(
        "Chain {}: using multicall {} at {}",
        chain.chain_id,
        chain.multicall_address,
        chain.rpc_url
    );

    let monitor =
        ChainMonitor::new(chain.chain_id, Arc::new(provider.clone()), config.monitor.poll_interval());
    let blocks = monitor.subscribe();

    let refresh = RefreshService::new(
        chain.chain_id,
        cache.clone(),
        Arc::new(MulticallAggregator::new(provider, chain.multicall_address)),
    )
    .with_chunk_size(config.cache.chunk_size)
    .with_retry_policy(config.retry_policy());

    let subscriptions: Vec<Subscription> = config
        .watches_for(chain.chain_id)
        .map(|watch| cache.subscribe(chain.chain_id, watch.call(), watch.blocks_per_fetch))
        .collect();
    tracing::info!("Chain {}: watching {} calls", chain.chain_id, subscriptions.len());

    Ok(vec![
        tokio::spawn(monitor.run(shutdown.clone())),
        tokio::spawn(refresh.run(blocks, shutdown.clone())),
        tokio::spawn(report(subscriptions, config.monitor.poll_interval(), shutdown.clone())),
    ])
}

/// Log each subscription whenever its cached block number moves.
async fn report(subscriptions: Vec<Subscription>, interval: Duration, shutdown: CancellationToken) {
    let mut seen: Vec<Option<u64>> = vec![None; subscriptions.len()];
    let mut interval = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = interval.tick() => {}
        }

        for (sub, seen) in subscriptions.iter().zip(seen.iter_mut()) {
            let Some(result) = sub.result() else {
                continue;
            };
            if result.block_number == *seen {
                continue;
            }
            *seen = result.block_number;

            match (&result.data, &result.error) {
                (_, Some(err)) => {
                    tracing::warn!("Chain {} {}: {err}", sub.chain_id(), sub.call())
                }
                (Some(data), None) => tracing::info!(
                    "Chain {} {} @ {}: {data}",
                    sub.chain_id(),
                    sub.call(),
                    result.block_number.unwrap_or_default()
                ),
                (None, None) => {}
            }
        }
    }
}
