//! Mars Credit Bridge Relayer
//!
//! Moves value between the Mars Credit L1 bridge contract and the Solana
//! mint: L1 locks become memo-tagged mints, Solana burns become L1 unlocks.

use std::sync::Arc;
use std::time::Duration;

use eyre::WrapErr;
use tokio::task::JoinSet;
use tracing::{error, info};

use multichain_rs::evm::{EvmBridgeClient, EvmBridgeConfig};
use multichain_rs::solana::{SolanaMintClient, SolanaMintConfig};
use multichain_rs::{DestinationChain, OriginChain};

use relayer::api::{self, ApiState};
use relayer::backfill::BackfillScanner;
use relayer::config::Config;
use relayer::confirmation::ConfirmationTracker;
use relayer::oracle::IdempotencyOracle;
use relayer::registry::EventRegistry;
use relayer::retry::RpcEndpoint;
use relayer::settlement::{MintWorker, SettlementRunner, SettlementWorker, UnlockWorker};
use relayer::shutdown;
use relayer::watchers::{DestinationWatcher, L1Watcher, WatcherManager};

fn main() -> eyre::Result<()> {
    color_eyre::install()?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> eyre::Result<()> {
    init_logging();

    info!("Starting Mars Credit Bridge Relayer");

    let config = Config::load()?;
    info!(
        l1 = ?config.l1,
        solana = ?config.solana,
        finality_blocks = config.confirmation.finality_blocks,
        strategy = %config.oracle.strategy,
        "Configuration loaded"
    );

    let l1_client = Arc::new(EvmBridgeClient::new(&EvmBridgeConfig {
        rpc_url: config.l1.rpc_url.clone(),
        bridge_address: config.l1.bridge_address.clone(),
        private_key: config.l1.private_key.clone(),
    })?);
    let solana_client = Arc::new(SolanaMintClient::new(&SolanaMintConfig {
        rpc_url: config.solana.rpc_url.clone(),
        mint_address: config.solana.mint_address.clone(),
        keypair: config.solana.private_key.clone(),
    })?);

    let policy = config.retry_policy();
    let l1_rpc = RpcEndpoint::new("l1", policy.clone(), config.retry.rpc_concurrency);
    let solana_rpc = RpcEndpoint::new("solana", policy.clone(), config.retry.rpc_concurrency);

    // Fail fast on unreachable chains or a wrong contract address
    let height = l1_rpc
        .call("eth_blockNumber", || l1_client.current_height())
        .await
        .wrap_err("L1 RPC unreachable")?;
    let bridge_count = l1_rpc
        .call("bridgeCount", || l1_client.bridge_count())
        .await
        .wrap_err("Bridge contract not readable")?;
    let slot = solana_rpc
        .call("getSlot", || solana_client.current_slot())
        .await
        .wrap_err("Solana RPC unreachable")?;
    info!(
        l1_height = height,
        bridge_count,
        solana_slot = slot,
        relayer = %l1_client.relayer_address(),
        mint_authority = %solana_client.authority(),
        "Connected to both chains"
    );

    let origin: Arc<dyn OriginChain> = l1_client;
    let dest: Arc<dyn DestinationChain> = solana_client;

    let registry = Arc::new(EventRegistry::new());
    let oracle = Arc::new(IdempotencyOracle::new(
        dest.clone(),
        origin.clone(),
        solana_rpc.clone(),
        l1_rpc.clone(),
        config.oracle_config(),
    ));

    let watchers = WatcherManager::new(
        L1Watcher::new(origin.clone(), l1_rpc.clone(), registry.clone(), &config.l1),
        DestinationWatcher::new(
            dest.clone(),
            solana_rpc.clone(),
            oracle.clone(),
            registry.clone(),
            &config.solana,
        ),
    );
    let tracker = Arc::new(ConfirmationTracker::new(
        origin.clone(),
        l1_rpc.clone(),
        oracle.clone(),
        registry.clone(),
        &config.confirmation,
    ));
    let workers: Vec<Arc<dyn SettlementWorker>> = vec![
        Arc::new(MintWorker::new(
            dest.clone(),
            solana_rpc.clone(),
            oracle.clone(),
            registry.clone(),
            Duration::from_secs(config.settlement.resubmit_grace_secs),
        )),
        Arc::new(UnlockWorker::new(origin.clone(), l1_rpc.clone(), oracle.clone())),
    ];
    let runner = Arc::new(SettlementRunner::new(
        registry.clone(),
        workers,
        policy,
        &config.settlement,
    ));
    let backfill = BackfillScanner::new(
        origin,
        l1_rpc,
        oracle,
        registry.clone(),
        config.l1.deploy_block,
        config.l1.max_block_range,
    );

    let (shutdown_tx, shutdown_rx) = shutdown::channel();
    let mut tasks = JoinSet::new();

    let rx = shutdown_rx.clone();
    tasks.spawn(async move { ("backfill", backfill.run(rx).await.map(|_| ())) });

    let rx = shutdown_rx.clone();
    tasks.spawn(async move { ("watchers", watchers.run(rx).await) });

    let rx = shutdown_rx.clone();
    tasks.spawn(async move { ("confirmation", tracker.run(rx).await) });

    let rx = shutdown_rx.clone();
    tasks.spawn(async move { ("settlement", runner.run(rx).await) });

    let api_state = ApiState::new(registry);
    let bind_address = config.api.bind_address.clone();
    tasks.spawn(async move {
        ("api", api::start_api_server(&bind_address, api_state, shutdown_rx).await)
    });

    info!("Relayer running");
    let signal = shutdown::wait_for_signal();
    tokio::pin!(signal);
    loop {
        tokio::select! {
            _ = &mut signal => break,
            Some(joined) = tasks.join_next() => log_task_exit(joined),
        }
    }

    let _ = shutdown_tx.send(true);
    while let Some(joined) = tasks.join_next().await {
        log_task_exit(joined);
    }

    info!("Mars Credit Bridge Relayer stopped");
    Ok(())
}

fn log_task_exit(joined: Result<(&'static str, eyre::Result<()>), tokio::task::JoinError>) {
    match joined {
        Ok((name, Ok(()))) => info!(task = name, "Task stopped"),
        Ok((name, Err(e))) => error!(task = name, error = ?e, "Task stopped with error"),
        Err(e) => error!(error = ?e, "Task panicked"),
    }
}

/// Initialize tracing/logging with structured output
fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,relayer=debug,mars_bridge_relayer=debug"));

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    if json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .with(filter)
            .init();
    }
}
