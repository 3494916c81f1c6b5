//! poolwatch CLI — inspect and manage persisted watcher state.
//!
//! Usage:
//! ```bash
//! poolwatch status
//! poolwatch subscriptions
//! poolwatch report
//! poolwatch rollover
//! poolwatch reset
//! ```
//!
//! The data directory and state name come from the environment
//! (`POOLWATCH_DATA_DIR`, default `./data`).

use std::env;
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};

use poolwatch_core::persist::StateStore;
use poolwatch_core::{format_report, SubKey, SubscriptionStore, WatchConfig};
use poolwatch_storage::FileStateStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        print_usage();
        process::exit(1);
    }

    match args[1].as_str() {
        "status" => cmd_status().await?,
        "subscriptions" => cmd_subscriptions().await?,
        "report" => cmd_report().await?,
        "rollover" => cmd_rollover().await?,
        "reset" => cmd_reset().await?,
        "info" => cmd_info(),
        "version" | "--version" | "-V" => {
            println!("poolwatch {}", env!("CARGO_PKG_VERSION"));
        }
        "help" | "--help" | "-h" => print_usage(),
        other => {
            eprintln!("Unknown command: {other}");
            print_usage();
            process::exit(1);
        }
    }
    Ok(())
}

fn print_usage() {
    println!("poolwatch {}", env!("CARGO_PKG_VERSION"));
    println!("Staking-pool reward watcher — state inspection\n");
    println!("USAGE:");
    println!("    poolwatch <COMMAND>\n");
    println!("COMMANDS:");
    println!("    status         Show head pointers and aggregate counts");
    println!("    subscriptions  List every chat's watched (pool, account) pairs");
    println!("    report         Print delta figures for every subscription record");
    println!("    rollover       Re-baseline every record for the next interval");
    println!("    reset          Delete the persisted state document");
    println!("    info           Show configuration info");
    println!("    version        Print version");
    println!("    help           Print this help");
}

async fn open_store(config: &WatchConfig) -> Result<SubscriptionStore> {
    let backend = Arc::new(
        FileStateStore::open(config.data_dir.as_str())
            .await
            .with_context(|| format!("opening data dir {}", config.data_dir))?,
    );
    SubscriptionStore::open(backend, config.state_name.as_str())
        .await
        .context("loading persisted state")
}

async fn cmd_status() -> Result<()> {
    let config = WatchConfig::from_env();
    let store = open_store(&config).await?;
    let data = store.export();

    match &data.current_head {
        Some(head) => println!("current head: #{} {}", head.height, head.hash),
        None => println!("current head: none (watcher has not observed a head yet)"),
    }
    match &data.last_head {
        Some(head) => println!("last head:    #{} {}", head.height, head.hash),
        None => println!("last head:    none"),
    }
    println!("pools cached:  {}", data.pools.len());
    println!("records:       {}", data.subscriptions.len());
    println!("chats:         {}", data.subscription_maps.len());
    Ok(())
}

async fn cmd_subscriptions() -> Result<()> {
    let config = WatchConfig::from_env();
    let store = open_store(&config).await?;
    let data = store.export();

    if data.subscription_maps.is_empty() {
        println!("No subscriptions.");
        return Ok(());
    }
    for (chat, keys) in &data.subscription_maps {
        println!("chat {chat}:");
        for key in keys {
            println!("  {key}");
        }
    }
    Ok(())
}

async fn cmd_report() -> Result<()> {
    let config = WatchConfig::from_env();
    let store = open_store(&config).await?;
    let data = store.export();

    let mut printed = 0;
    for (raw, record) in &data.subscriptions {
        let key = SubKey::from_str(raw)
            .map_err(|e| anyhow::anyhow!("malformed key in state: {e}"))?;
        match format_report(&key, record)? {
            Some(text) => {
                println!("{text}\n");
                printed += 1;
            }
            None => println!("{raw}: not observed yet\n"),
        }
    }
    if printed == 0 {
        println!("No observed subscriptions.");
    }
    Ok(())
}

async fn cmd_rollover() -> Result<()> {
    let config = WatchConfig::from_env();
    let store = open_store(&config).await?;
    store.rollover_baselines().await?;
    println!("Baselines rolled over.");
    Ok(())
}

async fn cmd_reset() -> Result<()> {
    let config = WatchConfig::from_env();
    let backend = FileStateStore::open(config.data_dir.as_str()).await?;
    backend.delete(&config.state_name).await?;
    println!("State document deleted.");
    Ok(())
}

fn cmd_info() {
    let config = WatchConfig::from_env();
    println!("Poolwatch v{}", env!("CARGO_PKG_VERSION"));
    println!("  Endpoint:       {}", config.endpoint);
    println!("  Poll interval:  {} ms", config.poll_interval_ms);
    println!("  Max attempts:   {}", config.max_attempts);
    println!("  Data dir:       {}", config.data_dir);
    println!("  State name:     {}", config.state_name);
    println!("  Report cadence: {}", config.report_cron);
}
