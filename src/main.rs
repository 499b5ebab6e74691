use anyhow::{Context, Result};
use dotenv::dotenv;
use solana_sdk::signature::Signer;
use std::path::Path;
use std::sync::Arc;

use port_liquidator::config::Config;
use port_liquidator::executor::Liquidator;
use port_liquidator::rpc_client::RpcClient;
use port_liquidator::scanner::Scanner;
use port_liquidator::utils::wallet::load_keypair;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    log::info!("Starting Port Finance liquidator");

    let config = Config::from_env().context("Failed to load configuration")?;
    let names = config.asset_names().context("Invalid ASSET_NAMES_JSON value")?;
    log::info!(
        "Configuration loaded (dry_run={}, repay_policy={}, {} asset names)",
        config.dry_run,
        config.repay_amount_policy,
        names.len()
    );

    let agent = load_keypair(Path::new(&config.keypair_path)).context("Failed to load keypair")?;
    log::info!("Agent wallet: {}", agent.pubkey());

    let client = Arc::new(RpcClient::new(config.rpc_url.clone(), config.rpc_timeout()));
    let liquidator = Liquidator::new(client, Arc::new(agent), config);

    Scanner::new(liquidator, names).run().await
}
