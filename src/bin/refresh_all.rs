use anyhow::{Context, Result};
use dotenv::dotenv;
use solana_sdk::signature::Signer;
use std::path::Path;
use std::sync::Arc;

use port_liquidator::config::Config;
use port_liquidator::refresher::Refresher;
use port_liquidator::rpc_client::RpcClient;
use port_liquidator::utils::wallet::load_keypair;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let config = Config::from_env().context("Failed to load configuration")?;
    let agent = load_keypair(Path::new(&config.keypair_path)).context("Failed to load keypair")?;
    log::info!(
        "Refreshing obligations of {} in batches of {} as {} (dry_run={})",
        config.lending_program_id,
        config.refresh_batch_size,
        agent.pubkey(),
        config.dry_run
    );

    let client = Arc::new(RpcClient::new(config.rpc_url.clone(), config.rpc_timeout()));
    Refresher::new(client, Arc::new(agent), config).run().await
}
