use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use port_liquidator::oracle::{OraclePrograms, PriceResolver};
use port_liquidator::port::{Obligation, Reserve};
use port_liquidator::registry::ProgramIds;
use port_liquidator::rpc_client::{ChainClient, RpcClient};
use port_liquidator::types::AssetNames;
use port_liquidator::utils::math::format_wad;
use port_liquidator::valuation::{prefilter, ValuationEngine};

/// Decode one obligation and print its valuation.
#[derive(Parser, Debug)]
#[command(name = "inspect_obligation")]
struct Args {
    /// RPC endpoint
    #[arg(long, default_value = "https://api.mainnet-beta.solana.com")]
    rpc_url: String,

    /// Obligation account address
    #[arg(long)]
    obligation: String,

    /// Lending program that should own the obligation
    #[arg(long, default_value = ProgramIds::PORT_LENDING)]
    program_id: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();
    let address = Pubkey::from_str(&args.obligation).context("Invalid --obligation value")?;
    let program_id = Pubkey::from_str(&args.program_id).context("Invalid --program-id value")?;
    let client = RpcClient::new(args.rpc_url.clone(), Duration::from_secs(10));

    let account = client
        .get_account(&address)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Obligation account {} not found", address))?;
    if account.owner != program_id {
        log::warn!("{} is owned by {}, not {}", address, account.owner, program_id);
    }
    let obligation = Obligation::unpack(address, &account.data)
        .with_context(|| format!("Failed to decode obligation {}", address))?;

    println!("Obligation {}", obligation.address);
    println!("  owner:          {}", obligation.owner);
    println!("  lending market: {}", obligation.lending_market);
    println!(
        "  last update:    slot {} (stale={})",
        obligation.last_update.slot, obligation.last_update.stale
    );

    let reserve_keys = obligation.distinct_reserves();
    let reserve_accounts = client.get_multiple_accounts(&reserve_keys).await?;
    let mut reserves = HashMap::new();
    for (key, account) in reserve_keys.iter().zip(reserve_accounts) {
        match account {
            Some(account) => match Reserve::unpack(*key, &account.data) {
                Ok(reserve) => {
                    reserves.insert(*key, reserve);
                }
                Err(e) => println!("  reserve {}: {}", key, e),
            },
            None => println!("  reserve {}: account not found", key),
        }
    }

    let resolver = PriceResolver::new(&client, OraclePrograms::default());
    let prices = resolver.resolve_all(reserves.values()).await;
    for (reserve, error) in &prices.failures {
        println!("  reserve {} unpriced: {}", reserve, error);
    }

    if let Some(reason) = prefilter(&obligation) {
        println!("  would be skipped by the scanner: {}", reason);
    }

    let names = AssetNames::default();
    let engine = ValuationEngine::new(&reserves, &prices, &names);
    let enriched = engine
        .evaluate(&obligation)
        .with_context(|| format!("Failed to value obligation {}", address))?;

    for (deposit, value) in obligation.deposits.iter().zip(&enriched.deposit_values) {
        println!(
            "  deposit {} amount {} collateral value {}",
            deposit.deposit_reserve,
            deposit.deposited_amount,
            format_wad(value, 6)
        );
    }
    for (borrow, value) in obligation.borrows.iter().zip(&enriched.borrow_values) {
        println!(
            "  borrow  {} amount {} loan value {}",
            borrow.borrow_reserve,
            format_wad(&borrow.borrowed_amount_wads.into(), 6),
            format_wad(value, 6)
        );
    }

    println!("  loan value:       {}", format_wad(&enriched.loan_value, 6));
    println!("  collateral value: {}", format_wad(&enriched.collateral_value, 6));
    println!("  risk factor:      {}", format_wad(&enriched.risk_factor, 6));
    println!("  liquidatable:     {}", enriched.is_liquidatable());

    Ok(())
}
