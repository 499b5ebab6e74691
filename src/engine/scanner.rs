//! The scan driver: snapshot, sweep, price, value, liquidate, sleep.

use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;

use crate::blockchain::rpc_client::ChainClient;
use crate::core::error::Error;
use crate::core::types::AssetNames;
use crate::engine::executor::{LiquidationOutcome, Liquidator};
use crate::engine::valuation::ValuationEngine;
use crate::engine::wallet_cache::WalletCache;
use crate::protocol::oracle::{OraclePrograms, PriceResolver};
use crate::protocol::port::accounts::{obligation_filters, reserve_filters};
use crate::protocol::port::{Obligation, Reserve};

/// Decoded reserves and obligations of one cycle.
#[derive(Debug, Default)]
pub struct Snapshot {
    pub reserves: HashMap<Pubkey, Reserve>,
    pub obligations: Vec<Obligation>,
    /// Raw obligation accounts returned, before decoding.
    pub fetched_obligations: usize,
}

impl Snapshot {
    pub async fn fetch<C: ChainClient + ?Sized>(client: &C, program_id: &Pubkey) -> Result<Self> {
        let reserve_accounts = client
            .get_program_accounts(program_id, reserve_filters())
            .await
            .context("Failed to fetch reserves")?;
        let obligation_accounts = client
            .get_program_accounts(program_id, obligation_filters())
            .await
            .context("Failed to fetch obligations")?;

        let reserves: HashMap<Pubkey, Reserve> = reserve_accounts
            .iter()
            .filter_map(|(address, account)| Reserve::decode(*address, &account.data))
            .map(|reserve| (reserve.address, reserve))
            .collect();
        let obligations: Vec<Obligation> = obligation_accounts
            .iter()
            .filter_map(|(address, account)| Obligation::decode(*address, &account.data))
            .collect();

        log::debug!(
            "Snapshot: {}/{} reserves and {}/{} obligations decoded",
            reserves.len(),
            reserve_accounts.len(),
            obligations.len(),
            obligation_accounts.len()
        );

        Ok(Snapshot {
            reserves,
            obligations,
            fetched_obligations: obligation_accounts.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub fetched: usize,
    /// Obligations that passed the pre-filters and could be valued.
    pub candidates: usize,
    pub liquidatable: usize,
    pub liquidated: usize,
    pub failed: usize,
    pub redeemed: usize,
}

pub struct Scanner<C: ChainClient + ?Sized> {
    liquidator: Liquidator<C>,
    names: AssetNames,
}

impl<C: ChainClient + ?Sized> Scanner<C> {
    pub fn new(liquidator: Liquidator<C>, names: AssetNames) -> Self {
        Scanner { liquidator, names }
    }

    pub fn liquidator(&self) -> &Liquidator<C> {
        &self.liquidator
    }

    /// Runs cycles forever. A failed cycle is logged and retried after the usual sleep.
    pub async fn run(&self) -> Result<()> {
        let config = self.liquidator.config();
        log::info!(
            "Scanner: lending program {}, poll every {:?}, dry_run={}",
            config.lending_program_id,
            config.poll_interval(),
            config.dry_run
        );

        loop {
            match self.run_cycle().await {
                Ok(report) => log::info!(
                    "Cycle done: fetched={} candidates={} liquidatable={} liquidated={} failed={} redeemed={}",
                    report.fetched,
                    report.candidates,
                    report.liquidatable,
                    report.liquidated,
                    report.failed,
                    report.redeemed
                ),
                Err(e) => log::error!("Cycle aborted: {:#}", e),
            }
            tokio::time::sleep(config.poll_interval()).await;
        }
    }

    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let config = self.liquidator.config();
        let client = self.liquidator.client();

        let snapshot = Snapshot::fetch(client, &config.lending_program_id).await?;
        let mut report = CycleReport {
            fetched: snapshot.fetched_obligations,
            ..Default::default()
        };

        let mints = WalletCache::reserve_mints(snapshot.reserves.values());
        let mut wallets = self.load_wallets(&mints, None).await;

        report.redeemed += self.liquidator.sweep(&snapshot.reserves, &wallets).await;
        if report.redeemed > 0 {
            wallets = self.load_wallets(&mints, Some(wallets)).await;
        }

        let resolver = PriceResolver::new(client, OraclePrograms::from_config(config));
        let prices = resolver.resolve_all(snapshot.reserves.values()).await;
        if !prices.failures.is_empty() {
            log::warn!(
                "{} of {} reserves unpriced this cycle",
                prices.failures.len(),
                snapshot.reserves.len()
            );
        }

        let engine = ValuationEngine::new(&snapshot.reserves, &prices, &self.names);
        let valuation = engine.evaluate_all(&snapshot.obligations);
        report.candidates = valuation.candidates();

        log::info!(
            "{} obligations fetched, {} decoded, {} candidates, {} excluded, skipped {:?}",
            snapshot.fetched_obligations,
            snapshot.obligations.len(),
            valuation.candidates(),
            valuation.excluded,
            valuation.skipped
        );
        for (rank, enriched) in valuation.ranked.iter().take(config.display_first).enumerate() {
            log::info!("#{} {}", rank + 1, enriched.summary());
        }

        for enriched in valuation.liquidatable() {
            report.liquidatable += 1;
            match self
                .liquidator
                .liquidate(&enriched.obligation, &snapshot.reserves, &mut wallets)
                .await
            {
                Ok(LiquidationOutcome::Liquidated { redeemed, .. }) => {
                    report.liquidated += 1;
                    if redeemed.is_some() {
                        report.redeemed += 1;
                    }
                }
                Ok(LiquidationOutcome::DryRun { .. }) => {}
                Err(e) => {
                    report.failed += 1;
                    match e.downcast_ref::<Error>() {
                        Some(
                            Error::NoUsableLiquidity(_)
                            | Error::MissingWallet(_)
                            | Error::MissingStakeAccount { .. },
                        ) => log::debug!("Skipping liquidation of {}: {}", enriched.address(), e),
                        _ => log::error!("Liquidation of {} failed: {:#}", enriched.address(), e),
                    }
                }
            }
        }

        Ok(report)
    }

    /// A failed wallet read keeps `previous` (or an empty cache), so the
    /// affected obligations fail one by one instead of the whole cycle.
    async fn load_wallets(&self, mints: &[Pubkey], previous: Option<WalletCache>) -> WalletCache {
        let agent = self.liquidator.agent();
        match WalletCache::build(self.liquidator.client(), agent, mints).await {
            Ok(wallets) => wallets,
            Err(e) => {
                log::warn!("Scanner: wallet cache not refreshed this cycle: {:#}", e);
                previous.unwrap_or_else(|| WalletCache::new(agent))
            }
        }
    }
}
