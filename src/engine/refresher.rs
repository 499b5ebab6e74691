//! Keeps obligations fresh on chain by submitting batched refresh transactions.

use anyhow::Result;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::blockchain::rpc_client::ChainClient;
use crate::blockchain::transaction::{send_and_confirm, TransactionBuilder};
use crate::core::config::Config;
use crate::engine::scanner::Snapshot;
use crate::protocol::port::instructions::{refresh_obligation, refresh_reserve};
use crate::protocol::port::{Obligation, Reserve};

/// One transaction body per batch of up to `batch_size` borrowing obligations:
/// each distinct reserve of the batch is refreshed, then each obligation.
pub fn refresh_batches(
    program_id: &Pubkey,
    obligations: &[Obligation],
    reserves: &HashMap<Pubkey, Reserve>,
    batch_size: usize,
) -> Vec<Vec<Instruction>> {
    let refreshable: Vec<&Obligation> = obligations
        .iter()
        .filter(|obligation| !obligation.borrows.is_empty())
        .filter(|obligation| {
            let known = obligation
                .distinct_reserves()
                .iter()
                .all(|reserve| reserves.contains_key(reserve));
            if !known {
                log::debug!("Refresher: {} references an unknown reserve, skipped", obligation.address);
            }
            known
        })
        .collect();

    refreshable
        .chunks(batch_size.max(1))
        .map(|batch| {
            let mut seen = HashSet::new();
            let mut ixs = Vec::new();

            for obligation in batch {
                for address in obligation.distinct_reserves() {
                    if !seen.insert(address) {
                        continue;
                    }
                    if let Some(reserve) = reserves.get(&address) {
                        ixs.push(refresh_reserve(program_id, &address, reserve.liquidity.oracle.as_ref()));
                    }
                }
            }

            for obligation in batch {
                let deposits: Vec<Pubkey> = obligation.deposit_reserves().copied().collect();
                let borrows: Vec<Pubkey> = obligation.borrow_reserves().copied().collect();
                ixs.push(refresh_obligation(program_id, &obligation.address, &deposits, &borrows));
            }
            ixs
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshReport {
    pub batches: usize,
    pub submitted: usize,
    pub failed: usize,
}

pub struct Refresher<C: ChainClient + ?Sized> {
    client: Arc<C>,
    agent: Arc<Keypair>,
    config: Config,
}

impl<C: ChainClient + ?Sized> Refresher<C> {
    pub fn new(client: Arc<C>, agent: Arc<Keypair>, config: Config) -> Self {
        Refresher {
            client,
            agent,
            config,
        }
    }

    pub async fn run(&self) -> Result<()> {
        loop {
            match self.run_once().await {
                Ok(report) => log::info!(
                    "Refresh pass done: batches={} submitted={} failed={}",
                    report.batches,
                    report.submitted,
                    report.failed
                ),
                Err(e) => log::error!("Refresh pass aborted: {:#}", e),
            }
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    pub async fn run_once(&self) -> Result<RefreshReport> {
        let snapshot = Snapshot::fetch(self.client.as_ref(), &self.config.lending_program_id).await?;
        let batches = refresh_batches(
            &self.config.lending_program_id,
            &snapshot.obligations,
            &snapshot.reserves,
            self.config.refresh_batch_size,
        );

        let mut report = RefreshReport {
            batches: batches.len(),
            ..Default::default()
        };

        for (index, instructions) in batches.into_iter().enumerate() {
            if self.config.dry_run {
                log::info!(
                    "DRY RUN: refresh batch {} with {} instructions not submitted",
                    index,
                    instructions.len()
                );
                continue;
            }

            let mut builder = TransactionBuilder::new(self.agent.pubkey());
            builder
                .add_compute_budget(
                    self.config.compute_unit_limit,
                    self.config.priority_fee_micro_lamports,
                )
                .add_instructions(instructions);

            match send_and_confirm(self.client.as_ref(), &builder, &[&*self.agent as &dyn Signer]).await {
                Ok(signature) => {
                    report.submitted += 1;
                    log::info!("Refresher: batch {} refreshed in {}", index, signature);
                }
                Err(e) => {
                    report.failed += 1;
                    log::error!("Refresher: batch {} failed: {}", index, e);
                }
            }
        }

        Ok(report)
    }
}
