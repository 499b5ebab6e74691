//! Chain I/O around the planner: reads the inputs a plan needs, signs and
//! submits it, then redeems whatever collateral the liquidation seized.

use anyhow::{Context, Result};
use futures::future::join_all;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use spl_token::solana_program::program_pack::Pack;
use std::collections::HashMap;
use std::sync::Arc;

use crate::blockchain::rpc_client::ChainClient;
use crate::blockchain::transaction::{send_and_confirm, TransactionBuilder};
use crate::core::config::Config;
use crate::engine::planner::{plan_liquidation, plan_redeem, PlannerContext, RepayPath};
use crate::engine::wallet_cache::WalletCache;
use crate::protocol::port::accounts::stake_account_filters;
use crate::protocol::port::{Obligation, Reserve};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LiquidationOutcome {
    /// Planned and logged, nothing submitted.
    DryRun { repay_amount: u64, instructions: usize },
    Liquidated {
        signature: Signature,
        redeemed: Option<Signature>,
    },
}

pub struct Liquidator<C: ChainClient + ?Sized> {
    client: Arc<C>,
    agent: Arc<Keypair>,
    config: Config,
}

impl<C: ChainClient + ?Sized> Liquidator<C> {
    pub fn new(client: Arc<C>, agent: Arc<Keypair>, config: Config) -> Self {
        Liquidator {
            client,
            agent,
            config,
        }
    }

    pub fn agent(&self) -> Pubkey {
        self.agent.pubkey()
    }

    pub fn client(&self) -> &C {
        self.client.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The staker's sub-account in `pool`, if one exists.
    pub async fn find_stake_account(&self, owner: &Pubkey, pool: &Pubkey) -> Result<Option<Pubkey>> {
        let accounts = self
            .client
            .get_program_accounts(&self.config.staking_program_id, stake_account_filters(owner, pool))
            .await
            .with_context(|| format!("Failed to look up stake account for {} in pool {}", owner, pool))?;

        if accounts.len() > 1 {
            log::warn!(
                "Liquidator: {} stake accounts for {} in pool {}, using the first",
                accounts.len(),
                owner,
                pool
            );
        }
        Ok(accounts.first().map(|(address, _)| *address))
    }

    async fn submit(&self, instructions: Vec<Instruction>, extra_signers: &[&dyn Signer]) -> Result<Signature> {
        let mut builder = TransactionBuilder::new(self.agent.pubkey());
        builder
            .add_compute_budget(
                self.config.compute_unit_limit,
                self.config.priority_fee_micro_lamports,
            )
            .add_instructions(instructions);

        let mut signers: Vec<&dyn Signer> = vec![&*self.agent as &dyn Signer];
        signers.extend_from_slice(extra_signers);

        let signature = send_and_confirm(self.client.as_ref(), &builder, &signers).await?;
        Ok(signature)
    }

    /// Plans and submits one liquidation, then redeems the seized collateral.
    pub async fn liquidate(
        &self,
        obligation: &Obligation,
        reserves: &HashMap<Pubkey, Reserve>,
        wallets: &mut WalletCache,
    ) -> Result<LiquidationOutcome> {
        let agent = self.agent.pubkey();
        let agent_lamports = self
            .client
            .get_balance(&agent)
            .await
            .context("Failed to read agent balance")?;
        let token_account_rent = self
            .client
            .get_minimum_balance_for_rent_exemption(spl_token::state::Account::LEN)
            .await
            .context("Failed to read token account rent")?;

        let staking_pool = obligation
            .deposits
            .first()
            .and_then(|deposit| reserves.get(&deposit.deposit_reserve))
            .and_then(|reserve| reserve.staking_pool());
        let stake_account = match staking_pool {
            Some(pool) => self.find_stake_account(&obligation.owner, &pool).await?,
            None => None,
        };

        let plan = {
            let ctx = PlannerContext {
                program_id: self.config.lending_program_id,
                staking_program_id: self.config.staking_program_id,
                agent,
                reserves,
                wallets: &*wallets,
                agent_lamports,
                native_reserve_lamports: self.config.native_reserve_lamports,
                token_account_rent,
                repay_policy: self.config.repay_amount_policy,
            };
            plan_liquidation(&ctx, obligation, stake_account)?
        };

        log::info!(
            "Liquidator: obligation {} repay reserve {} via {:?}, withdraw reserve {}, amount {}, {} instructions",
            plan.obligation,
            plan.repay_reserve,
            plan.repay_path,
            plan.withdraw_reserve,
            plan.repay_amount,
            plan.instructions.len()
        );

        if self.config.dry_run {
            log::info!("DRY RUN: not submitting liquidation of {}", plan.obligation);
            return Ok(LiquidationOutcome::DryRun {
                repay_amount: plan.repay_amount,
                instructions: plan.instructions.len(),
            });
        }

        let signature = self
            .submit(plan.instructions.clone(), &plan.extra_signers())
            .await
            .with_context(|| format!("Liquidation of {} rejected", plan.obligation))?;
        log::info!("Liquidator: liquidated {} in {}", plan.obligation, signature);

        // The liquidation has landed; from here on failures are logged, not returned.
        if let Some(reserve) = reserves.get(&plan.repay_reserve) {
            if let RepayPath::Token { .. } = plan.repay_path {
                self.refresh_wallet(wallets, &reserve.liquidity.mint).await;
            }
        }

        let redeemed = match reserves.get(&plan.withdraw_reserve) {
            Some(reserve) => {
                self.refresh_wallet(wallets, &reserve.collateral.mint).await;
                match self.redeem(reserve, wallets).await {
                    Ok(signature) => {
                        self.refresh_wallet(wallets, &reserve.collateral.mint).await;
                        self.refresh_wallet(wallets, &reserve.liquidity.mint).await;
                        signature
                    }
                    Err(e) => {
                        log::error!(
                            "Liquidator: redeem after liquidating {} failed, the next sweep retries: {:#}",
                            plan.obligation,
                            e
                        );
                        None
                    }
                }
            }
            None => None,
        };

        Ok(LiquidationOutcome::Liquidated {
            signature,
            redeemed,
        })
    }

    async fn refresh_wallet(&self, wallets: &mut WalletCache, mint: &Pubkey) {
        if let Err(e) = wallets.refresh(self.client.as_ref(), mint).await {
            log::warn!("Liquidator: keeping cached balance for mint {}: {:#}", mint, e);
        }
    }

    /// Converts the agent's collateral shares in `reserve` back to liquidity.
    pub async fn redeem(&self, reserve: &Reserve, wallets: &WalletCache) -> Result<Option<Signature>> {
        let plan = match plan_redeem(&self.config.lending_program_id, reserve, wallets)? {
            Some(plan) => plan,
            None => return Ok(None),
        };

        if self.config.dry_run {
            log::info!(
                "DRY RUN: not redeeming {} collateral shares of reserve {}",
                plan.collateral_amount,
                plan.reserve
            );
            return Ok(None);
        }

        let signature = self
            .submit(plan.instructions.clone(), &[&plan.transfer_authority as &dyn Signer])
            .await
            .with_context(|| format!("Redeem from reserve {} rejected", plan.reserve))?;
        log::info!(
            "Liquidator: redeemed {} collateral shares of reserve {} in {}",
            plan.collateral_amount,
            plan.reserve,
            signature
        );
        Ok(Some(signature))
    }

    /// Redeems every leftover collateral balance concurrently. Returns how many succeeded.
    pub async fn sweep(&self, reserves: &HashMap<Pubkey, Reserve>, wallets: &WalletCache) -> usize {
        let pending: Vec<&Reserve> = reserves
            .values()
            .filter(|reserve| wallets.balance(&reserve.collateral.mint) > 0)
            .collect();
        if pending.is_empty() {
            return 0;
        }

        log::info!("Liquidator: sweeping leftover collateral in {} reserves", pending.len());
        let results = join_all(pending.iter().map(|reserve| self.redeem(reserve, wallets))).await;

        let mut redeemed = 0;
        for (reserve, result) in pending.iter().zip(results) {
            match result {
                Ok(Some(_)) => redeemed += 1,
                Ok(None) => {}
                Err(e) => log::error!("Liquidator: sweep of reserve {} failed: {:#}", reserve.address, e),
            }
        }
        redeemed
    }
}
