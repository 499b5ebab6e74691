//! Pure liquidation and redemption planning.
//!
//! Nothing here touches the network: every chain-derived input (balances, rent,
//! the stake sub-account) is read by the executor and handed in.

use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signer},
};
use std::collections::HashMap;

use crate::core::error::{Error, Result};
use crate::core::registry::MintAddresses;
use crate::core::types::RepayAmountPolicy;
use crate::engine::wallet_cache::WalletCache;
use crate::protocol::port::derive_lending_market_authority;
use crate::protocol::port::instructions::{
    self, LiquidateAccounts, RedeemAccounts, StakingAccounts,
};
use crate::protocol::port::{Obligation, ObligationLiquidity, Reserve};

/// Where the repaid liquidity comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepayPath {
    /// The agent's token wallet for the repay mint.
    Token { wallet: Pubkey, amount: u64 },
    /// A temporary wrapped SOL account funded with `lamports` and closed afterwards.
    Native { lamports: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct PlannerContext<'a> {
    pub program_id: Pubkey,
    pub staking_program_id: Pubkey,
    pub agent: Pubkey,
    pub reserves: &'a HashMap<Pubkey, Reserve>,
    pub wallets: &'a WalletCache,
    pub agent_lamports: u64,
    pub native_reserve_lamports: u64,
    /// Rent-exempt minimum for a token account.
    pub token_account_rent: u64,
    pub repay_policy: RepayAmountPolicy,
}

impl<'a> PlannerContext<'a> {
    fn reserve(&self, obligation: &Obligation, address: &Pubkey) -> Result<&'a Reserve> {
        self.reserves.get(address).ok_or(Error::MissingReserve {
            obligation: obligation.address,
            reserve: *address,
        })
    }

    /// Lamports spendable on the native path, if the repay after rent is positive.
    pub fn native_spend(&self) -> Option<u64> {
        let spend = self.agent_lamports.checked_sub(self.native_reserve_lamports)?;
        if spend > self.token_account_rent {
            Some(spend)
        } else {
            None
        }
    }

    fn clamp(&self, on_hand: u64) -> u64 {
        match self.repay_policy {
            RepayAmountPolicy::Exact => on_hand,
            RepayAmountPolicy::Max => u64::MAX,
        }
    }
}

#[derive(Debug)]
pub struct LiquidationPlan {
    pub obligation: Pubkey,
    pub repay_reserve: Pubkey,
    pub withdraw_reserve: Pubkey,
    pub repay_path: RepayPath,
    /// Approved and passed to LiquidateObligation.
    pub repay_amount: u64,
    pub instructions: Vec<Instruction>,
    pub transfer_authority: Keypair,
    pub temp_account: Option<Keypair>,
}

impl LiquidationPlan {
    /// One-shot signers besides the agent.
    pub fn extra_signers(&self) -> Vec<&dyn Signer> {
        let mut signers: Vec<&dyn Signer> = vec![&self.transfer_authority as &dyn Signer];
        if let Some(temp) = &self.temp_account {
            signers.push(temp);
        }
        signers
    }
}

#[derive(Debug)]
pub struct RedeemPlan {
    pub reserve: Pubkey,
    pub collateral_amount: u64,
    pub instructions: Vec<Instruction>,
    pub transfer_authority: Keypair,
}

/// First borrow the agent can actually repay: wrapped SOL when there are
/// spare lamports, otherwise any mint with a non-zero wallet balance.
pub fn select_repay<'o>(
    ctx: &PlannerContext<'_>,
    obligation: &'o Obligation,
) -> Result<(&'o ObligationLiquidity, RepayPath)> {
    for borrow in &obligation.borrows {
        let reserve = ctx.reserve(obligation, &borrow.borrow_reserve)?;
        let mint = &reserve.liquidity.mint;

        if MintAddresses::is_wrapped_sol(mint) {
            if let Some(lamports) = ctx.native_spend() {
                return Ok((borrow, RepayPath::Native { lamports }));
            }
            continue;
        }

        if let Some(wallet) = ctx.wallets.get(mint) {
            if wallet.amount > 0 {
                return Ok((
                    borrow,
                    RepayPath::Token {
                        wallet: wallet.address,
                        amount: wallet.amount,
                    },
                ));
            }
        }
    }

    Err(Error::NoUsableLiquidity(obligation.address))
}

/// Builds the full liquidation transaction body:
/// refresh reserves, [wrap], refresh obligation, approve, liquidate, [unwrap].
pub fn plan_liquidation(
    ctx: &PlannerContext<'_>,
    obligation: &Obligation,
    stake_account: Option<Pubkey>,
) -> Result<LiquidationPlan> {
    let (borrow, repay_path) = select_repay(ctx, obligation)?;
    let repay_reserve = ctx.reserve(obligation, &borrow.borrow_reserve)?;

    let deposit = obligation
        .deposits
        .first()
        .ok_or(Error::NoUsableLiquidity(obligation.address))?;
    let withdraw_reserve = ctx.reserve(obligation, &deposit.deposit_reserve)?;
    let destination_collateral = ctx
        .wallets
        .get(&withdraw_reserve.collateral.mint)
        .ok_or(Error::MissingWallet(withdraw_reserve.collateral.mint))?
        .address;

    let staking = match withdraw_reserve.staking_pool() {
        Some(pool) => {
            let stake_account = stake_account.ok_or(Error::MissingStakeAccount {
                owner: obligation.owner,
                pool,
            })?;
            Some(StakingAccounts {
                stake_account,
                staking_pool: pool,
                staking_program: ctx.staking_program_id,
            })
        }
        None => None,
    };

    let transfer_authority = Keypair::new();
    let mut temp_account = None;

    let mut ixs = Vec::new();
    for address in obligation.distinct_reserves() {
        let reserve = ctx.reserve(obligation, &address)?;
        ixs.push(instructions::refresh_reserve(
            &ctx.program_id,
            &address,
            reserve.liquidity.oracle.as_ref(),
        ));
    }

    let (source_liquidity, repay_amount) = match repay_path {
        RepayPath::Native { lamports } => {
            let temp = Keypair::new();
            ixs.extend(instructions::create_wrapped_sol_account(
                &ctx.agent,
                &temp.pubkey(),
                lamports,
            )?);
            let source = temp.pubkey();
            temp_account = Some(temp);
            (source, ctx.clamp(lamports - ctx.token_account_rent))
        }
        RepayPath::Token { wallet, amount } => (wallet, ctx.clamp(amount)),
    };

    let deposit_reserves: Vec<Pubkey> = obligation.deposit_reserves().copied().collect();
    let borrow_reserves: Vec<Pubkey> = obligation.borrow_reserves().copied().collect();
    ixs.push(instructions::refresh_obligation(
        &ctx.program_id,
        &obligation.address,
        &deposit_reserves,
        &borrow_reserves,
    ));

    ixs.push(instructions::approve(
        &source_liquidity,
        &transfer_authority.pubkey(),
        &ctx.agent,
        repay_amount,
    )?);

    let accounts = LiquidateAccounts {
        source_liquidity,
        destination_collateral,
        repay_reserve: repay_reserve.address,
        repay_reserve_liquidity_supply: repay_reserve.liquidity.supply,
        withdraw_reserve: withdraw_reserve.address,
        withdraw_reserve_collateral_supply: withdraw_reserve.collateral.supply,
        obligation: obligation.address,
        lending_market: obligation.lending_market,
        lending_market_authority: derive_lending_market_authority(
            &obligation.lending_market,
            &ctx.program_id,
        ),
        transfer_authority: transfer_authority.pubkey(),
        staking,
    };
    ixs.push(instructions::liquidate_obligation(&ctx.program_id, repay_amount, &accounts));

    if let Some(temp) = &temp_account {
        ixs.push(instructions::close_wrapped_sol_account(&temp.pubkey(), &ctx.agent)?);
    }

    Ok(LiquidationPlan {
        obligation: obligation.address,
        repay_reserve: repay_reserve.address,
        withdraw_reserve: withdraw_reserve.address,
        repay_path,
        repay_amount,
        instructions: ixs,
        transfer_authority,
        temp_account,
    })
}

/// approve, refresh reserve, redeem. `None` when there is nothing to redeem.
pub fn plan_redeem(
    program_id: &Pubkey,
    reserve: &Reserve,
    wallets: &WalletCache,
) -> Result<Option<RedeemPlan>> {
    let collateral = match wallets.get(&reserve.collateral.mint) {
        Some(wallet) if wallet.amount > 0 => *wallet,
        _ => return Ok(None),
    };
    let destination = wallets
        .get(&reserve.liquidity.mint)
        .ok_or(Error::MissingWallet(reserve.liquidity.mint))?;

    let transfer_authority = Keypair::new();
    let accounts = RedeemAccounts {
        source_collateral: collateral.address,
        destination_liquidity: destination.address,
        reserve: reserve.address,
        reserve_collateral_mint: reserve.collateral.mint,
        reserve_liquidity_supply: reserve.liquidity.supply,
        lending_market: reserve.lending_market,
        lending_market_authority: derive_lending_market_authority(&reserve.lending_market, program_id),
        transfer_authority: transfer_authority.pubkey(),
    };

    let instructions = vec![
        instructions::approve(
            &collateral.address,
            &transfer_authority.pubkey(),
            wallets.owner(),
            collateral.amount,
        )?,
        instructions::refresh_reserve(program_id, &reserve.address, reserve.liquidity.oracle.as_ref()),
        instructions::redeem_reserve_collateral(program_id, collateral.amount, &accounts),
    ];

    Ok(Some(RedeemPlan {
        reserve: reserve.address,
        collateral_amount: collateral.amount,
        instructions,
        transfer_authority,
    }))
}
