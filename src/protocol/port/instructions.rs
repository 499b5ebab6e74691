use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
    system_instruction, sysvar,
};
use spl_token::instruction as token_instruction;
use spl_token::solana_program::program_pack::Pack;

use super::layout::ByteWriter;
use crate::core::error::{Error, Result};
use crate::core::registry::MintAddresses;

/// Port lending instruction tags used by the liquidator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LendingInstruction {
    RefreshReserve,
    RedeemReserveCollateral { collateral_amount: u64 },
    RefreshObligation,
    LiquidateObligation { liquidity_amount: u64 },
}

impl LendingInstruction {
    pub fn tag(&self) -> u8 {
        match self {
            LendingInstruction::RefreshReserve => 3,
            LendingInstruction::RedeemReserveCollateral { .. } => 5,
            LendingInstruction::RefreshObligation => 7,
            LendingInstruction::LiquidateObligation { .. } => 12,
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(9);
        writer.u8(self.tag());
        match *self {
            LendingInstruction::RedeemReserveCollateral { collateral_amount } => {
                writer.u64(collateral_amount);
            }
            LendingInstruction::LiquidateObligation { liquidity_amount } => {
                writer.u64(liquidity_amount);
            }
            LendingInstruction::RefreshReserve | LendingInstruction::RefreshObligation => {}
        }
        writer.into_vec()
    }
}

/// Accrue interest and update the market price of a reserve.
///
/// Accounts:
///   0. `[writable]` Reserve
///   1. `[]` Clock sysvar
///   2. `[]` Liquidity oracle, only when the reserve has one
pub fn refresh_reserve(program_id: &Pubkey, reserve: &Pubkey, oracle: Option<&Pubkey>) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*reserve, false),
        AccountMeta::new_readonly(sysvar::clock::id(), false),
    ];
    if let Some(oracle) = oracle {
        accounts.push(AccountMeta::new_readonly(*oracle, false));
    }

    Instruction {
        program_id: *program_id,
        accounts,
        data: LendingInstruction::RefreshReserve.pack(),
    }
}

/// Recompute an obligation's values. The reserve list must be every deposit reserve
/// followed by every borrow reserve, in stored order.
pub fn refresh_obligation(
    program_id: &Pubkey,
    obligation: &Pubkey,
    deposit_reserves: &[Pubkey],
    borrow_reserves: &[Pubkey],
) -> Instruction {
    let mut accounts = Vec::with_capacity(2 + deposit_reserves.len() + borrow_reserves.len());
    accounts.push(AccountMeta::new(*obligation, false));
    accounts.push(AccountMeta::new_readonly(sysvar::clock::id(), false));
    accounts.extend(
        deposit_reserves
            .iter()
            .chain(borrow_reserves.iter())
            .map(|reserve| AccountMeta::new_readonly(*reserve, false)),
    );

    Instruction {
        program_id: *program_id,
        accounts,
        data: LendingInstruction::RefreshObligation.pack(),
    }
}

/// Staking accounts appended to a liquidation when the withdraw reserve stakes deposits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StakingAccounts {
    pub stake_account: Pubkey,
    pub staking_pool: Pubkey,
    pub staking_program: Pubkey,
}

#[derive(Debug, Clone)]
pub struct LiquidateAccounts {
    pub source_liquidity: Pubkey,
    pub destination_collateral: Pubkey,
    pub repay_reserve: Pubkey,
    pub repay_reserve_liquidity_supply: Pubkey,
    pub withdraw_reserve: Pubkey,
    pub withdraw_reserve_collateral_supply: Pubkey,
    pub obligation: Pubkey,
    pub lending_market: Pubkey,
    pub lending_market_authority: Pubkey,
    pub transfer_authority: Pubkey,
    pub staking: Option<StakingAccounts>,
}

pub fn liquidate_obligation(
    program_id: &Pubkey,
    liquidity_amount: u64,
    accounts: &LiquidateAccounts,
) -> Instruction {
    let mut metas = vec![
        AccountMeta::new(accounts.source_liquidity, false),                  // 0
        AccountMeta::new(accounts.destination_collateral, false),            // 1
        AccountMeta::new(accounts.repay_reserve, false),                     // 2
        AccountMeta::new(accounts.repay_reserve_liquidity_supply, false),    // 3
        AccountMeta::new(accounts.withdraw_reserve, false),                  // 4
        AccountMeta::new(accounts.withdraw_reserve_collateral_supply, false), // 5
        AccountMeta::new(accounts.obligation, false),                        // 6
        AccountMeta::new_readonly(accounts.lending_market, false),           // 7
        AccountMeta::new_readonly(accounts.lending_market_authority, false), // 8
        AccountMeta::new_readonly(accounts.transfer_authority, true),        // 9
        AccountMeta::new_readonly(sysvar::clock::id(), false),               // 10
        AccountMeta::new_readonly(spl_token::id(), false),                   // 11
    ];
    if let Some(staking) = &accounts.staking {
        metas.push(AccountMeta::new(staking.stake_account, false));
        metas.push(AccountMeta::new(staking.staking_pool, false));
        metas.push(AccountMeta::new_readonly(staking.staking_program, false));
    }

    Instruction {
        program_id: *program_id,
        accounts: metas,
        data: LendingInstruction::LiquidateObligation { liquidity_amount }.pack(),
    }
}

#[derive(Debug, Clone)]
pub struct RedeemAccounts {
    pub source_collateral: Pubkey,
    pub destination_liquidity: Pubkey,
    pub reserve: Pubkey,
    pub reserve_collateral_mint: Pubkey,
    pub reserve_liquidity_supply: Pubkey,
    pub lending_market: Pubkey,
    pub lending_market_authority: Pubkey,
    pub transfer_authority: Pubkey,
}

pub fn redeem_reserve_collateral(
    program_id: &Pubkey,
    collateral_amount: u64,
    accounts: &RedeemAccounts,
) -> Instruction {
    Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(accounts.source_collateral, false),
            AccountMeta::new(accounts.destination_liquidity, false),
            AccountMeta::new(accounts.reserve, false),
            AccountMeta::new(accounts.reserve_collateral_mint, false),
            AccountMeta::new(accounts.reserve_liquidity_supply, false),
            AccountMeta::new_readonly(accounts.lending_market, false),
            AccountMeta::new_readonly(accounts.lending_market_authority, false),
            AccountMeta::new_readonly(accounts.transfer_authority, true),
            AccountMeta::new_readonly(sysvar::clock::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: LendingInstruction::RedeemReserveCollateral { collateral_amount }.pack(),
    }
}

/// Delegate `amount` from `source` to a one-shot transfer authority.
pub fn approve(source: &Pubkey, delegate: &Pubkey, owner: &Pubkey, amount: u64) -> Result<Instruction> {
    token_instruction::approve(&spl_token::id(), source, delegate, owner, &[], amount)
        .map_err(|e| Error::Instruction(format!("approve: {}", e)))
}

/// Create and initialise a temporary wrapped SOL account funded with `lamports`.
pub fn create_wrapped_sol_account(
    payer: &Pubkey,
    account: &Pubkey,
    lamports: u64,
) -> Result<Vec<Instruction>> {
    let create = system_instruction::create_account(
        payer,
        account,
        lamports,
        spl_token::state::Account::LEN as u64,
        &spl_token::id(),
    );
    let init = token_instruction::initialize_account(
        &spl_token::id(),
        account,
        &MintAddresses::wrapped_sol(),
        payer,
    )
    .map_err(|e| Error::Instruction(format!("initialize_account: {}", e)))?;

    Ok(vec![create, init])
}

/// Close a temporary wrapped SOL account, returning its lamports to `owner`.
pub fn close_wrapped_sol_account(account: &Pubkey, owner: &Pubkey) -> Result<Instruction> {
    token_instruction::close_account(&spl_token::id(), account, owner, owner, &[])
        .map_err(|e| Error::Instruction(format!("close_account: {}", e)))
}
