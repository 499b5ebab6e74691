//! Liquidation plans built by the planner and submitted through the executor.

mod common;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signer;
use std::collections::HashMap;

use common::{add_stake_account, obligation, reserve, sent_instructions, test_config, Market, TOKEN_ACCOUNT_RENT};
use port_liquidator::error::Error;
use port_liquidator::executor::{LiquidationOutcome, Liquidator};
use port_liquidator::planner::{plan_liquidation, PlannerContext};
use port_liquidator::port::Reserve;
use port_liquidator::registry::MintAddresses;
use port_liquidator::types::RepayAmountPolicy;
use port_liquidator::wallet_cache::{TokenWallet, WalletCache};

const REFRESH_RESERVE: u8 = 3;
const REFRESH_OBLIGATION: u8 = 7;
const LIQUIDATE: u8 = 12;

fn reserves_of(market: &Market) -> HashMap<Pubkey, Reserve> {
    [market.x.clone(), market.y.clone()]
        .into_iter()
        .map(|r| (r.address, r))
        .collect()
}

#[test]
fn test_scenario_d_refresh_obligation_lists_deposits_then_borrows() {
    let lending_market = Pubkey::new_unique();
    let legs: Vec<Reserve> = (0..5).map(|_| reserve(lending_market, 1_000, 1_000, 80)).collect();
    let reserves: HashMap<Pubkey, Reserve> = legs.iter().map(|r| (r.address, r.clone())).collect();
    let (d1, d2, b1, b2, b3) = (
        legs[0].address,
        legs[1].address,
        legs[2].address,
        legs[3].address,
        legs[4].address,
    );

    let position = obligation(
        lending_market,
        &[(d1, 10), (d2, 20)],
        &[(b1, 1), (b2, 2), (b3, 3)],
    );

    let agent = Pubkey::new_unique();
    let mut wallets = WalletCache::new(agent);
    wallets.insert(TokenWallet {
        address: Pubkey::new_unique(),
        mint: legs[2].liquidity.mint,
        amount: 1_000,
    });
    wallets.insert(TokenWallet {
        address: Pubkey::new_unique(),
        mint: legs[0].collateral.mint,
        amount: 0,
    });

    let ctx = PlannerContext {
        program_id: Pubkey::new_unique(),
        staking_program_id: Pubkey::new_unique(),
        agent,
        reserves: &reserves,
        wallets: &wallets,
        agent_lamports: 0,
        native_reserve_lamports: 0,
        token_account_rent: TOKEN_ACCOUNT_RENT,
        repay_policy: RepayAmountPolicy::Exact,
    };
    let plan = plan_liquidation(&ctx, &position, None).unwrap();

    let refreshes: Vec<&Pubkey> = plan
        .instructions
        .iter()
        .filter(|ix| ix.data == vec![REFRESH_RESERVE])
        .map(|ix| &ix.accounts[0].pubkey)
        .collect();
    assert_eq!(refreshes, vec![&d1, &d2, &b1, &b2, &b3], "each distinct reserve refreshed once");

    let refresh_obligation = plan
        .instructions
        .iter()
        .find(|ix| ix.data == vec![REFRESH_OBLIGATION])
        .expect("refresh obligation instruction");
    let listed: Vec<Pubkey> = refresh_obligation.accounts[2..].iter().map(|m| m.pubkey).collect();
    assert_eq!(listed, vec![d1, d2, b1, b2, b3]);

    assert_eq!(plan.repay_reserve, b1);
    assert_eq!(plan.withdraw_reserve, d1);
    assert_eq!(plan.repay_amount, 1_000);
}

#[tokio::test]
async fn test_token_liquidation_is_signed_and_submitted() {
    let market = Market::new();
    market.fund_agent(750_000);
    let position = market.open(900_000);

    let reserves = reserves_of(&market);
    let mints = WalletCache::reserve_mints(reserves.values());
    let mut wallets = WalletCache::build(market.client.as_ref(), market.agent_key(), &mints)
        .await
        .unwrap();

    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), test_config(false));
    let outcome = liquidator.liquidate(&position, &reserves, &mut wallets).await.unwrap();
    assert!(matches!(outcome, LiquidationOutcome::Liquidated { redeemed: None, .. }));

    let sent = market.client.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_signed(), "agent and transfer authority signed");

    let ixs = sent_instructions(&sent[0]);
    let liquidate = ixs.last().unwrap();
    assert_eq!(liquidate.program_id, market.program_id);
    assert_eq!(liquidate.data[0], LIQUIDATE);
    assert_eq!(&liquidate.data[1..], &750_000u64.to_le_bytes());
    assert_eq!(liquidate.accounts[6], position.address);
    assert_eq!(liquidate.accounts.len(), 12, "no staking accounts");
}

#[tokio::test]
async fn test_landed_liquidation_survives_failed_wallet_refresh() {
    let market = Market::new();
    market.fund_agent(750_000);
    let position = market.open(900_000);

    let reserves = reserves_of(&market);
    let mints = WalletCache::reserve_mints(reserves.values());
    let mut wallets = WalletCache::build(market.client.as_ref(), market.agent_key(), &mints)
        .await
        .unwrap();
    market.client.fail_reads_after_send();

    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), test_config(false));
    let outcome = liquidator.liquidate(&position, &reserves, &mut wallets).await;

    assert!(
        matches!(outcome, Ok(LiquidationOutcome::Liquidated { .. })),
        "got {:?}",
        outcome
    );
    assert_eq!(market.client.sent().len(), 1);
    // The stale cached balance is kept.
    assert_eq!(wallets.balance(&market.y.liquidity.mint), 750_000);
}

#[tokio::test]
async fn test_staked_collateral_appends_stake_accounts() {
    let mut market = Market::new();
    let pool = Pubkey::new_unique();
    market.x.config.deposit_staking_pool = Some(pool);
    market.fund_agent(500_000);
    let position = market.open(900_000);

    let config = test_config(false);
    let stake_account = add_stake_account(&market.client, &config.staking_program_id, &position.owner, &pool);
    // Another staker in the same pool must not match.
    add_stake_account(&market.client, &config.staking_program_id, &Pubkey::new_unique(), &pool);

    let reserves = reserves_of(&market);
    let mints = WalletCache::reserve_mints(reserves.values());
    let mut wallets = WalletCache::build(market.client.as_ref(), market.agent_key(), &mints)
        .await
        .unwrap();

    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), config.clone());
    assert_eq!(
        liquidator.find_stake_account(&position.owner, &pool).await.unwrap(),
        Some(stake_account)
    );

    liquidator.liquidate(&position, &reserves, &mut wallets).await.unwrap();

    let sent = market.client.sent();
    let ixs = sent_instructions(&sent[0]);
    let liquidate = ixs.last().unwrap();
    assert_eq!(liquidate.accounts.len(), 15);
    assert_eq!(liquidate.accounts[11], spl_token::id());
    assert_eq!(
        &liquidate.accounts[12..],
        &[stake_account, pool, config.staking_program_id]
    );
}

#[tokio::test]
async fn test_missing_stake_account_submits_nothing() {
    let mut market = Market::new();
    market.x.config.deposit_staking_pool = Some(Pubkey::new_unique());
    market.fund_agent(500_000);
    let position = market.open(900_000);

    let reserves = reserves_of(&market);
    let mints = WalletCache::reserve_mints(reserves.values());
    let mut wallets = WalletCache::build(market.client.as_ref(), market.agent_key(), &mints)
        .await
        .unwrap();

    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), test_config(false));
    let err = liquidator
        .liquidate(&position, &reserves, &mut wallets)
        .await
        .unwrap_err();

    assert!(
        matches!(err.downcast_ref::<Error>(), Some(Error::MissingStakeAccount { .. })),
        "got {:#}",
        err
    );
    assert!(market.client.sent().is_empty());
}

#[tokio::test]
async fn test_native_repay_wraps_then_unwraps() {
    let mut market = Market::new();
    market.y.liquidity.mint = MintAddresses::wrapped_sol();
    let agent = market.agent_key();
    market.client.add_token_wallet(&agent, &market.x.collateral.mint, 0);

    let config = test_config(false);
    let spend = 2_000_000_000u64;
    market
        .client
        .set_balance(&agent, config.native_reserve_lamports + spend);
    let position = market.open(900_000);

    let reserves = reserves_of(&market);
    let mints = WalletCache::reserve_mints(reserves.values());
    let mut wallets = WalletCache::build(market.client.as_ref(), agent, &mints).await.unwrap();

    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), config);
    liquidator.liquidate(&position, &reserves, &mut wallets).await.unwrap();

    let sent = market.client.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].is_signed(), "temporary account signed too");

    let ixs = sent_instructions(&sent[0]);
    let programs: Vec<Pubkey> = ixs.iter().map(|ix| ix.program_id).collect();
    assert_eq!(
        programs,
        vec![
            market.program_id,
            market.program_id,
            solana_sdk::system_program::id(),
            spl_token::id(),
            market.program_id,
            spl_token::id(),
            market.program_id,
            spl_token::id(),
        ]
    );

    let temp = ixs[2].accounts[1];
    assert_eq!(ixs[3].accounts[0], temp, "initialized account is the created one");
    assert_eq!(ixs[6].accounts[0], temp, "liquidity comes from the temporary account");
    assert_eq!(ixs[7].accounts[0], temp, "and it is closed afterwards");
    assert_eq!(&ixs[6].data[1..], &(spend - TOKEN_ACCOUNT_RENT).to_le_bytes());
    assert_ne!(temp, agent);
}

#[tokio::test]
async fn test_dry_run_plans_without_submitting() {
    let market = Market::new();
    market.fund_agent(10);
    let position = market.open(900_000);

    let reserves = reserves_of(&market);
    let mints = WalletCache::reserve_mints(reserves.values());
    let mut wallets = WalletCache::build(market.client.as_ref(), market.agent.pubkey(), &mints)
        .await
        .unwrap();

    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), test_config(true));
    let outcome = liquidator.liquidate(&position, &reserves, &mut wallets).await.unwrap();

    assert_eq!(
        outcome,
        LiquidationOutcome::DryRun {
            repay_amount: 10,
            instructions: 5
        }
    );
    assert!(market.client.sent().is_empty());
}
