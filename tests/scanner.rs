//! End-to-end cycles of the scan driver against the mock chain.

mod common;

use solana_sdk::pubkey::Pubkey;

use common::{account, obligation, reserve, sent_instructions, test_config, Market};
use port_liquidator::config::Config;
use port_liquidator::executor::Liquidator;
use port_liquidator::scanner::{CycleReport, Scanner};
use port_liquidator::types::AssetNames;

const LIQUIDATE: u8 = 12;
const REDEEM: u8 = 5;

fn scanner(market: &Market, config: Config) -> Scanner<common::MockChainClient> {
    let liquidator = Liquidator::new(market.client.clone(), market.agent.clone(), config);
    let names = AssetNames::new(
        [
            (market.x.address, "X".to_string()),
            (market.y.address, "Y".to_string()),
        ]
        .into_iter()
        .collect(),
    );
    Scanner::new(liquidator, names)
}

fn liquidated_obligations(market: &Market) -> Vec<Pubkey> {
    market
        .client
        .sent()
        .iter()
        .flat_map(sent_instructions)
        .filter(|ix| ix.program_id == market.program_id && ix.data.first() == Some(&LIQUIDATE))
        .map(|ix| ix.accounts[6])
        .collect()
}

#[tokio::test]
async fn test_cycle_liquidates_only_unhealthy_obligations() {
    let market = Market::new();
    market.fund_agent(1_000_000);
    let unhealthy = market.open(900_000);
    market.open(800_000);

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(
        report,
        CycleReport {
            fetched: 2,
            candidates: 2,
            liquidatable: 1,
            liquidated: 1,
            failed: 0,
            redeemed: 0,
        }
    );
    assert_eq!(liquidated_obligations(&market), vec![unhealthy.address]);
}

#[tokio::test]
async fn test_dry_run_cycle_submits_nothing() {
    let market = Market::new();
    market.fund_agent(1_000_000);
    market.open(900_000);
    market.open(950_000);

    let report = scanner(&market, test_config(true)).run_cycle().await.unwrap();

    assert_eq!(report.liquidatable, 2);
    assert_eq!(report.liquidated, 0);
    assert_eq!(report.failed, 0);
    assert!(market.client.sent().is_empty());
}

#[tokio::test]
async fn test_one_rejected_liquidation_does_not_stop_the_cycle() {
    let market = Market::new();
    market.fund_agent(1_000_000);
    let riskiest = market.open(950_000);
    let next = market.open(900_000);
    market.client.reject_transactions_touching(riskiest.address);

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(report.liquidatable, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(report.liquidated, 1);
    assert_eq!(liquidated_obligations(&market), vec![next.address]);
}

#[tokio::test]
async fn test_unrepayable_obligations_are_counted_as_failed() {
    let market = Market::new();
    // Collateral wallet exists but the agent holds none of the debt.
    market.fund_agent(0);
    market.open(900_000);

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(report.liquidatable, 1);
    assert_eq!(report.failed, 1);
    assert!(market.client.sent().is_empty());
}

#[tokio::test]
async fn test_unrecognized_oracle_only_excludes_its_obligations() {
    let market = Market::new();
    market.fund_agent(1_000_000);
    let priced = market.open(900_000);

    let oracle = Pubkey::new_unique();
    let mut z = reserve(market.lending_market, 1_000_000, 1_000_000, 90);
    z.liquidity.oracle = Some(oracle);
    market.client.add_reserve(&market.program_id, &z);
    market.client.add_account(oracle, account(Pubkey::new_unique(), vec![7u8; 32]));
    let unpriced = obligation(market.lending_market, &[(z.address, 1_000_000)], &[(market.y.address, 2_000_000)]);
    market.client.add_obligation(&market.program_id, &unpriced);

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.candidates, 1);
    assert_eq!(report.liquidatable, 1);
    assert_eq!(liquidated_obligations(&market), vec![priced.address]);
}

#[tokio::test]
async fn test_sweep_redeems_leftover_collateral() {
    let market = Market::new();
    let agent = market.agent_key();
    market.client.add_token_wallet(&agent, &market.x.collateral.mint, 4_200);
    market.client.add_token_wallet(&agent, &market.x.liquidity.mint, 0);

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(report.redeemed, 1);
    assert_eq!(report.liquidatable, 0);

    let sent = market.client.sent();
    assert_eq!(sent.len(), 1);
    let ixs = sent_instructions(&sent[0]);
    assert_eq!(ixs.len(), 3, "approve, refresh reserve, redeem");
    assert_eq!(ixs[0].program_id, spl_token::id());
    assert_eq!(ixs[1].accounts[0], market.x.address);
    assert_eq!(ixs[2].data[0], REDEEM);
    assert_eq!(&ixs[2].data[1..], &4_200u64.to_le_bytes());
}

#[tokio::test]
async fn test_snapshot_failure_aborts_the_cycle() {
    let market = Market::new();
    market.client.fail_program_accounts();

    let result = scanner(&market, test_config(false)).run_cycle().await;

    let err = result.unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to fetch reserves"), "got {:#}", err);
    assert!(market.client.sent().is_empty());
}

#[tokio::test]
async fn test_wallet_read_failure_fails_obligations_not_the_cycle() {
    let market = Market::new();
    market.fund_agent(1_000_000);
    market.open(900_000);
    market.open(950_000);
    market.client.fail_multiple_accounts();

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(report.fetched, 2);
    assert_eq!(report.liquidatable, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.liquidated, 0);
    assert!(market.client.sent().is_empty());
}

#[tokio::test]
async fn test_send_failures_are_isolated_per_obligation() {
    let market = Market::new();
    market.fund_agent(1_000_000);
    market.open(900_000);
    market.open(990_000);
    market.client.fail_sends();

    let report = scanner(&market, test_config(false)).run_cycle().await.unwrap();

    assert_eq!(report.liquidatable, 2);
    assert_eq!(report.failed, 2);
    assert_eq!(report.liquidated, 0);
}
