//! In-memory `ChainClient` and account fixtures shared by the integration tests.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use solana_client::rpc_filter::RpcFilterType;
use solana_sdk::{
    account::Account,
    hash::Hash,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    transaction::Transaction,
};
use spl_associated_token_account::get_associated_token_address;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use port_liquidator::config::Config;
use port_liquidator::executor::Liquidator;
use port_liquidator::port::{
    LastUpdate, Obligation, ObligationCollateral, ObligationLiquidity, Reserve, ReserveCollateral,
    ReserveConfig, ReserveLiquidity,
};
use port_liquidator::rpc_client::ChainClient;
use port_liquidator::wallet_cache::encode_token_account;

pub const WAD: u128 = 1_000_000_000_000_000_000;
pub const TOKEN_ACCOUNT_RENT: u64 = 2_039_280;

#[derive(Default)]
struct MockState {
    accounts: HashMap<Pubkey, Account>,
    program_accounts: HashMap<Pubkey, Vec<(Pubkey, Account)>>,
    balances: HashMap<Pubkey, u64>,
    sent: Vec<Transaction>,
    fail_program_accounts: bool,
    fail_multiple_accounts: bool,
    fail_reads_after_send: bool,
    fail_sends: bool,
    // Transactions mentioning any of these keys are rejected.
    rejected_keys: HashSet<Pubkey>,
}

/// Serves canned accounts and records every transaction it accepts.
#[derive(Default)]
pub struct MockChainClient {
    state: Mutex<MockState>,
}

impl MockChainClient {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    pub fn add_account(&self, address: Pubkey, account: Account) {
        self.state().accounts.insert(address, account);
    }

    /// Registers an account both as a plain account and under its owner program.
    pub fn add_program_account(&self, address: Pubkey, account: Account) {
        let mut state = self.state();
        state.accounts.insert(address, account.clone());
        state
            .program_accounts
            .entry(account.owner)
            .or_default()
            .push((address, account));
    }

    pub fn add_reserve(&self, program_id: &Pubkey, reserve: &Reserve) {
        self.add_program_account(reserve.address, account(*program_id, reserve.pack()));
    }

    pub fn add_obligation(&self, program_id: &Pubkey, obligation: &Obligation) {
        self.add_program_account(obligation.address, account(*program_id, obligation.pack()));
    }

    /// Creates `owner`'s associated token account for `mint`.
    pub fn add_token_wallet(&self, owner: &Pubkey, mint: &Pubkey, amount: u64) -> Pubkey {
        let address = get_associated_token_address(owner, mint);
        self.add_account(
            address,
            Account {
                lamports: TOKEN_ACCOUNT_RENT,
                data: encode_token_account(mint, owner, amount).expect("token account packs"),
                owner: spl_token::id(),
                executable: false,
                rent_epoch: 0,
            },
        );
        address
    }

    pub fn set_balance(&self, address: &Pubkey, lamports: u64) {
        self.state().balances.insert(*address, lamports);
    }

    pub fn fail_program_accounts(&self) {
        self.state().fail_program_accounts = true;
    }

    pub fn fail_multiple_accounts(&self) {
        self.state().fail_multiple_accounts = true;
    }

    /// Single-account reads start failing once a transaction has been accepted.
    pub fn fail_reads_after_send(&self) {
        self.state().fail_reads_after_send = true;
    }

    pub fn fail_sends(&self) {
        self.state().fail_sends = true;
    }

    pub fn reject_transactions_touching(&self, key: Pubkey) {
        self.state().rejected_keys.insert(key);
    }

    pub fn sent(&self) -> Vec<Transaction> {
        self.state().sent.clone()
    }
}

fn filter_allows(filter: &RpcFilterType, data: &[u8]) -> bool {
    match filter {
        RpcFilterType::DataSize(size) => data.len() as u64 == *size,
        RpcFilterType::Memcmp(memcmp) => memcmp.bytes_match(data),
        _ => true,
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        let state = self.state();
        if state.fail_reads_after_send && !state.sent.is_empty() {
            return Err(anyhow!("rpc timeout"));
        }
        Ok(state.accounts.get(address).cloned())
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        let state = self.state();
        if state.fail_multiple_accounts {
            return Err(anyhow!("getMultipleAccounts unavailable"));
        }
        Ok(addresses
            .iter()
            .map(|address| state.accounts.get(address).cloned())
            .collect())
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Account)>> {
        let state = self.state();
        if state.fail_program_accounts {
            return Err(anyhow!("getProgramAccounts unavailable"));
        }
        Ok(state
            .program_accounts
            .get(program_id)
            .map(|accounts| {
                accounts
                    .iter()
                    .filter(|(_, account)| filters.iter().all(|f| filter_allows(f, &account.data)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        Ok(self.state().balances.get(address).copied().unwrap_or(0))
    }

    async fn get_minimum_balance_for_rent_exemption(&self, _data_len: usize) -> Result<u64> {
        Ok(TOKEN_ACCOUNT_RENT)
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        Ok(Hash::new_unique())
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        let mut state = self.state();
        if state.fail_sends {
            return Err(anyhow!("transaction simulation failed"));
        }
        if transaction
            .message
            .account_keys
            .iter()
            .any(|key| state.rejected_keys.contains(key))
        {
            return Err(anyhow!("custom program error: 0x10"));
        }
        state.sent.push(transaction.clone());
        Ok(transaction.signatures.first().copied().unwrap_or_default())
    }
}

pub fn account(owner: Pubkey, data: Vec<u8>) -> Account {
    Account {
        lamports: 1_000_000,
        data,
        owner,
        executable: false,
        rent_epoch: 0,
    }
}

/// A reserve priced at 1.00 with six decimals and no oracle.
pub fn reserve(lending_market: Pubkey, available: u64, collateral_supply: u64, threshold: u8) -> Reserve {
    Reserve {
        address: Pubkey::new_unique(),
        version: 1,
        last_update: LastUpdate { slot: 100, stale: false },
        lending_market,
        liquidity: ReserveLiquidity {
            mint: Pubkey::new_unique(),
            mint_decimals: 6,
            supply: Pubkey::new_unique(),
            fee_receiver: Pubkey::new_unique(),
            oracle: None,
            available_amount: available,
            borrowed_amount_wads: 0,
            cumulative_borrow_rate_wads: WAD,
            market_price: WAD,
        },
        collateral: ReserveCollateral {
            mint: Pubkey::new_unique(),
            mint_total_supply: collateral_supply,
            supply: Pubkey::new_unique(),
        },
        config: ReserveConfig {
            optimal_utilization_rate: 80,
            loan_to_value_ratio: 75,
            liquidation_bonus: 5,
            liquidation_threshold: threshold,
            min_borrow_rate: 0,
            optimal_borrow_rate: 8,
            max_borrow_rate: 40,
            borrow_fee_wad: 0,
            flash_loan_fee_wad: 0,
            host_fee_percentage: 20,
            deposit_staking_pool: None,
        },
    }
}

/// Borrowed amounts are whole token base units, lifted to WAD.
pub fn obligation(
    lending_market: Pubkey,
    deposits: &[(Pubkey, u64)],
    borrows: &[(Pubkey, u64)],
) -> Obligation {
    Obligation {
        address: Pubkey::new_unique(),
        version: 1,
        last_update: LastUpdate { slot: 100, stale: false },
        lending_market,
        owner: Pubkey::new_unique(),
        deposits: deposits
            .iter()
            .map(|(reserve, amount)| ObligationCollateral {
                deposit_reserve: *reserve,
                deposited_amount: *amount,
                market_value: 0,
            })
            .collect(),
        borrows: borrows
            .iter()
            .map(|(reserve, amount)| ObligationLiquidity {
                borrow_reserve: *reserve,
                cumulative_borrow_rate_wads: WAD,
                borrowed_amount_wads: *amount as u128 * WAD,
                market_value: 0,
            })
            .collect(),
        deposited_value: 0,
        borrowed_value: 0,
        allowed_borrow_value: 0,
        unhealthy_borrow_value: 0,
    }
}

pub fn test_config(dry_run: bool) -> Config {
    Config {
        dry_run,
        keypair_path: "unused".to_string(),
        ..Config::default()
    }
}

pub fn liquidator(client: Arc<MockChainClient>, agent: Arc<Keypair>, config: Config) -> Liquidator<MockChainClient> {
    Liquidator::new(client, agent, config)
}

/// Market X (collateral, 90%) and Y (debt, 80%), both 1.00 with six decimals,
/// registered with the mock along with the agent's wallets for them.
pub struct Market {
    pub client: Arc<MockChainClient>,
    pub agent: Arc<Keypair>,
    pub program_id: Pubkey,
    pub lending_market: Pubkey,
    pub x: Reserve,
    pub y: Reserve,
}

impl Market {
    pub fn new() -> Self {
        let client = Arc::new(MockChainClient::new());
        let agent = Arc::new(Keypair::new());
        let program_id = Config::default().lending_program_id;
        let lending_market = Pubkey::new_unique();

        let x = reserve(lending_market, 1_000_000, 1_000_000, 90);
        let y = reserve(lending_market, 5_000_000, 5_000_000, 80);
        client.add_reserve(&program_id, &x);
        client.add_reserve(&program_id, &y);

        Market {
            client,
            agent,
            program_id,
            lending_market,
            x,
            y,
        }
    }

    pub fn agent_key(&self) -> Pubkey {
        solana_sdk::signature::Signer::pubkey(self.agent.as_ref())
    }

    /// Agent holds `debt` units of Y and empty X wallets, enough to liquidate X collateral.
    pub fn fund_agent(&self, debt: u64) {
        let agent = self.agent_key();
        self.client.add_token_wallet(&agent, &self.y.liquidity.mint, debt);
        self.client.add_token_wallet(&agent, &self.x.collateral.mint, 0);
        self.client.add_token_wallet(&agent, &self.x.liquidity.mint, 0);
    }

    /// Deposits 1.0 X and borrows `borrow` base units of Y.
    pub fn open(&self, borrow: u64) -> Obligation {
        let obligation = obligation(
            self.lending_market,
            &[(self.x.address, 1_000_000)],
            &[(self.y.address, borrow)],
        );
        self.client.add_obligation(&self.program_id, &obligation);
        obligation
    }
}

/// A compiled instruction with its indexes resolved against the message keys.
#[derive(Debug, Clone)]
pub struct SentInstruction {
    pub program_id: Pubkey,
    pub accounts: Vec<Pubkey>,
    pub data: Vec<u8>,
}

pub fn sent_instructions(transaction: &Transaction) -> Vec<SentInstruction> {
    let keys = &transaction.message.account_keys;
    transaction
        .message
        .instructions
        .iter()
        .map(|ix| SentInstruction {
            program_id: keys[ix.program_id_index as usize],
            accounts: ix.accounts.iter().map(|index| keys[*index as usize]).collect(),
            data: ix.data.clone(),
        })
        .collect()
}

/// Registers `owner`'s stake sub-account in `pool` under the staking program.
pub fn add_stake_account(client: &MockChainClient, staking_program: &Pubkey, owner: &Pubkey, pool: &Pubkey) -> Pubkey {
    let mut data = vec![0u8; 233];
    data[0] = 1;
    data[17..49].copy_from_slice(owner.as_ref());
    data[49..81].copy_from_slice(pool.as_ref());
    let address = Pubkey::new_unique();
    client.add_program_account(address, account(*staking_program, data));
    address
}
