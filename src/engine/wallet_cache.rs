//! The agent's token wallets, keyed by mint.
//!
//! Rebuilt at the start of every cycle. Within a cycle it only changes when a
//! liquidation moves a balance and the affected mint is re-read.

use anyhow::{Context, Result};
use solana_sdk::{account::Account, pubkey::Pubkey};
use spl_associated_token_account::get_associated_token_address;
use spl_token::solana_program::program_pack::Pack;
use std::collections::{HashMap, HashSet};

use crate::blockchain::rpc_client::ChainClient;
use crate::protocol::port::Reserve;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenWallet {
    pub address: Pubkey,
    pub mint: Pubkey,
    pub amount: u64,
}

#[derive(Debug, Clone)]
pub struct WalletCache {
    owner: Pubkey,
    wallets: HashMap<Pubkey, TokenWallet>,
}

impl WalletCache {
    pub fn new(owner: Pubkey) -> Self {
        WalletCache {
            owner,
            wallets: HashMap::new(),
        }
    }

    /// Liquidity and collateral-share mints of every reserve, first-seen order.
    pub fn reserve_mints<'r, I>(reserves: I) -> Vec<Pubkey>
    where
        I: IntoIterator<Item = &'r Reserve>,
    {
        let mut seen = HashSet::new();
        reserves
            .into_iter()
            .flat_map(|reserve| [reserve.liquidity.mint, reserve.collateral.mint])
            .filter(|mint| seen.insert(*mint))
            .collect()
    }

    /// Reads the owner's associated token account for each mint in one batch.
    pub async fn build<C: ChainClient + ?Sized>(
        client: &C,
        owner: Pubkey,
        mints: &[Pubkey],
    ) -> Result<Self> {
        let mut cache = WalletCache::new(owner);
        let addresses: Vec<Pubkey> = mints
            .iter()
            .map(|mint| get_associated_token_address(&owner, mint))
            .collect();

        let accounts = client
            .get_multiple_accounts(&addresses)
            .await
            .context("Failed to fetch agent token wallets")?;

        let mut missing = 0usize;
        for ((mint, address), account) in mints.iter().zip(&addresses).zip(&accounts) {
            match account.as_ref().and_then(|account| decode_token_account(address, account)) {
                Some(wallet) if wallet.mint == *mint => {
                    cache.insert(wallet);
                }
                _ => missing += 1,
            }
        }

        if missing > 0 {
            log::warn!(
                "WalletCache: {} of {} mints have no token wallet for {}",
                missing,
                mints.len(),
                owner
            );
        }
        log::debug!("WalletCache: loaded {} wallets", cache.len());

        Ok(cache)
    }

    /// Re-reads one mint's wallet after a balance change.
    pub async fn refresh<C: ChainClient + ?Sized>(
        &mut self,
        client: &C,
        mint: &Pubkey,
    ) -> Result<Option<TokenWallet>> {
        let address = get_associated_token_address(&self.owner, mint);
        let account = client
            .get_account(&address)
            .await
            .with_context(|| format!("Failed to refresh wallet {} for mint {}", address, mint))?;

        match account.as_ref().and_then(|account| decode_token_account(&address, account)) {
            Some(wallet) => {
                self.insert(wallet);
                Ok(Some(wallet))
            }
            None => {
                self.wallets.remove(mint);
                Ok(None)
            }
        }
    }

    pub fn insert(&mut self, wallet: TokenWallet) {
        self.wallets.insert(wallet.mint, wallet);
    }

    pub fn get(&self, mint: &Pubkey) -> Option<&TokenWallet> {
        self.wallets.get(mint)
    }

    pub fn balance(&self, mint: &Pubkey) -> u64 {
        self.get(mint).map(|wallet| wallet.amount).unwrap_or(0)
    }

    pub fn owner(&self) -> &Pubkey {
        &self.owner
    }

    pub fn iter(&self) -> impl Iterator<Item = &TokenWallet> + '_ {
        self.wallets.values()
    }

    pub fn len(&self) -> usize {
        self.wallets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }
}

fn decode_token_account(address: &Pubkey, account: &Account) -> Option<TokenWallet> {
    match spl_token::state::Account::unpack(&account.data) {
        Ok(token) => Some(TokenWallet {
            address: *address,
            mint: token.mint,
            amount: token.amount,
        }),
        Err(e) => {
            log::debug!("WalletCache: {} is not a token account: {}", address, e);
            None
        }
    }
}

/// Packed SPL token account image. Used by tests and fixtures.
pub fn encode_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> Result<Vec<u8>> {
    let token = spl_token::state::Account {
        mint: *mint,
        owner: *owner,
        amount,
        state: spl_token::state::AccountState::Initialized,
        ..Default::default()
    };
    let mut data = vec![0u8; spl_token::state::Account::LEN];
    spl_token::state::Account::pack(token, &mut data)
        .with_context(|| format!("Failed to pack token account for mint {}", mint))?;
    Ok(data)
}
