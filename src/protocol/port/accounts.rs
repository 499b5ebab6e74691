use solana_client::rpc_filter::{Memcmp, RpcFilterType};
use solana_sdk::pubkey::Pubkey;

use super::types::{OBLIGATION_LEN, RESERVE_LEN};

/// Staking sub-account span in the Port staking program.
pub const STAKE_ACCOUNT_LEN: u64 = 233;
const STAKE_ACCOUNT_OWNER_OFFSET: usize = 1 + 16;
const STAKE_ACCOUNT_POOL_OFFSET: usize = 1 + 16 + 32;

/// PDA that signs for the lending market's token accounts.
pub fn derive_lending_market_authority(lending_market: &Pubkey, program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[lending_market.as_ref()], program_id).0
}

pub fn reserve_filters() -> Vec<RpcFilterType> {
    vec![RpcFilterType::DataSize(RESERVE_LEN as u64)]
}

pub fn obligation_filters() -> Vec<RpcFilterType> {
    vec![RpcFilterType::DataSize(OBLIGATION_LEN as u64)]
}

/// Filters selecting `owner`'s stake account in `staking_pool`.
pub fn stake_account_filters(owner: &Pubkey, staking_pool: &Pubkey) -> Vec<RpcFilterType> {
    vec![
        RpcFilterType::DataSize(STAKE_ACCOUNT_LEN),
        RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            STAKE_ACCOUNT_OWNER_OFFSET,
            owner.to_bytes().to_vec(),
        )),
        RpcFilterType::Memcmp(Memcmp::new_raw_bytes(
            STAKE_ACCOUNT_POOL_OFFSET,
            staking_pool.to_bytes().to_vec(),
        )),
    ]
}
