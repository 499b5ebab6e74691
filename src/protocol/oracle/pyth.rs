//! Pyth v2 price accounts, loaded through `pyth-sdk-solana`.

use pyth_sdk_solana::state::{load_price_account, PriceStatus, SolanaPriceAccount};
use solana_sdk::pubkey::Pubkey;

use super::Price;
use crate::core::error::{Error, Result};

/// Size of a v2 price account with its 32 publisher slots.
pub const PYTH_PRICE_ACCOUNT_LEN: usize = std::mem::size_of::<SolanaPriceAccount>();

/// Checks magic, version and account type, and borrows the account in place.
pub fn load<'a>(oracle: &Pubkey, data: &'a [u8]) -> Result<&'a SolanaPriceAccount> {
    if data.len() < PYTH_PRICE_ACCOUNT_LEN {
        return Err(Error::Decode(format!(
            "pyth account {} has {} bytes, need at least {}",
            oracle,
            data.len(),
            PYTH_PRICE_ACCOUNT_LEN
        )));
    }
    load_price_account::<32, ()>(data)
        .map_err(|e| Error::Decode(format!("Failed to parse Pyth account {}: {}", oracle, e)))
}

/// Price = mantissa × 10^expo. Only a positive aggregate in trading status is accepted.
pub fn parse_price(oracle: &Pubkey, data: &[u8]) -> Result<Price> {
    let account = load(oracle, data)?;
    let agg = account.agg;

    if agg.status != PriceStatus::Trading {
        return Err(Error::InvalidOraclePrice {
            oracle: *oracle,
            reason: format!("aggregate status {:?} is not trading", agg.status),
        });
    }
    if agg.price <= 0 {
        return Err(Error::InvalidOraclePrice {
            oracle: *oracle,
            reason: format!("non-positive aggregate price {}", agg.price),
        });
    }

    log::debug!(
        "pyth {}: price={} conf={} expo={}",
        oracle,
        agg.price,
        agg.conf,
        account.expo
    );
    Ok(Price::from_mantissa(agg.price as u64, account.expo))
}

/// Serializes a price account holding only the aggregate. Used by fixtures.
pub fn encode_price_account(price: i64, conf: u64, expo: i32, status: PriceStatus) -> Vec<u8> {
    let mut account: SolanaPriceAccount = bytemuck::Zeroable::zeroed();
    account.magic = pyth_sdk_solana::state::MAGIC;
    account.ver = pyth_sdk_solana::state::VERSION_2;
    account.atype = pyth_sdk_solana::state::AccountType::Price as u32;
    account.expo = expo;
    account.agg.price = price;
    account.agg.conf = conf;
    account.agg.status = status;
    bytemuck::bytes_of(&account).to_vec()
}
