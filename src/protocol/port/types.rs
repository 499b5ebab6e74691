use num_bigint::BigUint;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashSet;

use super::layout::{ByteReader, ByteWriter, COPTION_PUBKEY_LEN, PUBKEY_LEN};
use crate::core::error::{Error, Result};
use crate::utils::math::wad;

/// Port reserve account span.
pub const RESERVE_LEN: usize = 575;
const RESERVE_PADDING_LEN: usize = 212;

/// Port obligation account span.
pub const OBLIGATION_LEN: usize = 916;
pub const MAX_OBLIGATION_RESERVES: usize = 10;
pub const OBLIGATION_COLLATERAL_LEN: usize = 56;
pub const OBLIGATION_LIQUIDITY_LEN: usize = 80;
// Sized for one deposit and nine borrows.
const OBLIGATION_DATA_FLAT_LEN: usize =
    OBLIGATION_COLLATERAL_LEN + OBLIGATION_LIQUIDITY_LEN * (MAX_OBLIGATION_RESERVES - 1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LastUpdate {
    pub slot: u64,
    pub stale: bool,
}

impl LastUpdate {
    fn unpack(reader: &mut ByteReader<'_>) -> Result<Self> {
        Ok(LastUpdate {
            slot: reader.u64("last_update.slot")?,
            stale: reader.bool("last_update.stale")?,
        })
    }

    fn pack(&self, writer: &mut ByteWriter) {
        writer.u64(self.slot).bool(self.stale);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveLiquidity {
    pub mint: Pubkey,
    pub mint_decimals: u8,
    pub supply: Pubkey,
    pub fee_receiver: Pubkey,
    pub oracle: Option<Pubkey>,
    pub available_amount: u64,
    pub borrowed_amount_wads: u128,
    pub cumulative_borrow_rate_wads: u128,
    /// Embedded unit price, WAD-scaled.
    pub market_price: u128,
}

impl ReserveLiquidity {
    pub fn has_oracle(&self) -> bool {
        self.oracle.is_some()
    }

    /// Available plus borrowed liquidity, WAD-scaled.
    pub fn total_supply_wads(&self) -> BigUint {
        BigUint::from(self.available_amount) * wad() + BigUint::from(self.borrowed_amount_wads)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveCollateral {
    pub mint: Pubkey,
    pub mint_total_supply: u64,
    pub supply: Pubkey,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReserveConfig {
    pub optimal_utilization_rate: u8,
    pub loan_to_value_ratio: u8,
    pub liquidation_bonus: u8,
    /// Percentage of a deposit's value that counts as collateral.
    pub liquidation_threshold: u8,
    pub min_borrow_rate: u8,
    pub optimal_borrow_rate: u8,
    pub max_borrow_rate: u8,
    pub borrow_fee_wad: u64,
    pub flash_loan_fee_wad: u64,
    pub host_fee_percentage: u8,
    pub deposit_staking_pool: Option<Pubkey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reserve {
    pub address: Pubkey,
    pub version: u8,
    pub last_update: LastUpdate,
    pub lending_market: Pubkey,
    pub liquidity: ReserveLiquidity,
    pub collateral: ReserveCollateral,
    pub config: ReserveConfig,
}

impl Reserve {
    /// Strict decode. Wrong span is `Decode`, a zero last-update slot is `StaleData`.
    pub fn unpack(address: Pubkey, data: &[u8]) -> Result<Self> {
        if data.len() != RESERVE_LEN {
            return Err(Error::Decode(format!(
                "reserve {} has {} bytes, expected {}",
                address,
                data.len(),
                RESERVE_LEN
            )));
        }

        let mut reader = ByteReader::new(data);
        let version = reader.u8("version")?;
        let last_update = LastUpdate::unpack(&mut reader)?;
        let lending_market = reader.pubkey("lending_market")?;

        let liquidity = ReserveLiquidity {
            mint: reader.pubkey("liquidity.mint")?,
            mint_decimals: reader.u8("liquidity.mint_decimals")?,
            supply: reader.pubkey("liquidity.supply")?,
            fee_receiver: reader.pubkey("liquidity.fee_receiver")?,
            oracle: reader.coption_pubkey("liquidity.oracle")?,
            available_amount: reader.u64("liquidity.available_amount")?,
            borrowed_amount_wads: reader.u128("liquidity.borrowed_amount_wads")?,
            cumulative_borrow_rate_wads: reader.u128("liquidity.cumulative_borrow_rate_wads")?,
            market_price: reader.u128("liquidity.market_price")?,
        };

        let collateral = ReserveCollateral {
            mint: reader.pubkey("collateral.mint")?,
            mint_total_supply: reader.u64("collateral.mint_total_supply")?,
            supply: reader.pubkey("collateral.supply")?,
        };

        let config = ReserveConfig {
            optimal_utilization_rate: reader.u8("config.optimal_utilization_rate")?,
            loan_to_value_ratio: reader.u8("config.loan_to_value_ratio")?,
            liquidation_bonus: reader.u8("config.liquidation_bonus")?,
            liquidation_threshold: reader.u8("config.liquidation_threshold")?,
            min_borrow_rate: reader.u8("config.min_borrow_rate")?,
            optimal_borrow_rate: reader.u8("config.optimal_borrow_rate")?,
            max_borrow_rate: reader.u8("config.max_borrow_rate")?,
            borrow_fee_wad: reader.u64("config.fees.borrow_fee_wad")?,
            flash_loan_fee_wad: reader.u64("config.fees.flash_loan_fee_wad")?,
            host_fee_percentage: reader.u8("config.fees.host_fee_percentage")?,
            deposit_staking_pool: reader.coption_pubkey("config.deposit_staking_pool")?,
        };

        reader.skip(RESERVE_PADDING_LEN, "padding")?;

        if last_update.slot == 0 {
            return Err(Error::StaleData(address.to_string()));
        }

        Ok(Reserve {
            address,
            version,
            last_update,
            lending_market,
            liquidity,
            collateral,
            config,
        })
    }

    /// Lenient decode for snapshot scans: anything `unpack` rejects is absent.
    pub fn decode(address: Pubkey, data: &[u8]) -> Option<Self> {
        match Self::unpack(address, data) {
            Ok(reserve) => Some(reserve),
            Err(e) => {
                log::debug!("Skipping reserve {}: {}", address, e);
                None
            }
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(RESERVE_LEN);
        writer.u8(self.version);
        self.last_update.pack(&mut writer);
        writer.pubkey(&self.lending_market);

        let liquidity = &self.liquidity;
        writer
            .pubkey(&liquidity.mint)
            .u8(liquidity.mint_decimals)
            .pubkey(&liquidity.supply)
            .pubkey(&liquidity.fee_receiver)
            .coption_pubkey(liquidity.oracle.as_ref())
            .u64(liquidity.available_amount)
            .u128(liquidity.borrowed_amount_wads)
            .u128(liquidity.cumulative_borrow_rate_wads)
            .u128(liquidity.market_price);

        writer
            .pubkey(&self.collateral.mint)
            .u64(self.collateral.mint_total_supply)
            .pubkey(&self.collateral.supply);

        let config = &self.config;
        writer
            .u8(config.optimal_utilization_rate)
            .u8(config.loan_to_value_ratio)
            .u8(config.liquidation_bonus)
            .u8(config.liquidation_threshold)
            .u8(config.min_borrow_rate)
            .u8(config.optimal_borrow_rate)
            .u8(config.max_borrow_rate)
            .u64(config.borrow_fee_wad)
            .u64(config.flash_loan_fee_wad)
            .u8(config.host_fee_percentage)
            .coption_pubkey(config.deposit_staking_pool.as_ref());

        writer.zeros(RESERVE_PADDING_LEN);
        writer.into_vec()
    }

    pub fn staking_pool(&self) -> Option<Pubkey> {
        self.config.deposit_staking_pool
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObligationCollateral {
    pub deposit_reserve: Pubkey,
    pub deposited_amount: u64,
    pub market_value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObligationLiquidity {
    pub borrow_reserve: Pubkey,
    pub cumulative_borrow_rate_wads: u128,
    pub borrowed_amount_wads: u128,
    pub market_value: u128,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Obligation {
    pub address: Pubkey,
    pub version: u8,
    pub last_update: LastUpdate,
    pub lending_market: Pubkey,
    pub owner: Pubkey,
    pub deposits: Vec<ObligationCollateral>,
    pub borrows: Vec<ObligationLiquidity>,
    // Aggregates maintained on chain. Read for logging only.
    pub deposited_value: u128,
    pub borrowed_value: u128,
    pub allowed_borrow_value: u128,
    pub unhealthy_borrow_value: u128,
}

impl Obligation {
    pub fn unpack(address: Pubkey, data: &[u8]) -> Result<Self> {
        if data.len() != OBLIGATION_LEN {
            return Err(Error::Decode(format!(
                "obligation {} has {} bytes, expected {}",
                address,
                data.len(),
                OBLIGATION_LEN
            )));
        }

        let mut reader = ByteReader::new(data);
        let version = reader.u8("version")?;
        let last_update = LastUpdate::unpack(&mut reader)?;
        let lending_market = reader.pubkey("lending_market")?;
        let owner = reader.pubkey("owner")?;
        let deposited_value = reader.u128("deposited_value")?;
        let borrowed_value = reader.u128("borrowed_value")?;
        let allowed_borrow_value = reader.u128("allowed_borrow_value")?;
        let unhealthy_borrow_value = reader.u128("unhealthy_borrow_value")?;
        let deposits_len = reader.u8("deposits_len")? as usize;
        let borrows_len = reader.u8("borrows_len")? as usize;

        if deposits_len + borrows_len > MAX_OBLIGATION_RESERVES {
            return Err(Error::Decode(format!(
                "obligation {} lists {} deposits and {} borrows, max is {}",
                address, deposits_len, borrows_len, MAX_OBLIGATION_RESERVES
            )));
        }

        let flat = reader.rest();
        let mut flat_reader = ByteReader::new(flat);

        let mut deposits = Vec::with_capacity(deposits_len);
        for _ in 0..deposits_len {
            deposits.push(ObligationCollateral {
                deposit_reserve: flat_reader.pubkey("deposit.reserve")?,
                deposited_amount: flat_reader.u64("deposit.deposited_amount")?,
                market_value: flat_reader.u128("deposit.market_value")?,
            });
        }

        let mut borrows = Vec::with_capacity(borrows_len);
        for _ in 0..borrows_len {
            borrows.push(ObligationLiquidity {
                borrow_reserve: flat_reader.pubkey("borrow.reserve")?,
                cumulative_borrow_rate_wads: flat_reader.u128("borrow.cumulative_borrow_rate_wads")?,
                borrowed_amount_wads: flat_reader.u128("borrow.borrowed_amount_wads")?,
                market_value: flat_reader.u128("borrow.market_value")?,
            });
        }

        if last_update.slot == 0 {
            return Err(Error::StaleData(address.to_string()));
        }

        Ok(Obligation {
            address,
            version,
            last_update,
            lending_market,
            owner,
            deposits,
            borrows,
            deposited_value,
            borrowed_value,
            allowed_borrow_value,
            unhealthy_borrow_value,
        })
    }

    pub fn decode(address: Pubkey, data: &[u8]) -> Option<Self> {
        match Self::unpack(address, data) {
            Ok(obligation) => Some(obligation),
            Err(e) => {
                log::debug!("Skipping obligation {}: {}", address, e);
                None
            }
        }
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut writer = ByteWriter::with_capacity(OBLIGATION_LEN);
        writer.u8(self.version);
        self.last_update.pack(&mut writer);
        writer
            .pubkey(&self.lending_market)
            .pubkey(&self.owner)
            .u128(self.deposited_value)
            .u128(self.borrowed_value)
            .u128(self.allowed_borrow_value)
            .u128(self.unhealthy_borrow_value)
            .u8(self.deposits.len() as u8)
            .u8(self.borrows.len() as u8);

        for deposit in &self.deposits {
            writer
                .pubkey(&deposit.deposit_reserve)
                .u64(deposit.deposited_amount)
                .u128(deposit.market_value);
        }
        for borrow in &self.borrows {
            writer
                .pubkey(&borrow.borrow_reserve)
                .u128(borrow.cumulative_borrow_rate_wads)
                .u128(borrow.borrowed_amount_wads)
                .u128(borrow.market_value);
        }

        let remaining = OBLIGATION_LEN.saturating_sub(writer.len());
        writer.zeros(remaining);
        writer.into_vec()
    }

    pub fn deposit_reserves(&self) -> impl Iterator<Item = &Pubkey> + '_ {
        self.deposits.iter().map(|d| &d.deposit_reserve)
    }

    pub fn borrow_reserves(&self) -> impl Iterator<Item = &Pubkey> + '_ {
        self.borrows.iter().map(|b| &b.borrow_reserve)
    }

    /// Distinct reserves referenced by deposits then borrows, in first-seen order.
    pub fn distinct_reserves(&self) -> Vec<Pubkey> {
        let mut seen = HashSet::new();
        self.deposit_reserves()
            .chain(self.borrow_reserves())
            .filter(|reserve| seen.insert(**reserve))
            .copied()
            .collect()
    }
}

// Header: version, last_update, lending_market, owner, four values, two lengths.
const OBLIGATION_HEADER_LEN: usize = 1 + 9 + PUBKEY_LEN * 2 + 16 * 4 + 2;
const _: () = assert!(OBLIGATION_HEADER_LEN + OBLIGATION_DATA_FLAT_LEN == OBLIGATION_LEN);
const _: () = assert!(
    1 + 9 + PUBKEY_LEN + (PUBKEY_LEN + 1 + PUBKEY_LEN * 2 + COPTION_PUBKEY_LEN + 8 + 16 * 3)
        + (PUBKEY_LEN + 8 + PUBKEY_LEN)
        + (7 + 8 + 8 + 1 + COPTION_PUBKEY_LEN)
        + RESERVE_PADDING_LEN
        == RESERVE_LEN
);
