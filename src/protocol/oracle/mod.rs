pub mod pyth;
pub mod switchboard;

use num_bigint::BigUint;
use solana_sdk::{account::Account, pubkey::Pubkey};
use std::collections::HashMap;

use crate::blockchain::rpc_client::ChainClient;
use crate::core::config::Config;
use crate::core::error::{Error, Result};
use crate::core::registry::ProgramIds;
use crate::protocol::port::Reserve;
use crate::utils::math::{pow10, rescale, WAD_DECIMALS};

/// A unit price as a fixed-point integer: `value / 10^scale`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Price {
    pub value: BigUint,
    pub scale: u32,
}

impl Price {
    pub fn from_wad(value: u128) -> Self {
        Price {
            value: BigUint::from(value),
            scale: WAD_DECIMALS,
        }
    }

    /// `mantissa × 10^expo`.
    pub fn from_mantissa(mantissa: u64, expo: i32) -> Self {
        if expo >= 0 {
            Price {
                value: BigUint::from(mantissa) * pow10(expo.unsigned_abs()),
                scale: 0,
            }
        } else {
            Price {
                value: BigUint::from(mantissa),
                scale: expo.unsigned_abs(),
            }
        }
    }

    pub fn to_wad(&self) -> BigUint {
        rescale(&self.value, self.scale, WAD_DECIMALS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceSource {
    Embedded,
    Pyth,
    SwitchboardFallback,
}

/// What the valuation engine consumes per reserve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPrice {
    pub price: Price,
    pub decimals: u8,
    pub source: PriceSource,
}

impl ResolvedPrice {
    fn embedded(reserve: &Reserve, source: PriceSource) -> Self {
        ResolvedPrice {
            price: Price::from_wad(reserve.liquidity.market_price),
            decimals: reserve.liquidity.mint_decimals,
            source,
        }
    }

    pub fn wad(&self) -> BigUint {
        self.price.to_wad()
    }
}

/// Owner programs that identify each oracle family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OraclePrograms {
    pub pyth: Pubkey,
    pub switchboard: Pubkey,
}

impl Default for OraclePrograms {
    fn default() -> Self {
        OraclePrograms {
            pyth: ProgramIds::PYTH_ID,
            switchboard: ProgramIds::SWITCHBOARD_V1_ID,
        }
    }
}

impl OraclePrograms {
    pub fn from_config(config: &Config) -> Self {
        OraclePrograms {
            pyth: config.pyth_program_id,
            switchboard: config.switchboard_program_id,
        }
    }
}

/// Prices for one cycle. Reserves in `failures` are excluded along with every
/// obligation that touches them.
#[derive(Debug, Default)]
pub struct PriceBook {
    pub prices: HashMap<Pubkey, ResolvedPrice>,
    pub failures: HashMap<Pubkey, Error>,
}

impl PriceBook {
    pub fn get(&self, reserve: &Pubkey) -> Option<&ResolvedPrice> {
        self.prices.get(reserve)
    }

    pub fn failure(&self, reserve: &Pubkey) -> Option<&Error> {
        self.failures.get(reserve)
    }

    pub fn insert(&mut self, reserve: Pubkey, outcome: Result<ResolvedPrice>) {
        match outcome {
            Ok(price) => {
                self.prices.insert(reserve, price);
            }
            Err(e) => {
                self.failures.insert(reserve, e);
            }
        }
    }
}

/// Price a reserve from its already-fetched oracle account.
pub fn price_from_oracle_account(
    reserve: &Reserve,
    account: Option<&Account>,
    programs: &OraclePrograms,
) -> Result<ResolvedPrice> {
    let oracle = match reserve.liquidity.oracle {
        Some(oracle) => oracle,
        None => return Ok(ResolvedPrice::embedded(reserve, PriceSource::Embedded)),
    };

    let account = account.ok_or_else(|| {
        Error::Decode(format!(
            "oracle account {} for reserve {} does not exist",
            oracle, reserve.address
        ))
    })?;

    if account.owner == programs.pyth {
        Ok(ResolvedPrice {
            price: pyth::parse_price(&oracle, &account.data)?,
            decimals: reserve.liquidity.mint_decimals,
            source: PriceSource::Pyth,
        })
    } else if account.owner == programs.switchboard {
        switchboard::check_record(&oracle, &account.data)?;
        Ok(ResolvedPrice::embedded(reserve, PriceSource::SwitchboardFallback))
    } else {
        Err(Error::UnrecognizedOracle {
            reserve: reserve.address,
            oracle,
            owner: account.owner,
        })
    }
}

pub struct PriceResolver<'a, C: ChainClient + ?Sized> {
    client: &'a C,
    programs: OraclePrograms,
}

impl<'a, C: ChainClient + ?Sized> PriceResolver<'a, C> {
    pub fn new(client: &'a C, programs: OraclePrograms) -> Self {
        PriceResolver { client, programs }
    }

    pub async fn resolve(&self, reserve: &Reserve) -> Result<ResolvedPrice> {
        let account = match &reserve.liquidity.oracle {
            Some(oracle) => self
                .client
                .get_account(oracle)
                .await
                .map_err(|e| Error::Rpc(e.to_string()))?,
            None => None,
        };
        price_from_oracle_account(reserve, account.as_ref(), &self.programs)
    }

    /// One batched oracle fetch for the whole snapshot. If the batch itself fails,
    /// every oracle-backed reserve is marked failed and the rest still price.
    pub async fn resolve_all<'r, I>(&self, reserves: I) -> PriceBook
    where
        I: IntoIterator<Item = &'r Reserve>,
    {
        let reserves: Vec<&Reserve> = reserves.into_iter().collect();
        let mut book = PriceBook::default();

        let oracle_backed: Vec<&Reserve> = reserves
            .iter()
            .copied()
            .filter(|reserve| reserve.liquidity.has_oracle())
            .collect();
        let oracle_keys: Vec<Pubkey> = oracle_backed
            .iter()
            .filter_map(|reserve| reserve.liquidity.oracle)
            .collect();

        for reserve in reserves.iter().filter(|reserve| !reserve.liquidity.has_oracle()) {
            book.insert(
                reserve.address,
                price_from_oracle_account(reserve, None, &self.programs),
            );
        }

        if oracle_keys.is_empty() {
            return book;
        }

        match self.client.get_multiple_accounts(&oracle_keys).await {
            Ok(accounts) => {
                for (index, reserve) in oracle_backed.iter().enumerate() {
                    let account = accounts.get(index).and_then(|account| account.as_ref());
                    let outcome = price_from_oracle_account(reserve, account, &self.programs);
                    match &outcome {
                        Ok(price) => log::debug!(
                            "Reserve {} priced from {:?}: {} (scale {})",
                            reserve.address,
                            price.source,
                            price.price.value,
                            price.price.scale
                        ),
                        Err(e) => log::warn!("Reserve {} excluded this cycle: {}", reserve.address, e),
                    }
                    book.insert(reserve.address, outcome);
                }
            }
            Err(e) => {
                log::error!("Oracle batch fetch failed for {} accounts: {}", oracle_keys.len(), e);
                for reserve in oracle_backed {
                    book.insert(reserve.address, Err(Error::Rpc(e.to_string())));
                }
            }
        }

        book
    }
}
