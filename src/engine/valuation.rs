//! Loan value, threshold-weighted collateral value and risk factor per obligation.
//!
//! Values are WAD-scaled quote amounts held in `BigUint`. A risk factor of
//! `WAD` (1.0) or more marks the obligation as liquidatable.

use num_bigint::BigUint;
use num_traits::Zero;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::fmt;

use crate::core::error::{Error, Result};
use crate::core::types::AssetNames;
use crate::protocol::oracle::{PriceBook, ResolvedPrice};
use crate::protocol::port::{Obligation, Reserve};
use crate::utils::math::{format_wad, pow10, wad, wad_ratio};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipReason {
    NoBorrows,
    /// One deposit and one borrow on the same reserve.
    SelfReferential,
    /// Borrows without any collateral left.
    NoDeposits,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoBorrows => write!(f, "no borrows"),
            SkipReason::SelfReferential => write!(f, "self-referential pair"),
            SkipReason::NoDeposits => write!(f, "borrows without deposits"),
        }
    }
}

/// Obligations that are never worth valuing.
pub fn prefilter(obligation: &Obligation) -> Option<SkipReason> {
    if obligation.borrows.is_empty() {
        return Some(SkipReason::NoBorrows);
    }
    if obligation.deposits.is_empty() {
        return Some(SkipReason::NoDeposits);
    }
    if obligation.deposits.len() == 1
        && obligation.borrows.len() == 1
        && obligation.deposits[0].deposit_reserve == obligation.borrows[0].borrow_reserve
    {
        return Some(SkipReason::SelfReferential);
    }
    None
}

#[derive(Debug, Clone)]
pub struct EnrichedObligation {
    pub obligation: Obligation,
    pub loan_value: BigUint,
    pub collateral_value: BigUint,
    /// loan / collateral as a WAD value, zero when either side is zero.
    pub risk_factor: BigUint,
    /// Per-leg values, aligned with `obligation.borrows` / `obligation.deposits`.
    pub borrow_values: Vec<BigUint>,
    pub deposit_values: Vec<BigUint>,
    pub borrowed_assets: Vec<String>,
    pub deposited_assets: Vec<String>,
}

impl EnrichedObligation {
    pub fn is_liquidatable(&self) -> bool {
        self.risk_factor >= wad()
    }

    pub fn address(&self) -> &Pubkey {
        &self.obligation.address
    }

    pub fn summary(&self) -> String {
        format!(
            "loan={} collateral={} risk={} borrowed=[{}] deposited=[{}] {}",
            format_wad(&self.loan_value, 4),
            format_wad(&self.collateral_value, 4),
            format_wad(&self.risk_factor, 4),
            self.borrowed_assets.join(","),
            self.deposited_assets.join(","),
            self.obligation.address
        )
    }
}

/// Outcome of valuing one snapshot.
#[derive(Debug, Default)]
pub struct ValuationReport {
    /// Evaluated obligations, highest risk first.
    pub ranked: Vec<EnrichedObligation>,
    pub skipped: HashMap<SkipReason, usize>,
    /// Obligations dropped over a missing or unpriced reserve.
    pub excluded: usize,
}

impl ValuationReport {
    pub fn candidates(&self) -> usize {
        self.ranked.len()
    }

    pub fn liquidatable(&self) -> impl Iterator<Item = &EnrichedObligation> + '_ {
        self.ranked.iter().filter(|enriched| enriched.is_liquidatable())
    }
}

pub struct ValuationEngine<'a> {
    reserves: &'a HashMap<Pubkey, Reserve>,
    prices: &'a PriceBook,
    names: &'a AssetNames,
}

impl<'a> ValuationEngine<'a> {
    pub fn new(
        reserves: &'a HashMap<Pubkey, Reserve>,
        prices: &'a PriceBook,
        names: &'a AssetNames,
    ) -> Self {
        ValuationEngine {
            reserves,
            prices,
            names,
        }
    }

    fn leg(&self, obligation: &Obligation, address: &Pubkey) -> Result<(&'a Reserve, &'a ResolvedPrice)> {
        let reserve = self.reserves.get(address).ok_or(Error::MissingReserve {
            obligation: obligation.address,
            reserve: *address,
        })?;
        let price = self.prices.get(address).ok_or(Error::UnpricedReserve {
            obligation: obligation.address,
            reserve: *address,
        })?;
        Ok((reserve, price))
    }

    /// Values one obligation. Pre-filters are not applied here.
    pub fn evaluate(&self, obligation: &Obligation) -> Result<EnrichedObligation> {
        let mut borrow_values = Vec::with_capacity(obligation.borrows.len());
        for borrow in &obligation.borrows {
            let (_, price) = self.leg(obligation, &borrow.borrow_reserve)?;
            borrow_values.push(borrow_value(borrow.borrowed_amount_wads, price));
        }

        let mut deposit_values = Vec::with_capacity(obligation.deposits.len());
        for deposit in &obligation.deposits {
            let (reserve, price) = self.leg(obligation, &deposit.deposit_reserve)?;
            deposit_values.push(collateral_value(deposit.deposited_amount, reserve, price));
        }

        let loan_value: BigUint = borrow_values.iter().sum();
        let collateral_value: BigUint = deposit_values.iter().sum();
        let risk_factor = risk_factor(&loan_value, &collateral_value);

        Ok(EnrichedObligation {
            obligation: obligation.clone(),
            loan_value,
            collateral_value,
            risk_factor,
            borrow_values,
            deposit_values,
            borrowed_assets: obligation
                .borrow_reserves()
                .map(|reserve| self.names.name(reserve).to_string())
                .collect(),
            deposited_assets: obligation
                .deposit_reserves()
                .map(|reserve| self.names.name(reserve).to_string())
                .collect(),
        })
    }

    /// Pre-filter, value and rank a whole snapshot.
    pub fn evaluate_all<'o, I>(&self, obligations: I) -> ValuationReport
    where
        I: IntoIterator<Item = &'o Obligation>,
    {
        let mut report = ValuationReport::default();

        for obligation in obligations {
            if let Some(reason) = prefilter(obligation) {
                *report.skipped.entry(reason).or_insert(0) += 1;
                continue;
            }
            match self.evaluate(obligation) {
                Ok(enriched) => report.ranked.push(enriched),
                Err(e) => {
                    log::debug!("Skipping obligation {}: {}", obligation.address, e);
                    report.excluded += 1;
                }
            }
        }

        report
            .ranked
            .sort_by(|a, b| b.risk_factor.cmp(&a.risk_factor));
        report
    }
}

/// borrowed_wads × price / WAD / 10^decimals
pub fn borrow_value(borrowed_amount_wads: u128, price: &ResolvedPrice) -> BigUint {
    BigUint::from(borrowed_amount_wads) * price.wad() / wad() / pow10(price.decimals as u32)
}

/// Share of the reserve's total liquidity the deposit represents, priced and
/// weighted by the liquidation threshold. A division happens once at the end.
pub fn collateral_value(deposited_amount: u64, reserve: &Reserve, price: &ResolvedPrice) -> BigUint {
    let collateral_supply = reserve.collateral.mint_total_supply;
    if collateral_supply == 0 {
        return BigUint::zero();
    }

    let numerator = BigUint::from(deposited_amount)
        * reserve.liquidity.total_supply_wads()
        * price.wad()
        * BigUint::from(reserve.config.liquidation_threshold);
    let denominator = BigUint::from(collateral_supply)
        * wad()
        * BigUint::from(100u32)
        * pow10(price.decimals as u32);
    numerator / denominator
}

pub fn risk_factor(loan_value: &BigUint, collateral_value: &BigUint) -> BigUint {
    if loan_value.is_zero() {
        return BigUint::zero();
    }
    wad_ratio(loan_value, collateral_value)
}
