//! Arbitrary-precision fixed-point helpers.
//!
//! On-chain fractional quantities are WAD-scaled integers (value × 10^18). All
//! valuation math stays in `BigUint` so nothing is ever rounded through `f64`.

use num_bigint::BigUint;
use num_traits::Zero;

pub const WAD_DECIMALS: u32 = 18;

pub fn pow10(exp: u32) -> BigUint {
    BigUint::from(10u32).pow(exp)
}

pub fn wad() -> BigUint {
    pow10(WAD_DECIMALS)
}

/// Moves a fixed-point integer from one decimal scale to another. Scaling down truncates.
pub fn rescale(value: &BigUint, from_scale: u32, to_scale: u32) -> BigUint {
    if from_scale == to_scale {
        value.clone()
    } else if from_scale < to_scale {
        value * pow10(to_scale - from_scale)
    } else {
        value / pow10(from_scale - to_scale)
    }
}

/// `numerator / denominator` as a WAD value, or zero when the denominator is zero.
pub fn wad_ratio(numerator: &BigUint, denominator: &BigUint) -> BigUint {
    if denominator.is_zero() {
        return BigUint::zero();
    }
    numerator * wad() / denominator
}

/// Renders a WAD value with `places` fractional digits, truncated.
pub fn format_wad(value: &BigUint, places: u32) -> String {
    let scaled = rescale(value, WAD_DECIMALS, places);
    if places == 0 {
        return scaled.to_string();
    }

    let unit = pow10(places);
    let integer = &scaled / &unit;
    let fraction = &scaled % &unit;
    format!(
        "{}.{:0>width$}",
        integer,
        fraction.to_string(),
        width = places as usize
    )
}
