//! Switchboard v1 aggregator accounts.
//!
//! Only the optimized result record is recognised. Its value is not decoded here:
//! the reserve's embedded price, kept current by RefreshReserve, stands in for it.

use solana_sdk::pubkey::Pubkey;

use crate::core::error::{Error, Result};

/// First byte of an optimized aggregator result record.
pub const AGGREGATOR_RESULT_PARSE_OPTIMIZED: u8 = 6;

/// Ok when the account holds a recognised record, otherwise `UnsupportedOracleRecord`.
pub fn check_record(oracle: &Pubkey, data: &[u8]) -> Result<()> {
    let record_type = *data
        .first()
        .ok_or_else(|| Error::Decode(format!("switchboard account {} is empty", oracle)))?;

    if record_type != AGGREGATOR_RESULT_PARSE_OPTIMIZED {
        return Err(Error::UnsupportedOracleRecord {
            oracle: *oracle,
            record_type,
        });
    }
    Ok(())
}
