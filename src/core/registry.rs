//! Well-known program and mint addresses.
//!
//! Everything here can be overridden through `Config`; these are the mainnet defaults.

use solana_sdk::pubkey::Pubkey;

pub struct ProgramIds;

impl ProgramIds {
    /// Port Finance lending program (Mainnet), as text for CLI defaults.
    pub const PORT_LENDING: &'static str = "Port7uDYB3wk6GJAw4KT1WpTeMtSu9bTcChBHkX2LfR";

    pub const PORT_LENDING_ID: Pubkey = solana_sdk::pubkey!("Port7uDYB3wk6GJAw4KT1WpTeMtSu9bTcChBHkX2LfR");
    /// Port Finance staking program (Mainnet)
    pub const PORT_STAKING_ID: Pubkey = solana_sdk::pubkey!("stkarvwmSzv2BygN5e2LeTwimTczLWHCKPKGC2zVLiq");
    /// Pyth Network v2 oracle program (Mainnet)
    pub const PYTH_ID: Pubkey = solana_sdk::pubkey!("FsJ3A3u2vn5cTVofAjvy6y5kwABJAqYWpe4975bi2epH");
    /// Switchboard v1 oracle program (Mainnet)
    pub const SWITCHBOARD_V1_ID: Pubkey = solana_sdk::pubkey!("DtmE9D2CSB4L5D6A15mraeEjrGMm6auWVzgaD8hK2tZM");
}

pub struct MintAddresses;

impl MintAddresses {
    /// Wrapped SOL mint as a `Pubkey`.
    pub fn wrapped_sol() -> Pubkey {
        spl_token::native_mint::id()
    }

    pub fn is_wrapped_sol(mint: &Pubkey) -> bool {
        *mint == Self::wrapped_sol()
    }
}
