//! Port Finance lending program: account images, instruction encoding and PDAs.

pub mod accounts;
pub mod instructions;
pub mod layout;
pub mod types;

pub use accounts::derive_lending_market_authority;
pub use types::{
    LastUpdate, Obligation, ObligationCollateral, ObligationLiquidity, Reserve, ReserveCollateral,
    ReserveConfig, ReserveLiquidity, OBLIGATION_LEN, RESERVE_LEN,
};
