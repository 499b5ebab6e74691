use solana_sdk::pubkey::Pubkey;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    /// Malformed or short account bytes. The single account is skipped.
    #[error("Decode error: {0}")]
    Decode(String),

    /// Last-update slot is the zero sentinel.
    #[error("Stale account {0}: last update slot is zero")]
    StaleData(String),

    #[error("Unrecognized oracle {oracle} (owner {owner}) for reserve {reserve}")]
    UnrecognizedOracle {
        reserve: Pubkey,
        oracle: Pubkey,
        owner: Pubkey,
    },

    #[error("Unsupported oracle record type {record_type} in {oracle}")]
    UnsupportedOracleRecord { oracle: Pubkey, record_type: u8 },

    #[error("Invalid oracle price in {oracle}: {reason}")]
    InvalidOraclePrice { oracle: Pubkey, reason: String },

    #[error("Obligation {obligation} references reserve {reserve} missing from snapshot")]
    MissingReserve { obligation: Pubkey, reserve: Pubkey },

    /// The reserve's price failed to resolve this cycle.
    #[error("Obligation {obligation} references reserve {reserve} with no price this cycle")]
    UnpricedReserve { obligation: Pubkey, reserve: Pubkey },

    #[error("No wallet for mint {0}")]
    MissingWallet(Pubkey),

    #[error("No stake account for owner {owner} in staking pool {pool}")]
    MissingStakeAccount { owner: Pubkey, pool: Pubkey },

    #[error("No usable liquidity to repay obligation {0}")]
    NoUsableLiquidity(Pubkey),

    #[error("Instruction build error: {0}")]
    Instruction(String),

    #[error("Transaction rejected: {0}")]
    TransactionRejected(String),
}

pub type Result<T> = std::result::Result<T, Error>;
