pub mod core {
    pub mod config;
    pub mod error;
    pub mod registry;
    pub mod types;
}

pub mod blockchain {
    pub mod rpc_client;
    pub mod transaction;
}

pub mod protocol;

pub mod engine {
    pub mod executor;
    pub mod planner;
    pub mod refresher;
    pub mod scanner;
    pub mod valuation;
    pub mod wallet_cache;
}

pub mod utils {
    pub mod math;
    pub mod wallet;
}

pub use blockchain::{rpc_client, transaction};
pub use self::core::{config, error, registry, types};
pub use engine::{executor, planner, refresher, scanner, valuation, wallet_cache};
pub use protocol::{oracle, port};
