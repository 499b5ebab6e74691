use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use crate::core::registry::ProgramIds;
use crate::core::types::{AssetNames, RepayAmountPolicy};

#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub lending_program_id: Pubkey,
    pub staking_program_id: Pubkey,
    pub pyth_program_id: Pubkey,
    pub switchboard_program_id: Pubkey,
    pub keypair_path: String,
    pub poll_interval_ms: u64,
    pub rpc_timeout_seconds: u64,
    pub dry_run: bool,
    pub repay_amount_policy: RepayAmountPolicy,
    pub native_reserve_lamports: u64, // lamports never spent on the native repay path
    pub display_first: usize,
    pub compute_unit_limit: u32,
    pub priority_fee_micro_lamports: u64,
    pub refresh_batch_size: usize,
    pub asset_names_json: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            lending_program_id: ProgramIds::PORT_LENDING_ID,
            staking_program_id: ProgramIds::PORT_STAKING_ID,
            pyth_program_id: ProgramIds::PYTH_ID,
            switchboard_program_id: ProgramIds::SWITCHBOARD_V1_ID,
            keypair_path: default_keypair_path(),
            poll_interval_ms: 8_000,
            rpc_timeout_seconds: 10,
            dry_run: true,
            repay_amount_policy: RepayAmountPolicy::Exact,
            native_reserve_lamports: 100_000_000,
            display_first: 10,
            compute_unit_limit: 0,
            priority_fee_micro_lamports: 0,
            refresh_batch_size: 15,
            asset_names_json: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        let config = Config {
            rpc_url: env_str("RPC_URL", &defaults.rpc_url),
            lending_program_id: env_parse("LENDING_PROGRAM_ID", defaults.lending_program_id)?,
            staking_program_id: env_parse("STAKING_PROGRAM_ID", defaults.staking_program_id)?,
            pyth_program_id: env_parse("PYTH_PROGRAM_ID", defaults.pyth_program_id)?,
            switchboard_program_id: env_parse("SWITCHBOARD_PROGRAM_ID", defaults.switchboard_program_id)?,
            keypair_path: env_str("KEYPAIR_PATH", &defaults.keypair_path),
            poll_interval_ms: env_parse("POLL_INTERVAL_MS", defaults.poll_interval_ms)?,
            rpc_timeout_seconds: env_parse("RPC_TIMEOUT_SECONDS", defaults.rpc_timeout_seconds)?,
            dry_run: env_parse("DRY_RUN", defaults.dry_run)?,
            repay_amount_policy: env_parse("REPAY_AMOUNT_POLICY", defaults.repay_amount_policy)?,
            native_reserve_lamports: env_parse("NATIVE_RESERVE_LAMPORTS", defaults.native_reserve_lamports)?,
            display_first: env_parse("DISPLAY_FIRST", defaults.display_first)?,
            compute_unit_limit: env_parse("COMPUTE_UNIT_LIMIT", defaults.compute_unit_limit)?,
            priority_fee_micro_lamports: env_parse(
                "PRIORITY_FEE_MICRO_LAMPORTS",
                defaults.priority_fee_micro_lamports,
            )?,
            refresh_batch_size: env_parse("REFRESH_BATCH_SIZE", defaults.refresh_batch_size)?,
            asset_names_json: env::var("ASSET_NAMES_JSON").ok().filter(|s| !s.trim().is_empty()),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(anyhow::anyhow!(
                "RPC_URL must start with http:// or https://, got: {}",
                self.rpc_url
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(anyhow::anyhow!("POLL_INTERVAL_MS must be greater than 0"));
        }

        if self.rpc_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("RPC_TIMEOUT_SECONDS must be greater than 0"));
        }

        if self.rpc_timeout_seconds > 30 {
            log::warn!(
                "RPC_TIMEOUT_SECONDS={} is very high (>30s), a stuck request will stall the whole cycle",
                self.rpc_timeout_seconds
            );
        }

        if self.refresh_batch_size == 0 {
            return Err(anyhow::anyhow!("REFRESH_BATCH_SIZE must be greater than 0"));
        }

        if self.compute_unit_limit > 1_400_000 {
            return Err(anyhow::anyhow!(
                "COMPUTE_UNIT_LIMIT must not exceed 1400000, got: {}",
                self.compute_unit_limit
            ));
        }

        if self.priority_fee_micro_lamports > 0 && self.compute_unit_limit == 0 {
            log::warn!("PRIORITY_FEE_MICRO_LAMPORTS is set but COMPUTE_UNIT_LIMIT is 0; no priority fee will be paid");
        }

        if let Some(json) = &self.asset_names_json {
            AssetNames::from_json(json).context("Invalid ASSET_NAMES_JSON value")?;
        }

        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_seconds)
    }

    pub fn asset_names(&self) -> Result<AssetNames> {
        match &self.asset_names_json {
            Some(json) => AssetNames::from_json(json),
            None => Ok(AssetNames::default()),
        }
    }
}

fn default_keypair_path() -> String {
    match env::var("HOME") {
        Ok(home) => format!("{}/.config/solana/id.json", home),
        Err(_) => "./id.json".to_string(),
    }
}

fn env_str(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr + Display,
    T::Err: Display,
{
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid {} value: {}", key, e))
}
