use anyhow::{Context, Result};
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// How much the agent offers to repay on the token path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepayAmountPolicy {
    /// Approve and repay exactly the wallet's on-hand balance.
    Exact,
    /// Approve and repay `u64::MAX`, letting the lending program clamp to the close factor.
    Max,
}

impl Default for RepayAmountPolicy {
    fn default() -> Self {
        RepayAmountPolicy::Exact
    }
}

impl FromStr for RepayAmountPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "exact" => Ok(RepayAmountPolicy::Exact),
            "max" => Ok(RepayAmountPolicy::Max),
            other => Err(anyhow::anyhow!(
                "unknown repay amount policy '{}' (expected 'exact' or 'max')",
                other
            )),
        }
    }
}

impl fmt::Display for RepayAmountPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepayAmountPolicy::Exact => write!(f, "exact"),
            RepayAmountPolicy::Max => write!(f, "max"),
        }
    }
}

/// Read-only reserve address -> display name map, used only for log output.
#[derive(Debug, Clone, Default)]
pub struct AssetNames {
    names: HashMap<Pubkey, String>,
}

impl AssetNames {
    pub const UNKNOWN: &'static str = "unknown";

    pub fn new(names: HashMap<Pubkey, String>) -> Self {
        AssetNames { names }
    }

    /// Parses a JSON object of `{"<reserve address>": "<name>"}`.
    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(AssetNames::default());
        }

        let raw: HashMap<String, String> =
            serde_json::from_str(json).context("ASSET_NAMES_JSON is not a JSON object of strings")?;

        let mut names = HashMap::with_capacity(raw.len());
        for (address, name) in raw {
            let reserve = Pubkey::from_str(&address)
                .with_context(|| format!("Invalid reserve address in ASSET_NAMES_JSON: {}", address))?;
            names.insert(reserve, name);
        }

        Ok(AssetNames { names })
    }

    pub fn name(&self, reserve: &Pubkey) -> &str {
        self.names
            .get(reserve)
            .map(String::as_str)
            .unwrap_or(Self::UNKNOWN)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
