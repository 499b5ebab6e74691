use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;
use std::fs;
use std::path::Path;

/// Loads the agent keypair. Accepts the standard JSON array, raw 64 bytes, or a base58 string.
pub fn load_keypair(path: &Path) -> Result<Keypair> {
    if !path.exists() {
        return Err(anyhow::anyhow!("Keypair file not found: {}", path.display()));
    }

    let bytes = fs::read(path)
        .with_context(|| format!("Failed to read keypair file {}", path.display()))?;
    parse_keypair(&bytes)
}

pub fn parse_keypair(bytes: &[u8]) -> Result<Keypair> {
    if let Ok(secret) = serde_json::from_slice::<Vec<u8>>(bytes) {
        if secret.len() == 64 {
            return Keypair::from_bytes(&secret)
                .map_err(|e| anyhow::anyhow!("Failed to parse keypair: {}", e));
        }
    }

    if bytes.len() == 64 {
        return Keypair::from_bytes(bytes).map_err(|e| anyhow::anyhow!("Failed to parse keypair: {}", e));
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        if let Ok(decoded) = bs58::decode(text.trim()).into_vec() {
            if decoded.len() == 64 {
                return Keypair::from_bytes(&decoded)
                    .map_err(|e| anyhow::anyhow!("Failed to parse keypair: {}", e));
            }
        }
    }

    Err(anyhow::anyhow!(
        "Invalid keypair format: expected 64 bytes, JSON array, or base58 string"
    ))
}
