use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::client_error::Result as ClientResult;
use solana_client::rpc_client::RpcClient as SolanaRpcClient;
use solana_client::rpc_config::{RpcAccountInfoConfig, RpcProgramAccountsConfig};
use solana_client::rpc_filter::RpcFilterType;
use solana_sdk::{
    account::Account,
    commitment_config::CommitmentConfig,
    hash::Hash,
    pubkey::Pubkey,
    signature::Signature,
    transaction::Transaction,
};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::time::{sleep, timeout, Duration};

/// `getMultipleAccounts` accepts at most this many keys per request.
pub const MAX_MULTIPLE_ACCOUNTS: usize = 100;

const MAX_CONCURRENT_REQUESTS: usize = 10;
const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// Everything the liquidator needs from the chain.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>>;

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Account>>>;

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Account)>>;

    async fn get_balance(&self, address: &Pubkey) -> Result<u64>;

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64>;

    async fn get_latest_blockhash(&self) -> Result<Hash>;

    /// Submit a signed transaction and wait for confirmation.
    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature>;
}

/// Async wrapper over the blocking Solana RPC client.
pub struct RpcClient {
    client: Arc<SolanaRpcClient>,
    rpc_url: String,
    rate_limiter: Arc<Semaphore>,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(rpc_url: String, request_timeout: Duration) -> Self {
        log::info!(
            "RpcClient: {} (request_timeout={:?}, max_concurrent={})",
            rpc_url,
            request_timeout,
            MAX_CONCURRENT_REQUESTS
        );

        RpcClient {
            client: Arc::new(SolanaRpcClient::new_with_commitment(
                rpc_url.clone(),
                CommitmentConfig::confirmed(),
            )),
            rpc_url,
            rate_limiter: Arc::new(Semaphore::new(MAX_CONCURRENT_REQUESTS)),
            request_timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.rpc_url
    }

    /// Runs a blocking RPC call off the runtime, under timeout, retrying on HTTP 429.
    async fn call<T, F>(&self, label: String, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&SolanaRpcClient) -> ClientResult<T> + Send + Sync + 'static,
    {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .context("Failed to acquire rate limiter permit")?;

        let op = Arc::new(op);
        let mut retry_count = 0;

        loop {
            let client = Arc::clone(&self.client);
            let op = Arc::clone(&op);

            let result = timeout(
                self.request_timeout,
                tokio::task::spawn_blocking(move || op(&client)),
            )
            .await
            .map_err(|_| {
                anyhow::anyhow!(
                    "RPC request timeout after {:?} for {}",
                    self.request_timeout,
                    label
                )
            })?
            .context("Failed to spawn blocking task")?;

            match result {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let error_str = e.to_string();
                    if is_rate_limited(&error_str) && retry_count < MAX_RATE_LIMIT_RETRIES {
                        retry_count += 1;
                        let backoff = Duration::from_millis(500 * retry_count as u64);
                        log::warn!(
                            "Rate limit hit on {}, backing off for {:?} (attempt {}/{})",
                            label,
                            backoff,
                            retry_count,
                            MAX_RATE_LIMIT_RETRIES
                        );
                        sleep(backoff).await;
                        continue;
                    }
                    return Err(anyhow::anyhow!("RPC error ({}) in {}: {}", self.rpc_url, label, e));
                }
            }
        }
    }
}

fn is_rate_limited(error: &str) -> bool {
    error.contains("429") || error.contains("Too many requests") || error.contains("rate limit")
}

#[async_trait]
impl ChainClient for RpcClient {
    async fn get_account(&self, address: &Pubkey) -> Result<Option<Account>> {
        let address = *address;
        self.call(format!("get_account({})", address), move |client| {
            client
                .get_account_with_commitment(&address, client.commitment())
                .map(|response| response.value)
        })
        .await
    }

    async fn get_multiple_accounts(&self, addresses: &[Pubkey]) -> Result<Vec<Option<Account>>> {
        let mut accounts = Vec::with_capacity(addresses.len());
        for chunk in addresses.chunks(MAX_MULTIPLE_ACCOUNTS) {
            let chunk = chunk.to_vec();
            let label = format!("get_multiple_accounts({} accounts)", chunk.len());
            let fetched = self
                .call(label, move |client| client.get_multiple_accounts(&chunk))
                .await?;
            accounts.extend(fetched);
        }
        Ok(accounts)
    }

    async fn get_program_accounts(
        &self,
        program_id: &Pubkey,
        filters: Vec<RpcFilterType>,
    ) -> Result<Vec<(Pubkey, Account)>> {
        let program_id = *program_id;
        let config = RpcProgramAccountsConfig {
            filters: if filters.is_empty() { None } else { Some(filters) },
            account_config: RpcAccountInfoConfig {
                encoding: Some(solana_account_decoder::UiAccountEncoding::Base64),
                commitment: Some(CommitmentConfig::confirmed()),
                ..Default::default()
            },
            ..Default::default()
        };

        self.call(format!("get_program_accounts({})", program_id), move |client| {
            client.get_program_accounts_with_config(&program_id, config.clone())
        })
        .await
    }

    async fn get_balance(&self, address: &Pubkey) -> Result<u64> {
        let address = *address;
        self.call(format!("get_balance({})", address), move |client| {
            client.get_balance(&address)
        })
        .await
    }

    async fn get_minimum_balance_for_rent_exemption(&self, data_len: usize) -> Result<u64> {
        self.call(
            format!("get_minimum_balance_for_rent_exemption({})", data_len),
            move |client| client.get_minimum_balance_for_rent_exemption(data_len),
        )
        .await
    }

    async fn get_latest_blockhash(&self) -> Result<Hash> {
        self.call("get_latest_blockhash".to_string(), |client| client.get_latest_blockhash())
            .await
    }

    async fn send_transaction(&self, transaction: &Transaction) -> Result<Signature> {
        let transaction = transaction.clone();
        self.call("send_and_confirm_transaction".to_string(), move |client| {
            client.send_and_confirm_transaction(&transaction)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_detection() {
        assert!(is_rate_limited("HTTP status client error (429 Too Many Requests)"));
        assert!(is_rate_limited("rate limit exceeded"));
        assert!(!is_rate_limited("AccountNotFound"));
    }
}
