use std::time::Duration;

use async_trait::async_trait;
use data::{SendTransactionRequest, Transaction, TxStatus};
pub use ethers::types::H256;
use reqwest::Response;
use tracing::instrument;

pub mod data;

/// The Ledger Adapter contract (spec §6): submit one transaction carrying a
/// 32-byte root and return once it has a confirmed `{txHash, blockNumber,
/// blockTimestamp, chainId}`. Callers are responsible for serializing calls
/// through a single mutex per ledger account (spec §5) — this trait itself
/// makes no such guarantee.
#[async_trait]
pub trait LedgerAdapter: Send + Sync {
    async fn send_transaction(
        &self,
        root: H256,
        tx_type: Option<&str>,
    ) -> anyhow::Result<Transaction>;
}

/// HTTP client for an external transaction-sitter service: a component that
/// owns the ledger account's nonce, batches root submissions into real
/// on-chain transactions, and reports back once they're mined.
pub struct LedgerClient {
    client: reqwest::Client,
    url: String,
    poll_interval: Duration,
    poll_timeout: Duration,
}

impl LedgerClient {
    pub fn new(url: impl ToString) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.to_string(),
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(300),
        }
    }

    pub fn with_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.poll_interval = interval;
        self.poll_timeout = timeout;
        self
    }

    async fn json_post<T, R>(&self, url: &str, body: T) -> anyhow::Result<R>
    where
        T: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let response = self.client.post(url).json(&body).send().await?;

        let response = Self::validate_response(response).await?;

        Ok(response.json().await?)
    }

    async fn json_get<R>(&self, url: &str) -> anyhow::Result<R>
    where
        R: serde::de::DeserializeOwned,
    {
        let response = self.client.get(url).send().await?;

        let response = Self::validate_response(response).await?;

        Ok(response.json().await?)
    }

    async fn validate_response(response: Response) -> anyhow::Result<Response> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await?;

            tracing::error!("Response failed with status {} - {}", status, body);
            return Err(anyhow::anyhow!(
                "Response failed with status {status} - {body}"
            ));
        }

        Ok(response)
    }

    #[instrument(skip(self))]
    async fn submit(&self, req: &SendTransactionRequest) -> anyhow::Result<Transaction> {
        self.json_post(&format!("{}/tx", self.url), req).await
    }

    #[instrument(skip(self))]
    async fn get_tx(&self, root: &H256) -> anyhow::Result<Transaction> {
        self.json_get(&format!("{}/tx/{:#x}", self.url, root)).await
    }

    async fn await_mined(&self, root: &H256) -> anyhow::Result<Transaction> {
        let deadline = tokio::time::Instant::now() + self.poll_timeout;

        loop {
            let tx = self.get_tx(root).await?;

            if tx.status != TxStatus::Pending {
                return Ok(tx);
            }

            if tokio::time::Instant::now() >= deadline {
                anyhow::bail!("timed out waiting for root {root:#x} to be mined");
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl LedgerAdapter for LedgerClient {
    #[instrument(skip(self))]
    async fn send_transaction(
        &self,
        root: H256,
        tx_type: Option<&str>,
    ) -> anyhow::Result<Transaction> {
        let req = SendTransactionRequest {
            root,
            tx_type: tx_type.map(str::to_owned),
        };

        self.submit(&req).await?;

        self.await_mined(&root).await
    }
}
