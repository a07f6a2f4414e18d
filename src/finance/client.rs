//! REST client for the personal-finance backend.

use crate::config::FinanceConfig;
use crate::error::{Result, VoxError};
use crate::finance::types::{
    FinanceState, FinancialInsight, PaymentReceipt, Transaction, TransactionReceipt,
    TransferReceipt,
};
use std::time::Duration;
use tracing::debug;

/// Thin HTTP wrapper over the account backend.
#[derive(Clone)]
pub struct FinanceClient {
    base_url: String,
    client: reqwest::Client,
}

impl FinanceClient {
    /// Build a client from config.
    ///
    /// # Errors
    ///
    /// Returns `VoxError::Finance` if the underlying HTTP client cannot be
    /// constructed.
    pub fn new(config: &FinanceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| VoxError::Finance(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            client,
        })
    }

    /// Full dashboard snapshot: accounts, transactions, budgets, bills.
    pub async fn state(&self) -> Result<FinanceState> {
        let url = format!("{}/api/state", self.base_url);
        let response = self.get(&url).await?;
        response
            .json()
            .await
            .map_err(|e| VoxError::Finance(format!("invalid state payload: {e}")))
    }

    /// Income/expense/budget summary used for personalized advice.
    pub async fn profile(&self) -> Result<serde_json::Value> {
        let url = format!("{}/api/profile", self.base_url);
        let response = self.get(&url).await?;
        response
            .json()
            .await
            .map_err(|e| VoxError::Finance(format!("invalid profile payload: {e}")))
    }

    /// Record a new transaction; returns the backend receipt with the
    /// updated balance.
    pub async fn add_transaction(&self, tx: &Transaction) -> Result<TransactionReceipt> {
        let url = format!("{}/api/transaction", self.base_url);
        let response = self.post_json(&url, tx).await?;
        response
            .json()
            .await
            .map_err(|e| VoxError::Finance(format!("invalid transaction receipt: {e}")))
    }

    /// Settle a pending bill by id.
    pub async fn pay_bill(&self, bill_id: &str) -> Result<PaymentReceipt> {
        let url = format!("{}/api/bill/pay", self.base_url);
        debug!("paying bill {bill_id}");
        let response = self
            .client
            .post(&url)
            .query(&[("bill_id", bill_id)])
            .send()
            .await
            .map_err(|e| VoxError::Finance(format!("request failed: {e}")))?;
        let response = Self::check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| VoxError::Finance(format!("invalid payment receipt: {e}")))
    }

    /// Persist an insight to the user's dashboard.
    pub async fn add_insight(&self, insight: &FinancialInsight) -> Result<()> {
        let url = format!("{}/api/insight", self.base_url);
        self.post_json(&url, insight).await?;
        Ok(())
    }

    /// Move funds between two accounts identified by name or id.
    pub async fn transfer(
        &self,
        from_account: &str,
        to_account: &str,
        amount: f64,
    ) -> Result<TransferReceipt> {
        let url = format!("{}/api/transfer", self.base_url);
        let body = serde_json::json!({
            "from_account": from_account,
            "to_account": to_account,
            "amount": amount,
        });
        let response = self.post_json(&url, &body).await?;
        response
            .json()
            .await
            .map_err(|e| VoxError::Finance(format!("invalid transfer receipt: {e}")))
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| VoxError::Finance(format!("request failed: {e}")))?;
        Self::check_status(response).await
    }

    async fn post_json<B: serde::Serialize + ?Sized>(
        &self,
        url: &str,
        body: &B,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| VoxError::Finance(format!("request failed: {e}")))?;
        Self::check_status(response).await
    }

    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        // FastAPI-style errors carry the useful text in a `detail` field.
        let body = response.text().await.unwrap_or_default();
        let detail = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("detail").and_then(|d| d.as_str().map(str::to_owned)))
            .unwrap_or(body);
        Err(VoxError::Finance(format!("{status}: {detail}")))
    }
}
