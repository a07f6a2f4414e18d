//! Tool handlers backed by the finance REST client.
//!
//! Every catalog tool resolves here. All tools except `pay_bill` resolve
//! immediately against the backend; `pay_bill` is high-risk and defers until
//! the host collects an explicit user confirmation.

use crate::error::Result;
use crate::finance::client::FinanceClient;
use crate::finance::types::{
    BillStatus, FinancialInsight, InsightImpact, InsightKind, Transaction, TransactionKind,
};
use crate::tools::{DeferredToken, ToolCallRequest, ToolHandler, ToolName, ToolOutcome};
use chrono::Utc;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// A bill payment awaiting user confirmation.
///
/// Carries the [`DeferredToken`] for the deferred `pay_bill` call; the host
/// settles the payment through [`PaymentConfirmation::approve`] or
/// [`PaymentConfirmation::decline`].
pub struct PaymentConfirmation {
    pub token: DeferredToken,
    pub bill_id: String,
    pub biller_name: String,
    pub amount: f64,
    client: FinanceClient,
}

impl PaymentConfirmation {
    /// Execute the payment and produce the tool result text.
    ///
    /// Consumes the confirmation; the returned token/result pair goes to
    /// `VoiceSession::send_deferred_response`.
    pub async fn approve(self) -> (DeferredToken, serde_json::Value) {
        match self.client.pay_bill(&self.bill_id).await {
            Ok(receipt) => {
                info!("bill {} paid: {}", self.bill_id, receipt.message);
                (self.token, json!("Payment successful. Voice ID verified."))
            }
            Err(e) => {
                warn!("bill payment failed: {e}");
                (self.token, json!("Payment failed. Please try again."))
            }
        }
    }

    /// Produce a declined tool result without touching the backend.
    pub fn decline(self) -> (DeferredToken, serde_json::Value) {
        (self.token, json!("Payment cancelled by user."))
    }
}

/// [`ToolHandler`] implementation over the finance backend.
pub struct FinanceToolHandler {
    client: FinanceClient,
    confirmations: mpsc::UnboundedSender<PaymentConfirmation>,
}

impl FinanceToolHandler {
    /// Create a handler and the receiver the host drains for payment
    /// confirmations.
    pub fn new(client: FinanceClient) -> (Self, mpsc::UnboundedReceiver<PaymentConfirmation>) {
        let (confirmations, rx) = mpsc::unbounded_channel();
        (
            Self {
                client,
                confirmations,
            },
            rx,
        )
    }

    async fn account_balances(&self) -> Result<ToolOutcome> {
        let state = self.client.state().await?;
        let balances: Vec<serde_json::Value> = state
            .accounts
            .iter()
            .map(|a| json!({ "name": a.name, "balance": a.balance }))
            .collect();
        Ok(ToolOutcome::Immediate(json!(balances)))
    }

    async fn add_transaction(&self, call: &ToolCallRequest) -> Result<ToolOutcome> {
        let Some(amount) = call.f64_arg("amount") else {
            return Ok(ToolOutcome::Immediate(json!("Error: amount is required.")));
        };
        let kind = match call.str_arg("type") {
            Some("income") => TransactionKind::Income,
            _ => TransactionKind::Expense,
        };
        let tx = Transaction {
            id: uuid::Uuid::new_v4().to_string(),
            date: Utc::now().format("%Y-%m-%d").to_string(),
            amount,
            category: call.str_arg("category").unwrap_or_default().to_owned(),
            description: call.str_arg("description").unwrap_or_default().to_owned(),
            kind,
        };
        match self.client.add_transaction(&tx).await {
            Ok(receipt) => Ok(ToolOutcome::Immediate(json!(format!(
                "Success: Added {} of ${amount}. New Balance: ${}",
                match kind {
                    TransactionKind::Income => "income",
                    TransactionKind::Expense => "expense",
                },
                receipt.new_balance
            )))),
            Err(e) => {
                warn!("add_transaction failed: {e}");
                Ok(ToolOutcome::Immediate(json!("Error adding transaction.")))
            }
        }
    }

    async fn pending_bills(&self) -> Result<ToolOutcome> {
        let state = self.client.state().await?;
        Ok(ToolOutcome::Immediate(json!(state.pending_bills())))
    }

    async fn pay_bill(&self, call: &ToolCallRequest) -> Result<ToolOutcome> {
        let Some(bill_id) = call.str_arg("billId") else {
            return Ok(ToolOutcome::Immediate(json!("Error: billId is required.")));
        };
        let state = self.client.state().await?;
        let bill = state
            .bills
            .iter()
            .find(|b| b.id == bill_id && b.status == BillStatus::Pending);
        let Some(bill) = bill else {
            return Ok(ToolOutcome::Immediate(json!(
                "Bill not found or already paid."
            )));
        };
        let biller_name = state
            .billers
            .iter()
            .find(|br| br.id == bill.biller_id)
            .map_or("Unknown", |br| br.name.as_str())
            .to_owned();

        let confirmation = PaymentConfirmation {
            token: DeferredToken::for_call(call),
            bill_id: bill.id.clone(),
            biller_name,
            amount: bill.amount,
            client: self.client.clone(),
        };
        if self.confirmations.send(confirmation).is_err() {
            // No confirmation consumer means the payment can never complete.
            warn!("no confirmation consumer, refusing payment for bill {bill_id}");
            return Ok(ToolOutcome::Immediate(json!(
                "Payment confirmation is unavailable right now."
            )));
        }
        info!("payment for bill {bill_id} awaiting user confirmation");
        Ok(ToolOutcome::Deferred)
    }

    async fn financial_profile(&self) -> Result<ToolOutcome> {
        match self.client.profile().await {
            Ok(profile) => Ok(ToolOutcome::Immediate(profile)),
            Err(e) => {
                warn!("profile fetch failed: {e}");
                Ok(ToolOutcome::Immediate(json!(
                    "Failed to retrieve financial profile."
                )))
            }
        }
    }

    async fn add_insight(&self, call: &ToolCallRequest) -> Result<ToolOutcome> {
        let kind = match call.str_arg("type") {
            Some("saving") => InsightKind::Saving,
            Some("investment") => InsightKind::Investment,
            Some("debt") => InsightKind::Debt,
            _ => InsightKind::Budgeting,
        };
        let impact = match call.str_arg("impact") {
            Some("high") => InsightImpact::High,
            Some("low") => InsightImpact::Low,
            _ => InsightImpact::Medium,
        };
        let insight = FinancialInsight {
            id: uuid::Uuid::new_v4().to_string(),
            title: call.str_arg("title").unwrap_or_default().to_owned(),
            content: call.str_arg("content").unwrap_or_default().to_owned(),
            kind,
            impact,
        };
        self.client.add_insight(&insight).await?;
        Ok(ToolOutcome::Immediate(json!(
            "Insight saved to user dashboard."
        )))
    }

    async fn transfer_funds(&self, call: &ToolCallRequest) -> Result<ToolOutcome> {
        let from = call.str_arg("from_account").unwrap_or_default();
        let to = call.str_arg("to_account").unwrap_or_default();
        let Some(amount) = call.f64_arg("amount") else {
            return Ok(ToolOutcome::Immediate(json!("Error: amount is required.")));
        };
        match self.client.transfer(from, to, amount).await {
            Ok(receipt) => Ok(ToolOutcome::Immediate(json!(receipt.message))),
            Err(e) => Ok(ToolOutcome::Immediate(json!(format!(
                "Transfer failed: {e}"
            )))),
        }
    }
}

#[async_trait::async_trait]
impl ToolHandler for FinanceToolHandler {
    async fn on_tool_call(&self, call: &ToolCallRequest) -> Result<ToolOutcome> {
        let Some(name) = ToolName::parse(&call.name) else {
            return Ok(ToolOutcome::Immediate(json!(format!(
                "Unknown tool: {}",
                call.name
            ))));
        };
        match name {
            ToolName::GetAccountBalances => self.account_balances().await,
            ToolName::AddTransaction => self.add_transaction(call).await,
            ToolName::GetPendingBills => self.pending_bills().await,
            ToolName::PayBill => self.pay_bill(call).await,
            ToolName::GetFinancialProfile => self.financial_profile().await,
            ToolName::AddFinancialInsight => self.add_insight(call).await,
            ToolName::TransferFunds => self.transfer_funds(call).await,
        }
    }
}
