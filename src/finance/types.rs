//! Account-backend domain types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    /// ISO date, `YYYY-MM-DD`.
    pub date: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: TransactionKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Checking,
    Savings,
    Investment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub balance: f64,
    #[serde(rename = "type")]
    pub kind: AccountKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Budget {
    pub category: String,
    pub limit: f64,
    pub spent: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Biller {
    pub id: String,
    pub name: String,
    pub category: String,
    #[serde(
        rename = "lastPaymentDate",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub last_payment_date: Option<String>,
    #[serde(rename = "autoPay")]
    pub auto_pay: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BillStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bill {
    pub id: String,
    #[serde(rename = "billerId")]
    pub biller_id: String,
    pub amount: f64,
    #[serde(rename = "dueDate")]
    pub due_date: String,
    pub status: BillStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightKind {
    Saving,
    Budgeting,
    Investment,
    Debt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightImpact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinancialInsight {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: InsightKind,
    pub impact: InsightImpact,
}

/// Full dashboard snapshot served by `/api/state`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinanceState {
    pub accounts: Vec<Account>,
    pub transactions: Vec<Transaction>,
    pub budgets: Vec<Budget>,
    pub billers: Vec<Biller>,
    pub bills: Vec<Bill>,
    pub insights: Vec<FinancialInsight>,
}

impl FinanceState {
    /// Pending bills joined with their biller names.
    pub fn pending_bills(&self) -> Vec<serde_json::Value> {
        self.bills
            .iter()
            .filter(|b| b.status == BillStatus::Pending)
            .map(|b| {
                let biller = self
                    .billers
                    .iter()
                    .find(|br| br.id == b.biller_id)
                    .map_or("Unknown", |br| br.name.as_str());
                serde_json::json!({
                    "id": b.id,
                    "biller": biller,
                    "amount": b.amount,
                    "dueDate": b.due_date,
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransactionReceipt {
    pub message: String,
    pub new_balance: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentReceipt {
    pub message: String,
    pub transaction_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransferReceipt {
    pub message: String,
}
