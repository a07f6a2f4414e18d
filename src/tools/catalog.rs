//! The fixed finance tool catalog advertised at session open.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Names of the tools the assistant may invoke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    GetAccountBalances,
    AddTransaction,
    GetPendingBills,
    PayBill,
    GetFinancialProfile,
    AddFinancialInsight,
    TransferFunds,
}

impl ToolName {
    /// Wire name of the tool.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GetAccountBalances => "get_account_balances",
            Self::AddTransaction => "add_transaction",
            Self::GetPendingBills => "get_pending_bills",
            Self::PayBill => "pay_bill",
            Self::GetFinancialProfile => "get_financial_profile",
            Self::AddFinancialInsight => "add_financial_insight",
            Self::TransferFunds => "transfer_funds",
        }
    }

    /// Parse a wire name; `None` for tools outside the catalog.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "get_account_balances" => Some(Self::GetAccountBalances),
            "add_transaction" => Some(Self::AddTransaction),
            "get_pending_bills" => Some(Self::GetPendingBills),
            "pay_bill" => Some(Self::PayBill),
            "get_financial_profile" => Some(Self::GetFinancialProfile),
            "add_financial_insight" => Some(Self::AddFinancialInsight),
            "transfer_funds" => Some(Self::TransferFunds),
            _ => None,
        }
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool advertised to the service: name, purpose, argument schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

fn declare(name: ToolName, description: &str, parameters: serde_json::Value) -> ToolDeclaration {
    ToolDeclaration {
        name: name.as_str().to_owned(),
        description: description.to_owned(),
        parameters,
    }
}

/// The full catalog sent with the session setup message.
pub fn declarations() -> Vec<ToolDeclaration> {
    vec![
        declare(
            ToolName::GetAccountBalances,
            "Returns current balances for all user accounts.",
            json!({ "type": "OBJECT", "properties": {} }),
        ),
        declare(
            ToolName::AddTransaction,
            "Records a new transaction.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "amount": { "type": "NUMBER" },
                    "category": { "type": "STRING" },
                    "description": { "type": "STRING" },
                    "type": { "type": "STRING", "enum": ["income", "expense"] },
                },
                "required": ["amount", "category", "description", "type"],
            }),
        ),
        declare(
            ToolName::GetPendingBills,
            "Lists all bills currently marked as pending.",
            json!({ "type": "OBJECT", "properties": {} }),
        ),
        declare(
            ToolName::PayBill,
            "Initiates a payment for a specific bill. Requires bill ID.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "billId": { "type": "STRING", "description": "The ID of the bill to pay" },
                },
                "required": ["billId"],
            }),
        ),
        declare(
            ToolName::GetFinancialProfile,
            "Retrieves a full summary of income, expenses, and budgets for personalized advice.",
            json!({ "type": "OBJECT", "properties": {} }),
        ),
        declare(
            ToolName::AddFinancialInsight,
            "Saves a financial recommendation for the user to see later in their dashboard.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "title": { "type": "STRING" },
                    "content": { "type": "STRING" },
                    "type": { "type": "STRING", "enum": ["saving", "budgeting", "investment", "debt"] },
                    "impact": { "type": "STRING", "enum": ["high", "medium", "low"] },
                },
                "required": ["title", "content", "type", "impact"],
            }),
        ),
        declare(
            ToolName::TransferFunds,
            "Transfers money between two accounts.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "from_account": { "type": "STRING", "description": "Name or ID of source account" },
                    "to_account": { "type": "STRING", "description": "Name or ID of destination account" },
                    "amount": { "type": "NUMBER" },
                },
                "required": ["from_account", "to_account", "amount"],
            }),
        ),
    ]
}
