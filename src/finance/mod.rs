//! Personal-finance backend integration.

pub mod client;
pub mod handlers;
pub mod types;

pub use client::FinanceClient;
pub use handlers::{FinanceToolHandler, PaymentConfirmation};
