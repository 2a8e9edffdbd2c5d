//! Usage ledger types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of ledger entry
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// Model-call debit
    Usage,
    /// Prepaid purchase credit
    Purchase,
    /// Promotional credit
    Bonus,
    /// Refund credit
    Refund,
    /// Manual adjustment
    Adjustment,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usage => "usage",
            Self::Purchase => "purchase",
            Self::Bonus => "bonus",
            Self::Refund => "refund",
            Self::Adjustment => "adjustment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "usage" => Some(Self::Usage),
            "purchase" => Some(Self::Purchase),
            "bonus" => Some(Self::Bonus),
            "refund" => Some(Self::Refund),
            "adjustment" => Some(Self::Adjustment),
            _ => None,
        }
    }
}

/// Immutable ledger entry; append-only audit trail, never mutated or deleted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageTransaction {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub kind: TransactionKind,
    /// Signed amount in usage units; negative for debits
    pub amount: i64,
    /// Balance snapshot after this entry was applied
    pub balance_after: i64,
    /// Model that incurred the charge, for usage entries
    pub model: Option<String>,
    pub input_tokens: Option<u32>,
    pub output_tokens: Option<u32>,
    /// Human-readable reason, for credits and adjustments
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Result of a successful debit
#[derive(Debug, Clone)]
pub struct DebitReceipt {
    pub transaction_id: Uuid,
    /// Usage units charged
    pub units_charged: i64,
    /// Tenant balance after the debit
    pub new_balance: i64,
}
