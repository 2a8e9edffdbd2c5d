//! Prepaid usage metering
//!
//! Every model call is priced in internal units from token counts and charged
//! against the tenant's prepaid balance. The debit itself is atomic at the
//! database layer; this module owns pricing and the ledger-facing API.

use uuid::Uuid;

use crate::config::BillingConfig;
use crate::error::Result;
use crate::storage::Database;
use crate::types::{DebitReceipt, TransactionKind, UsageTransaction};

/// Units charged per 1k input/output tokens for one model
#[derive(Debug, Clone, Copy)]
pub struct ModelRate {
    pub input_per_1k: i64,
    pub output_per_1k: i64,
}

/// Built-in price table. Models not listed here fall back to the
/// conservative default rates from [`BillingConfig`].
const MODEL_RATES: &[(&str, ModelRate)] = &[
    (
        "llama3.1",
        ModelRate {
            input_per_1k: 5,
            output_per_1k: 15,
        },
    ),
    (
        "llama3.2",
        ModelRate {
            input_per_1k: 3,
            output_per_1k: 9,
        },
    ),
    (
        "mistral",
        ModelRate {
            input_per_1k: 5,
            output_per_1k: 15,
        },
    ),
    (
        "llava",
        ModelRate {
            input_per_1k: 8,
            output_per_1k: 24,
        },
    ),
];

/// Prices model calls and records them against tenant balances
#[derive(Clone)]
pub struct UsageLedger {
    db: Database,
    config: BillingConfig,
}

impl UsageLedger {
    pub fn new(db: Database, config: BillingConfig) -> Self {
        Self { db, config }
    }

    /// Rate for a model, falling back to the configured default for
    /// anything not in the price table
    pub fn rate_for(&self, model: &str) -> ModelRate {
        MODEL_RATES
            .iter()
            .find(|(name, _)| model.starts_with(name))
            .map(|(_, rate)| *rate)
            .unwrap_or(ModelRate {
                input_per_1k: self.config.default_input_rate,
                output_per_1k: self.config.default_output_rate,
            })
    }

    /// Units charged for a completed call. Rounds up per token class and
    /// never charges less than one unit, so free-riding on tiny calls is
    /// impossible.
    pub fn price(&self, model: &str, input_tokens: u32, output_tokens: u32) -> i64 {
        let rate = self.rate_for(model);
        let input_cost = (i64::from(input_tokens) * rate.input_per_1k + 999) / 1000;
        let output_cost = (i64::from(output_tokens) * rate.output_per_1k + 999) / 1000;
        (input_cost + output_cost).max(1)
    }

    /// Charge a tenant for a completed model call
    ///
    /// Fails with [`crate::Error::InsufficientBalance`] when the balance
    /// does not cover the charge; the balance is untouched in that case.
    pub fn charge(
        &self,
        tenant_id: Uuid,
        model: &str,
        input_tokens: u32,
        output_tokens: u32,
    ) -> Result<DebitReceipt> {
        let units = self.price(model, input_tokens, output_tokens);
        let receipt = self.db.debit_balance(tenant_id, units, model, input_tokens, output_tokens)?;
        tracing::info!(
            tenant_id = %tenant_id,
            model = model,
            units = units,
            new_balance = receipt.new_balance,
            "Charged model usage"
        );
        Ok(receipt)
    }

    /// Credit from a completed purchase
    pub fn add_purchase(&self, tenant_id: Uuid, units: i64, reference: &str) -> Result<i64> {
        self.db
            .credit_balance(tenant_id, units, TransactionKind::Purchase, Some(reference))
    }

    /// Promotional or signup credit; always succeeds for a known tenant
    pub fn add_bonus(&self, tenant_id: Uuid, units: i64, reason: &str) -> Result<i64> {
        self.db
            .credit_balance(tenant_id, units, TransactionKind::Bonus, Some(reason))
    }

    /// Refund units back to a tenant
    pub fn refund(&self, tenant_id: Uuid, units: i64, reason: &str) -> Result<i64> {
        self.db
            .credit_balance(tenant_id, units, TransactionKind::Refund, Some(reason))
    }

    /// Current balance
    pub fn balance(&self, tenant_id: Uuid) -> Result<i64> {
        self.db.balance(tenant_id)
    }

    /// Ledger history, newest first
    pub fn history(&self, tenant_id: Uuid) -> Result<Vec<UsageTransaction>> {
        self.db.list_transactions(tenant_id)
    }
}
