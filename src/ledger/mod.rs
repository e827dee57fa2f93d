//! Ledger store port
//!
//! Users, accounts and transactions behind one transactional interface.
//! Every mutating operation is all-or-nothing: a transfer applies both
//! balance updates and both transaction rows, or none of them.

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedger;
pub use postgres::PgLedger;

use crate::error::LedgerError;
use crate::models::TransactionRecord;
use rust_decimal::Decimal;

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;

/// Result of a transfer that did not hit a hard failure
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Completed {
        from_balance: Decimal,
        to_balance: Decimal,
    },
    /// Recipient has no account; nothing was written
    RecipientMissing { recipient: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeneficiaryOutcome {
    Created,
    AlreadyExists,
}

#[async_trait::async_trait]
pub trait Ledger: Send + Sync {
    /// Current balance of `user`'s account
    async fn balance(&self, user: &str) -> LedgerResult<Decimal>;

    /// Move `amount` from `from` to `to` atomically. Not idempotent.
    async fn transfer(&self, from: &str, to: &str, amount: Decimal) -> LedgerResult<TransferOutcome>;

    /// Most recent transactions first, at most `limit` rows
    async fn recent_transactions(&self, user: &str, limit: u32) -> LedgerResult<Vec<TransactionRecord>>;

    /// Create user + zero-balance account unless the name is taken
    async fn add_beneficiary(&self, name: &str) -> LedgerResult<BeneficiaryOutcome>;

    /// Create user + account with an opening balance transaction (dev/demo data)
    async fn seed_account(&self, name: &str, balance: Decimal) -> LedgerResult<()>;
}

/// Amounts are whole cents; both stores keep two decimal places.
pub const MONEY_SCALE: u32 = 2;

pub(crate) fn validate_transfer(from: &str, to: &str, amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::NonPositiveAmount);
    }
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(LedgerError::FractionalCents);
    }
    if from == to {
        return Err(LedgerError::SelfTransfer);
    }
    Ok(())
}
