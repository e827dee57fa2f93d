//! In-memory ledger for development and tests
//!
//! All state sits behind one `RwLock`; a mutation holds the write guard for
//! its whole duration, so no intermediate state is ever observable.

use super::{validate_transfer, BeneficiaryOutcome, Ledger, LedgerResult, TransferOutcome};
use crate::error::LedgerError;
use crate::models::TransactionRecord;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

#[derive(Debug, Clone)]
struct AccountRow {
    id: i64,
    balance: Decimal,
}

#[derive(Debug, Default)]
struct LedgerState {
    /// user name → account
    accounts: HashMap<String, AccountRow>,
    transactions: Vec<TransactionRecord>,
    next_account_id: i64,
    next_transaction_id: i64,
}

impl LedgerState {
    fn open_account(&mut self, name: &str) -> i64 {
        self.next_account_id += 1;
        let id = self.next_account_id;
        self.accounts.insert(
            name.to_string(),
            AccountRow {
                id,
                balance: Decimal::ZERO,
            },
        );
        id
    }

    fn record(&mut self, account_id: i64, amount: Decimal, description: String) {
        self.next_transaction_id += 1;
        self.transactions.push(TransactionRecord {
            id: self.next_transaction_id,
            account_id,
            amount,
            description,
            created_at: Utc::now(),
        });
    }
}

#[derive(Default, Clone)]
pub struct InMemoryLedger {
    state: Arc<RwLock<LedgerState>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of enrolled users
    pub async fn user_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    /// Total number of transaction rows across all accounts
    pub async fn transaction_count(&self) -> usize {
        self.state.read().await.transactions.len()
    }
}

#[async_trait::async_trait]
impl Ledger for InMemoryLedger {
    async fn balance(&self, user: &str) -> LedgerResult<Decimal> {
        let state = self.state.read().await;
        state
            .accounts
            .get(user)
            .map(|a| a.balance)
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))
    }

    async fn transfer(&self, from: &str, to: &str, amount: Decimal) -> LedgerResult<TransferOutcome> {
        validate_transfer(from, to, amount)?;

        let mut state = self.state.write().await;

        let sender = state
            .accounts
            .get(from)
            .cloned()
            .ok_or_else(|| LedgerError::SenderNotFound(from.to_string()))?;

        let Some(recipient) = state.accounts.get(to).cloned() else {
            return Ok(TransferOutcome::RecipientMissing {
                recipient: to.to_string(),
            });
        };

        if sender.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                user: from.to_string(),
                balance: sender.balance,
            });
        }

        let from_balance = sender.balance - amount;
        let to_balance = recipient.balance + amount;

        if let Some(account) = state.accounts.get_mut(from) {
            account.balance = from_balance;
        }
        if let Some(account) = state.accounts.get_mut(to) {
            account.balance = to_balance;
        }
        state.record(sender.id, -amount, format!("Transfer to {}", to));
        state.record(recipient.id, amount, format!("Transfer from {}", from));

        info!(%from, %to, %amount, "Transfer committed");

        Ok(TransferOutcome::Completed {
            from_balance,
            to_balance,
        })
    }

    async fn recent_transactions(&self, user: &str, limit: u32) -> LedgerResult<Vec<TransactionRecord>> {
        let state = self.state.read().await;
        let account = state
            .accounts
            .get(user)
            .ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))?;

        let mut rows: Vec<TransactionRecord> = state
            .transactions
            .iter()
            .filter(|t| t.account_id == account.id)
            .cloned()
            .collect();

        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        rows.truncate(limit as usize);

        Ok(rows)
    }

    async fn add_beneficiary(&self, name: &str) -> LedgerResult<BeneficiaryOutcome> {
        let mut state = self.state.write().await;

        if state.accounts.contains_key(name) {
            return Ok(BeneficiaryOutcome::AlreadyExists);
        }

        state.open_account(name);
        info!(%name, "Beneficiary enrolled");

        Ok(BeneficiaryOutcome::Created)
    }

    async fn seed_account(&self, name: &str, balance: Decimal) -> LedgerResult<()> {
        let mut state = self.state.write().await;

        if state.accounts.contains_key(name) {
            return Ok(());
        }

        let id = state.open_account(name);
        if balance > Decimal::ZERO {
            if let Some(account) = state.accounts.get_mut(name) {
                account.balance = balance;
            }
            state.record(id, balance, "Opening balance".to_string());
        }

        Ok(())
    }
}
