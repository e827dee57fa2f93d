//! PostgreSQL ledger
//!
//! Transfers lock both account rows (`FOR UPDATE`, ordered by id) inside one
//! transaction, so transfers sharing an account serialize while disjoint pairs
//! run in parallel. Serialization failures and deadlocks roll back and retry.

use super::{validate_transfer, BeneficiaryOutcome, Ledger, LedgerResult, TransferOutcome};
use crate::error::LedgerError;
use crate::models::TransactionRecord;
use rust_decimal::Decimal;
use sqlx::{PgPool, Row};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::{info, warn};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(25);

pub struct PgLedger {
    pool: PgPool,
    schema_ready: Arc<OnceCell<()>>,
}

impl PgLedger {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            schema_ready: Arc::new(OnceCell::new()),
        }
    }

    async fn ensure_schema(&self) -> LedgerResult<()> {
        self.schema_ready
            .get_or_try_init(|| async {
                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS users (
                      id BIGSERIAL PRIMARY KEY,
                      name TEXT NOT NULL UNIQUE
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS accounts (
                      id BIGSERIAL PRIMARY KEY,
                      user_id BIGINT NOT NULL UNIQUE REFERENCES users(id),
                      balance NUMERIC(18, 2) NOT NULL DEFAULT 0 CHECK (balance >= 0)
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE TABLE IF NOT EXISTS transactions (
                      id BIGSERIAL PRIMARY KEY,
                      account_id BIGINT NOT NULL REFERENCES accounts(id),
                      amount NUMERIC(18, 2) NOT NULL,
                      description TEXT NOT NULL DEFAULT '',
                      created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
                    );
                    "#,
                )
                .execute(&self.pool)
                .await?;

                sqlx::query(
                    r#"
                    CREATE INDEX IF NOT EXISTS idx_transactions_account_time
                    ON transactions (account_id, created_at DESC);
                    "#,
                )
                .execute(&self.pool)
                .await?;

                Ok::<(), sqlx::Error>(())
            })
            .await
            .map_err(|e| LedgerError::Storage(format!("Failed to initialize ledger schema: {}", e)))?;

        Ok(())
    }

    /// Run `op` until it commits, retrying serialization failures and deadlocks.
    async fn with_retry<T, F, Fut>(&self, op: &'static str, attempt_fn: F) -> LedgerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<LedgerResult<T>, sqlx::Error>>,
    {
        self.ensure_schema().await?;
        retry_conflicts(op, RETRY_BACKOFF, is_retryable, attempt_fn).await
    }

    async fn transfer_once(
        &self,
        from: &str,
        to: &str,
        amount: Decimal,
    ) -> Result<LedgerResult<TransferOutcome>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        // Lock in id order so two transfers over the same pair cannot deadlock
        let rows = sqlx::query(
            r#"
            SELECT a.id::BIGINT AS id, a.balance, u.name
            FROM accounts a
            JOIN users u ON u.id = a.user_id
            WHERE u.name = ANY($1)
            ORDER BY a.id
            FOR UPDATE OF a
            "#,
        )
        .bind(vec![from.to_string(), to.to_string()])
        .fetch_all(&mut *tx)
        .await?;

        let mut sender: Option<(i64, Decimal)> = None;
        let mut recipient: Option<i64> = None;
        for row in &rows {
            let name: String = row.try_get("name")?;
            if name == from {
                sender = Some((row.try_get("id")?, row.try_get("balance")?));
            } else if name == to {
                recipient = Some(row.try_get("id")?);
            }
        }

        let Some((from_id, from_balance)) = sender else {
            tx.rollback().await?;
            return Ok(Err(LedgerError::SenderNotFound(from.to_string())));
        };

        let Some(to_id) = recipient else {
            tx.rollback().await?;
            return Ok(Ok(TransferOutcome::RecipientMissing {
                recipient: to.to_string(),
            }));
        };

        if from_balance < amount {
            tx.rollback().await?;
            return Ok(Err(LedgerError::InsufficientFunds {
                user: from.to_string(),
                balance: from_balance,
            }));
        }

        let new_from: Decimal = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance - $1 WHERE id = $2 RETURNING balance",
        )
        .bind(amount)
        .bind(from_id)
        .fetch_one(&mut *tx)
        .await?;

        let new_to: Decimal = sqlx::query_scalar(
            "UPDATE accounts SET balance = balance + $1 WHERE id = $2 RETURNING balance",
        )
        .bind(amount)
        .bind(to_id)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO transactions (account_id, amount, description) VALUES ($1, $2, $3)")
            .bind(from_id)
            .bind(-amount)
            .bind(format!("Transfer to {}", to))
            .execute(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO transactions (account_id, amount, description) VALUES ($1, $2, $3)")
            .bind(to_id)
            .bind(amount)
            .bind(format!("Transfer from {}", from))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Ok(TransferOutcome::Completed {
            from_balance: new_from,
            to_balance: new_to,
        }))
    }

    async fn add_beneficiary_once(
        &self,
        name: &str,
    ) -> Result<LedgerResult<BeneficiaryOutcome>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO users (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id::BIGINT",
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            tx.rollback().await?;
            return Ok(Ok(BeneficiaryOutcome::AlreadyExists));
        };

        sqlx::query("INSERT INTO accounts (user_id, balance) VALUES ($1, 0)")
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Ok(BeneficiaryOutcome::Created))
    }

    async fn seed_account_once(
        &self,
        name: &str,
        balance: Decimal,
    ) -> Result<LedgerResult<()>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let user_id: Option<i64> = sqlx::query_scalar(
            "INSERT INTO users (name) VALUES ($1) ON CONFLICT (name) DO NOTHING RETURNING id::BIGINT",
        )
        .bind(name)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(user_id) = user_id else {
            tx.rollback().await?;
            return Ok(Ok(()));
        };

        let account_id: i64 = sqlx::query_scalar(
            "INSERT INTO accounts (user_id, balance) VALUES ($1, $2) RETURNING id::BIGINT",
        )
        .bind(user_id)
        .bind(balance)
        .fetch_one(&mut *tx)
        .await?;

        if balance > Decimal::ZERO {
            sqlx::query(
                "INSERT INTO transactions (account_id, amount, description) VALUES ($1, $2, 'Opening balance')",
            )
            .bind(account_id)
            .bind(balance)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(Ok(()))
    }
}

/// Repeat `attempt_fn` while it fails with an error `retryable` accepts, at most
/// `MAX_ATTEMPTS` times. Business outcomes (`Ok(Err(..))`) are returned as is.
async fn retry_conflicts<T, E, F, Fut>(
    op: &'static str,
    backoff: Duration,
    retryable: fn(&E) -> bool,
    mut attempt_fn: F,
) -> LedgerResult<T>
where
    E: std::fmt::Display + Into<LedgerError>,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<LedgerResult<T>, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match attempt_fn().await {
            Ok(outcome) => return outcome,
            Err(e) if retryable(&e) && attempt < MAX_ATTEMPTS => {
                warn!(op, attempt, error = %e, "Ledger transaction conflict, retrying");
                tokio::time::sleep(backoff * attempt).await;
            }
            Err(e) if retryable(&e) => {
                warn!(op, attempt, error = %e, "Ledger transaction conflict, giving up");
                return Err(LedgerError::Conflict(attempt));
            }
            Err(e) => return Err(e.into()),
        }
    }
}

fn is_retryable(error: &sqlx::Error) -> bool {
    match error {
        // serialization_failure, deadlock_detected
        sqlx::Error::Database(db) => matches!(db.code().as_deref(), Some("40001") | Some("40P01")),
        _ => false,
    }
}

#[async_trait::async_trait]
impl Ledger for PgLedger {
    async fn balance(&self, user: &str) -> LedgerResult<Decimal> {
        self.ensure_schema().await?;

        let balance: Option<Decimal> = sqlx::query_scalar(
            r#"
            SELECT a.balance
            FROM accounts a
            JOIN users u ON u.id = a.user_id
            WHERE u.name = $1
            "#,
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;

        balance.ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))
    }

    async fn transfer(&self, from: &str, to: &str, amount: Decimal) -> LedgerResult<TransferOutcome> {
        validate_transfer(from, to, amount)?;

        let outcome = self
            .with_retry("transfer", || self.transfer_once(from, to, amount))
            .await?;

        if let TransferOutcome::Completed { .. } = outcome {
            info!(%from, %to, %amount, "Transfer committed");
        }
        Ok(outcome)
    }

    async fn recent_transactions(&self, user: &str, limit: u32) -> LedgerResult<Vec<TransactionRecord>> {
        self.ensure_schema().await?;

        let account_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT a.id::BIGINT
            FROM accounts a
            JOIN users u ON u.id = a.user_id
            WHERE u.name = $1
            "#,
        )
        .bind(user)
        .fetch_optional(&self.pool)
        .await?;

        let account_id =
            account_id.ok_or_else(|| LedgerError::AccountNotFound(user.to_string()))?;

        let rows = sqlx::query(
            r#"
            SELECT id::BIGINT AS id, amount, COALESCE(description, '') AS description, created_at
            FROM transactions
            WHERE account_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(account_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                Ok(TransactionRecord {
                    id: row.try_get("id")?,
                    account_id,
                    amount: row.try_get("amount")?,
                    description: row.try_get("description")?,
                    created_at: row.try_get("created_at")?,
                })
            })
            .collect::<Result<Vec<_>, sqlx::Error>>()
            .map_err(LedgerError::from)
    }

    async fn add_beneficiary(&self, name: &str) -> LedgerResult<BeneficiaryOutcome> {
        let outcome = self
            .with_retry("add_beneficiary", || self.add_beneficiary_once(name))
            .await?;

        if outcome == BeneficiaryOutcome::Created {
            info!(%name, "Beneficiary enrolled");
        }
        Ok(outcome)
    }

    async fn seed_account(&self, name: &str, balance: Decimal) -> LedgerResult<()> {
        self.with_retry("seed_account", || self.seed_account_once(name, balance))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::fmt;

    #[derive(Debug, PartialEq)]
    enum Failure {
        Conflict,
        Broken,
    }

    impl fmt::Display for Failure {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match self {
                Failure::Conflict => f.write_str("could not serialize access"),
                Failure::Broken => f.write_str("connection reset"),
            }
        }
    }

    impl From<Failure> for LedgerError {
        fn from(failure: Failure) -> Self {
            LedgerError::Storage(failure.to_string())
        }
    }

    fn is_conflict(failure: &Failure) -> bool {
        *failure == Failure::Conflict
    }

    /// Run the retry loop over scripted attempt results; returns the result and attempt count
    async fn run_script(
        steps: Vec<Result<LedgerResult<u32>, Failure>>,
    ) -> (LedgerResult<u32>, u32) {
        let mut steps: VecDeque<_> = steps.into();
        let mut calls = 0;
        let result = retry_conflicts("test", Duration::ZERO, is_conflict, || {
            calls += 1;
            let step = steps.pop_front().unwrap_or(Err(Failure::Broken));
            async move { step }
        })
        .await;
        (result, calls)
    }

    #[tokio::test]
    async fn test_conflicts_are_retried_until_commit() {
        let (result, calls) = run_script(vec![
            Err(Failure::Conflict),
            Err(Failure::Conflict),
            Ok(Ok(7)),
        ])
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_persistent_conflict_gives_up() {
        let (result, calls) = run_script(vec![
            Err(Failure::Conflict),
            Err(Failure::Conflict),
            Err(Failure::Conflict),
            Ok(Ok(7)),
        ])
        .await;

        assert_eq!(result, Err(LedgerError::Conflict(MAX_ATTEMPTS)));
        assert_eq!(calls, MAX_ATTEMPTS);
    }

    #[tokio::test]
    async fn test_other_failures_are_not_retried() {
        let (result, calls) = run_script(vec![Err(Failure::Broken), Ok(Ok(7))]).await;
        assert_eq!(
            result,
            Err(LedgerError::Storage("connection reset".to_string()))
        );
        assert_eq!(calls, 1);

        let (result, calls) =
            run_script(vec![Ok(Err(LedgerError::SelfTransfer)), Ok(Ok(7))]).await;
        assert_eq!(result, Err(LedgerError::SelfTransfer));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_only_database_conflicts_are_retryable() {
        assert!(!is_retryable(&sqlx::Error::RowNotFound));
        assert!(!is_retryable(&sqlx::Error::PoolTimedOut));
    }
}
