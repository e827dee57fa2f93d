//! Error types for the banking assistant

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, AssistantError>;

#[derive(Error, Debug)]
pub enum AssistantError {

    // =============================
    // Boundary Errors
    // =============================

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Session {0} belongs to another caller")]
    SessionForbidden(String),

    // =============================
    // Adapter Errors (recovered inside a turn)
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Timed out waiting for {0}")]
    Timeout(String),

    #[error("Rate source error: {0}")]
    RateSourceError(String),

    // =============================
    // Tool / State Errors
    // =============================

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid tool input: {0}")]
    InvalidToolInput(String),

    #[error("State persistence error: {0}")]
    StateError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Failures of the ledger store. Tools turn these into conversational text.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("No account for {0}")]
    AccountNotFound(String),

    #[error("Sender {0} not found")]
    SenderNotFound(String),

    #[error("Insufficient funds. {user} has ${balance:.2}")]
    InsufficientFunds { user: String, balance: Decimal },

    #[error("Transfer amount must be positive")]
    NonPositiveAmount,

    #[error("Transfer amount cannot include fractions of a cent")]
    FractionalCents,

    #[error("Cannot transfer money to yourself")]
    SelfTransfer,

    #[error("Ledger conflict persisted after {0} attempts")]
    Conflict(u32),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for LedgerError {
    fn from(e: sqlx::Error) -> Self {
        LedgerError::Storage(e.to_string())
    }
}
