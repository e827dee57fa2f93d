//! Core data models for the banking assistant

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

//
// ================= Intent =================
//

/// Fixed-vocabulary label that routes a turn to a handler branch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Balance,
    Transfer,
    Transactions,
    ExchangeRate,
    AddBeneficiary,
    Conversation,
    Unknown,
}

impl Intent {
    /// Map a free-form classifier label onto the enumerated vocabulary.
    ///
    /// Matching is containment on the lower-cased label, in priority order:
    /// balance, transfer, transaction, beneficiary, exchange/rate, conversation.
    /// Anything else (including an empty label) is `Unknown`.
    pub fn from_label(label: &str) -> Intent {
        let label = label.trim().to_lowercase();

        if label.contains("balance") {
            Intent::Balance
        } else if label.contains("transfer") {
            Intent::Transfer
        } else if label.contains("transaction") {
            Intent::Transactions
        } else if label.contains("beneficiary") {
            Intent::AddBeneficiary
        } else if label.contains("exchange") || label.contains("rate") {
            Intent::ExchangeRate
        } else if label.contains("conversation") {
            Intent::Conversation
        } else {
            Intent::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Balance => "balance",
            Intent::Transfer => "transfer",
            Intent::Transactions => "transactions",
            Intent::ExchangeRate => "exchange_rate",
            Intent::AddBeneficiary => "add_beneficiary",
            Intent::Conversation => "conversation",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

//
// ================= Multi-turn protocol =================
//

/// Follow-up a previous turn is waiting on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PendingConfirmation {
    /// A transfer hit a missing recipient; the user may confirm enrolment next turn.
    AddBeneficiary { name: String, amount: Decimal },
}

//
// ================= Tool I/O =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInput {
    pub tool_name: String,
    /// Authenticated principal the operation acts for
    pub actor: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ToolStatus {
    Success,
    /// Business rule stopped the operation; needs a follow-up turn
    SoftFail,
    NotFound,
    /// Malformed request or violated business rule; nothing was changed
    Rejected,
    /// Store or upstream failure; nothing was changed
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolOutput {
    pub tool_name: String,
    pub status: ToolStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending: Option<PendingConfirmation>,
}

impl ToolOutput {
    pub fn new(tool_name: &str, status: ToolStatus, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.to_string(),
            status,
            message: message.into(),
            pending: None,
        }
    }

    pub fn success(tool_name: &str, message: impl Into<String>) -> Self {
        Self::new(tool_name, ToolStatus::Success, message)
    }

    pub fn with_pending(mut self, pending: PendingConfirmation) -> Self {
        self.pending = Some(pending);
        self
    }
}

//
// ================= Ledger records =================
//

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionRecord {
    pub id: i64,
    pub account_id: i64,
    pub amount: Decimal,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

/// Render a money amount the way replies quote it: `$120.00`, `-$50.00`.
pub fn format_money(amount: Decimal) -> String {
    let rounded = amount.round_dp(2);
    if rounded.is_sign_negative() && !rounded.is_zero() {
        format!("-${:.2}", rounded.abs())
    } else {
        format!("${:.2}", rounded.abs())
    }
}

//
// ================= Turn result =================
//

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnReply {
    pub reply: String,
    pub session_id: String,
    pub intent: Intent,
    pub trace: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_label_priority() {
        assert_eq!(Intent::from_label("balance"), Intent::Balance);
        assert_eq!(Intent::from_label("  Transfer\n"), Intent::Transfer);
        assert_eq!(Intent::from_label("transactions"), Intent::Transactions);
        assert_eq!(Intent::from_label("add_beneficiary"), Intent::AddBeneficiary);
        assert_eq!(Intent::from_label("exchange_rate"), Intent::ExchangeRate);
        assert_eq!(Intent::from_label("rate"), Intent::ExchangeRate);
        assert_eq!(Intent::from_label("conversation"), Intent::Conversation);

        // balance wins over beneficiary when both appear
        assert_eq!(Intent::from_label("beneficiary balance"), Intent::Balance);
    }

    #[test]
    fn test_unrecognized_labels() {
        assert_eq!(Intent::from_label(""), Intent::Unknown);
        assert_eq!(Intent::from_label("weather"), Intent::Unknown);
    }

    #[test]
    fn test_format_money() {
        assert_eq!(format_money(dec!(120)), "$120.00");
        assert_eq!(format_money(dec!(-50)), "-$50.00");
        assert_eq!(format_money(dec!(0.005)), "$0.00");
        assert_eq!(format_money(dec!(19.999)), "$20.00");
    }
}
