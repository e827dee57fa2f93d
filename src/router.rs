//! Intent → branch routing
//!
//! Every intent maps to exactly one branch. Unrecognised input lands in
//! `Conversation`.

use crate::models::Intent;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Branch {
    /// Ledger reads and transfers
    Db,
    /// External currency rates
    Info,
    Beneficiary,
    Conversation,
}

impl Branch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Db => "DB",
            Branch::Info => "INFO",
            Branch::Beneficiary => "BENEFICIARY",
            Branch::Conversation => "CONVERSATION",
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn route(intent: Intent) -> Branch {
    match intent {
        Intent::Balance | Intent::Transfer | Intent::Transactions => Branch::Db,
        Intent::AddBeneficiary => Branch::Beneficiary,
        Intent::ExchangeRate => Branch::Info,
        Intent::Conversation | Intent::Unknown => Branch::Conversation,
    }
}

/// Route a raw classifier label
pub fn route_label(label: &str) -> Branch {
    route(Intent::from_label(label))
}
