//! Tool trait and registry
//!
//! Tools are deterministic ledger operations plus the currency-rate lookup.
//! Business outcomes (missing accounts, insufficient funds, unknown
//! recipients) come back as `ToolOutput` text; only malformed parameters are
//! returned as errors.

pub mod extract;
pub mod rates;

use crate::error::{AssistantError, LedgerError};
use crate::ledger::{BeneficiaryOutcome, Ledger, TransferOutcome};
use crate::models::{format_money, PendingConfirmation, ToolInput, ToolOutput, ToolStatus};
use crate::Result;
use rates::ExchangeRateSource;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

pub const BALANCE_TOOL: &str = "get_balance";
pub const TRANSFER_TOOL: &str = "transfer_money";
pub const TRANSACTIONS_TOOL: &str = "list_transactions";
pub const EXCHANGE_RATE_TOOL: &str = "get_exchange_rate";
pub const ADD_BENEFICIARY_TOOL: &str = "add_beneficiary";

/// Trait for a single tool (deterministic execution)
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput>;
}

/// Tool registry for looking up and executing tools
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// (name, description) of every registered tool, sorted by name
    pub fn catalog(&self) -> Vec<(&str, &'static str)> {
        let mut entries: Vec<_> = self
            .tools
            .iter()
            .map(|(name, tool)| (name.as_str(), tool.description()))
            .collect();
        entries.sort_unstable_by_key(|(name, _)| *name);
        entries
    }

    /// Look up `input.tool_name` and run it
    pub async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let tool = self
            .get(&input.tool_name)
            .ok_or_else(|| AssistantError::ToolNotFound(input.tool_name.clone()))?;

        debug!(tool_name = %input.tool_name, actor = %input.actor, "Executing tool");
        let output = tool.execute(input).await?;
        debug!(tool_name = %input.tool_name, status = ?output.status, "Tool finished");

        Ok(output)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn ensure_object_parameters(input: &ToolInput) -> Result<()> {
    if input.parameters.is_object() || input.parameters.is_null() {
        Ok(())
    } else {
        Err(AssistantError::InvalidToolInput(
            "tool parameters must be a JSON object".to_string(),
        ))
    }
}

fn require_str<'a>(input: &'a ToolInput, key: &str) -> Result<&'a str> {
    input
        .parameters
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            AssistantError::InvalidToolInput(format!(
                "Expected '{}' for {}",
                key, input.tool_name
            ))
        })
}

/// Decimal parameters arrive as strings (serde default) or JSON numbers
fn decimal_param(input: &ToolInput, key: &str) -> Result<Option<Decimal>> {
    let parsed = match input.parameters.get(key) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(s)) => Decimal::from_str(s.trim()).ok(),
        Some(Value::Number(n)) => Decimal::from_str(&n.to_string()).ok(),
        Some(_) => None,
    };

    parsed.map(Some).ok_or_else(|| {
        AssistantError::InvalidToolInput(format!(
            "'{}' must be a decimal amount for {}",
            key, input.tool_name
        ))
    })
}

/// Ledger names are stored capitalised; the token subject may not be.
fn actor_name(input: &ToolInput) -> String {
    extract::normalize_name(input.actor.trim())
}

/// Turn a ledger failure into result text. Nothing was written in any of these cases.
fn ledger_failure(tool_name: &str, error: LedgerError) -> ToolOutput {
    match error {
        LedgerError::AccountNotFound(_) | LedgerError::SenderNotFound(_) => {
            ToolOutput::new(tool_name, ToolStatus::NotFound, format!("{}.", error))
        }
        LedgerError::InsufficientFunds { .. }
        | LedgerError::NonPositiveAmount
        | LedgerError::FractionalCents
        | LedgerError::SelfTransfer => {
            ToolOutput::new(tool_name, ToolStatus::Rejected, format!("{}.", error))
        }
        LedgerError::Conflict(_) | LedgerError::Storage(_) => {
            warn!(tool_name, error = %error, "Ledger operation failed");
            ToolOutput::new(
                tool_name,
                ToolStatus::Failed,
                "The ledger is unavailable right now. No changes were made, please try again shortly.",
            )
        }
    }
}

//
// ================= Balance =================
//

pub struct BalanceTool {
    ledger: Arc<dyn Ledger>,
}

impl BalanceTool {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for BalanceTool {
    fn name(&self) -> &'static str {
        BALANCE_TOOL
    }

    fn description(&self) -> &'static str {
        "Current balance of the caller's account"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        let actor = actor_name(input);
        match self.ledger.balance(&actor).await {
            Ok(balance) => Ok(ToolOutput::success(
                self.name(),
                format!("{}'s balance is {}", actor, format_money(balance)),
            )),
            Err(e) => Ok(ledger_failure(self.name(), e)),
        }
    }
}

//
// ================= Transfer =================
//

pub struct TransferTool {
    ledger: Arc<dyn Ledger>,
}

impl TransferTool {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for TransferTool {
    fn name(&self) -> &'static str {
        TRANSFER_TOOL
    }

    fn description(&self) -> &'static str {
        "Move money from the caller to an enrolled beneficiary"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let recipient = extract::normalize_name(require_str(input, "to")?);
        let amount = decimal_param(input, "amount")?.ok_or_else(|| {
            AssistantError::InvalidToolInput("Expected 'amount' for transfer_money".to_string())
        })?;

        let actor = actor_name(input);

        match self.ledger.transfer(&actor, &recipient, amount).await {
            Ok(TransferOutcome::Completed { from_balance, .. }) => Ok(ToolOutput::success(
                self.name(),
                format!(
                    "Transferred {} from {} to {}. {}'s new balance is {}",
                    format_money(amount),
                    actor,
                    recipient,
                    actor,
                    format_money(from_balance)
                ),
            )),
            Ok(TransferOutcome::RecipientMissing { recipient }) => Ok(ToolOutput::new(
                self.name(),
                ToolStatus::SoftFail,
                format!(
                    "Beneficiary '{}' does not exist. Please confirm if you want to add {} as a new beneficiary.",
                    recipient, recipient
                ),
            )
            .with_pending(PendingConfirmation::AddBeneficiary {
                name: recipient,
                amount,
            })),
            Err(e) => Ok(ledger_failure(self.name(), e)),
        }
    }
}

//
// ================= Transaction history =================
//

pub struct TransactionsTool {
    ledger: Arc<dyn Ledger>,
}

impl TransactionsTool {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for TransactionsTool {
    fn name(&self) -> &'static str {
        TRANSACTIONS_TOOL
    }

    fn description(&self) -> &'static str {
        "Most recent transactions on the caller's account"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let limit = input
            .parameters
            .get("limit")
            .and_then(Value::as_u64)
            .map(|n| n.clamp(1, u64::from(extract::MAX_HISTORY_LIMIT)) as u32)
            .unwrap_or(extract::DEFAULT_HISTORY_LIMIT);

        let actor = actor_name(input);
        let rows = match self.ledger.recent_transactions(&actor, limit).await {
            Ok(rows) => rows,
            Err(e) => return Ok(ledger_failure(self.name(), e)),
        };

        if rows.is_empty() {
            return Ok(ToolOutput::success(
                self.name(),
                format!("No transactions for {}", actor),
            ));
        }

        let mut message = format!("Last {} transactions for {}:", rows.len(), actor);
        for row in &rows {
            message.push_str(&format!(
                "\n- {} | {} | {}",
                row.created_at.format("%Y-%m-%d %H:%M"),
                format_money(row.amount),
                row.description
            ));
        }

        Ok(ToolOutput::success(self.name(), message))
    }
}

//
// ================= Beneficiary enrolment =================
//

pub struct AddBeneficiaryTool {
    ledger: Arc<dyn Ledger>,
}

impl AddBeneficiaryTool {
    pub fn new(ledger: Arc<dyn Ledger>) -> Self {
        Self { ledger }
    }
}

#[async_trait::async_trait]
impl Tool for AddBeneficiaryTool {
    fn name(&self) -> &'static str {
        ADD_BENEFICIARY_TOOL
    }

    fn description(&self) -> &'static str {
        "Enrol a new beneficiary with a zero-balance account"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let name = extract::normalize_name(require_str(input, "name")?);
        // set when this enrolment answers an earlier transfer soft-fail
        let retry_amount = decimal_param(input, "retry_amount")?;

        match self.ledger.add_beneficiary(&name).await {
            Ok(BeneficiaryOutcome::AlreadyExists) => Ok(ToolOutput::success(
                self.name(),
                format!("Beneficiary {} already exists.", name),
            )),
            Ok(BeneficiaryOutcome::Created) => {
                let mut message = format!("Beneficiary {} has been added successfully.", name);
                if let Some(amount) = retry_amount {
                    message.push_str(&format!(
                        " You can now retry the transfer of {} to {}.",
                        format_money(amount),
                        name
                    ));
                }
                Ok(ToolOutput::success(self.name(), message))
            }
            Err(e) => Ok(ledger_failure(self.name(), e)),
        }
    }
}

//
// ================= Exchange rate =================
//

pub struct ExchangeRateTool {
    source: Arc<dyn ExchangeRateSource>,
}

impl ExchangeRateTool {
    pub fn new(source: Arc<dyn ExchangeRateSource>) -> Self {
        Self { source }
    }
}

#[async_trait::async_trait]
impl Tool for ExchangeRateTool {
    fn name(&self) -> &'static str {
        EXCHANGE_RATE_TOOL
    }

    fn description(&self) -> &'static str {
        "Live currency conversion rate between two currencies"
    }

    async fn execute(&self, input: &ToolInput) -> Result<ToolOutput> {
        ensure_object_parameters(input)?;
        let base = require_str(input, "base")?.to_uppercase();
        let target = require_str(input, "target")?.to_uppercase();

        match self.source.lookup(&base, &target).await {
            Ok(quote) => Ok(ToolOutput::success(self.name(), quote)),
            Err(e) => {
                warn!(%base, %target, error = %e, "Exchange rate lookup failed");
                Ok(ToolOutput::new(
                    self.name(),
                    ToolStatus::Failed,
                    format!(
                        "Could not fetch the exchange rate for {}->{} right now.",
                        base, target
                    ),
                ))
            }
        }
    }
}

/// Registry with every ledger tool plus the rate lookup.
pub fn create_default_registry(
    ledger: Arc<dyn Ledger>,
    rates: Arc<dyn ExchangeRateSource>,
) -> ToolRegistry {
    let mut registry = ToolRegistry::new();

    registry.register(Arc::new(BalanceTool::new(ledger.clone())));
    registry.register(Arc::new(TransferTool::new(ledger.clone())));
    registry.register(Arc::new(TransactionsTool::new(ledger.clone())));
    registry.register(Arc::new(AddBeneficiaryTool::new(ledger)));
    registry.register(Arc::new(ExchangeRateTool::new(rates)));

    registry
}

#[cfg(test)]
mod tests {
    use super::rates::testing::StaticRateSource;
    use super::*;
    use crate::ledger::InMemoryLedger;
    use rust_decimal_macros::dec;
    use serde_json::json;

    async fn registry() -> (ToolRegistry, InMemoryLedger) {
        let ledger = InMemoryLedger::new();
        ledger.seed_account("Alice", dec!(120)).await.unwrap();
        ledger.seed_account("Bob", dec!(10)).await.unwrap();

        let registry = create_default_registry(
            Arc::new(ledger.clone()),
            Arc::new(StaticRateSource {
                quote: Some("1 USD = 0.9200 EUR".to_string()),
            }),
        );
        (registry, ledger)
    }

    fn input(tool: &str, actor: &str, parameters: Value) -> ToolInput {
        ToolInput {
            tool_name: tool.to_string(),
            actor: actor.to_string(),
            parameters,
        }
    }

    #[tokio::test]
    async fn test_balance_text() {
        let (registry, _) = registry().await;

        let output = registry
            .execute(&input(BALANCE_TOOL, "Alice", json!({})))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(output.message, "Alice's balance is $120.00");

        let missing = registry
            .execute(&input(BALANCE_TOOL, "Nobody", json!({})))
            .await
            .unwrap();
        assert_eq!(missing.status, ToolStatus::NotFound);
        assert_eq!(missing.message, "No account for Nobody.");
    }

    #[tokio::test]
    async fn test_actor_is_matched_like_stored_names() {
        let (registry, ledger) = registry().await;

        let output = registry
            .execute(&input(BALANCE_TOOL, "alice", json!({})))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(output.message, "Alice's balance is $120.00");

        let output = registry
            .execute(&input(TRANSFER_TOOL, " ALICE", json!({"to": "bob", "amount": "20"})))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Success);
        assert_eq!(
            output.message,
            "Transferred $20.00 from Alice to Bob. Alice's new balance is $100.00"
        );
        assert_eq!(ledger.balance("Bob").await.unwrap(), dec!(30));

        let output = registry
            .execute(&input(TRANSFER_TOOL, "alice", json!({"to": "Alice", "amount": "5"})))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Rejected);
    }

    #[tokio::test]
    async fn test_transfer_to_unknown_recipient_sets_pending() {
        let (registry, ledger) = registry().await;
        let before = ledger.transaction_count().await;

        let output = registry
            .execute(&input(TRANSFER_TOOL, "Alice", json!({"to": "zoe", "amount": "50"})))
            .await
            .unwrap();

        assert_eq!(output.status, ToolStatus::SoftFail);
        assert!(output.message.contains("Beneficiary 'Zoe' does not exist"));
        assert_eq!(
            output.pending,
            Some(PendingConfirmation::AddBeneficiary {
                name: "Zoe".to_string(),
                amount: dec!(50),
            })
        );
        assert_eq!(ledger.balance("Alice").await.unwrap(), dec!(120));
        assert_eq!(ledger.transaction_count().await, before);
    }

    #[tokio::test]
    async fn test_transfer_outcomes_as_text() {
        let (registry, ledger) = registry().await;

        let done = registry
            .execute(&input(TRANSFER_TOOL, "Alice", json!({"to": "Bob", "amount": 50})))
            .await
            .unwrap();
        assert_eq!(done.status, ToolStatus::Success);
        assert!(done.message.contains("Transferred $50.00 from Alice to Bob"));
        assert!(done.message.contains("$70.00"));

        let poor = registry
            .execute(&input(TRANSFER_TOOL, "Bob", json!({"to": "Alice", "amount": "500"})))
            .await
            .unwrap();
        assert_eq!(poor.status, ToolStatus::Rejected);
        assert_eq!(poor.message, "Insufficient funds. Bob has $60.00.");

        let negative = registry
            .execute(&input(TRANSFER_TOOL, "Alice", json!({"to": "Bob", "amount": "-5"})))
            .await
            .unwrap();
        assert_eq!(negative.message, "Transfer amount must be positive.");

        assert_eq!(ledger.balance("Bob").await.unwrap(), dec!(60));
    }

    #[tokio::test]
    async fn test_transfer_requires_parameters() {
        let (registry, _) = registry().await;

        let err = registry
            .execute(&input(TRANSFER_TOOL, "Alice", json!({"amount": "5"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidToolInput(_)));

        let err = registry
            .execute(&input(TRANSFER_TOOL, "Alice", json!({"to": "Bob", "amount": "lots"})))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::InvalidToolInput(_)));
    }

    #[tokio::test]
    async fn test_transactions_listing() {
        let (registry, ledger) = registry().await;
        ledger.add_beneficiary("Zoe").await.unwrap();

        let empty = registry
            .execute(&input(TRANSACTIONS_TOOL, "Zoe", json!({})))
            .await
            .unwrap();
        assert_eq!(empty.status, ToolStatus::Success);
        assert_eq!(empty.message, "No transactions for Zoe");

        ledger.transfer("Alice", "Bob", dec!(5)).await.unwrap();
        let listed = registry
            .execute(&input(TRANSACTIONS_TOOL, "Alice", json!({"limit": 1})))
            .await
            .unwrap();
        assert!(listed.message.starts_with("Last 1 transactions for Alice:"));
        assert!(listed.message.contains("-$5.00 | Transfer to Bob"));
        assert!(!listed.message.contains("Opening balance"));
    }

    #[tokio::test]
    async fn test_add_beneficiary_twice() {
        let (registry, ledger) = registry().await;

        let first = registry
            .execute(&input(
                ADD_BENEFICIARY_TOOL,
                "Alice",
                json!({"name": "Zoe", "retry_amount": "50"}),
            ))
            .await
            .unwrap();
        assert_eq!(
            first.message,
            "Beneficiary Zoe has been added successfully. You can now retry the transfer of $50.00 to Zoe."
        );
        let users = ledger.user_count().await;

        let second = registry
            .execute(&input(ADD_BENEFICIARY_TOOL, "Alice", json!({"name": "zoe"})))
            .await
            .unwrap();
        assert_eq!(second.message, "Beneficiary Zoe already exists.");
        assert_eq!(ledger.user_count().await, users);
    }

    #[tokio::test]
    async fn test_exchange_rate_degrades_to_text() {
        let (registry, _) = registry().await;

        let quote = registry
            .execute(&input(EXCHANGE_RATE_TOOL, "Alice", json!({"base": "usd", "target": "eur"})))
            .await
            .unwrap();
        assert_eq!(quote.message, "1 USD = 0.9200 EUR");

        let failing = ExchangeRateTool::new(Arc::new(StaticRateSource { quote: None }));
        let output = failing
            .execute(&input(EXCHANGE_RATE_TOOL, "Alice", json!({"base": "USD", "target": "JPY"})))
            .await
            .unwrap();
        assert_eq!(output.status, ToolStatus::Failed);
        assert!(output.message.contains("USD->JPY"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let (registry, _) = registry().await;
        let names: Vec<&str> = registry.catalog().iter().map(|(name, _)| *name).collect();
        assert_eq!(
            names,
            vec![
                ADD_BENEFICIARY_TOOL,
                BALANCE_TOOL,
                EXCHANGE_RATE_TOOL,
                TRANSACTIONS_TOOL,
                TRANSFER_TOOL,
            ]
        );
        assert!(registry.catalog().iter().all(|(_, description)| !description.is_empty()));

        let err = registry
            .execute(&input("wire_abroad", "Alice", json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, AssistantError::ToolNotFound(_)));
    }
}
