//! Turn state machine
//!
//! NLU → {DB, INFO, BENEFICIARY, CONVERSATION} → REASONING → CONVERSATION(final) → END
//!
//! States run strictly in sequence. Every adapter call is bounded by a
//! timeout and has a fallback, so a turn always ends with one assistant
//! message; ledger failures arrive here as tool text, never as errors.

use crate::classifier::IntentClassifier;
use crate::conversational::{Reasoner, Responder, ResponseRequest};
use crate::memory::{ContextManager, Session};
use crate::models::{format_money, Intent, PendingConfirmation, ToolInput, ToolOutput, ToolStatus};
use crate::router::{route, Branch};
use crate::tools::extract::{self, TransferParse};
use crate::tools::{
    ToolRegistry, ADD_BENEFICIARY_TOOL, BALANCE_TOOL, EXCHANGE_RATE_TOOL, TRANSACTIONS_TOOL,
    TRANSFER_TOOL,
};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const CANNOT_HANDLE: &str = "I don't know how to handle that request.";
const NO_OPERATION_SUMMARY: &str = "No banking operation was needed for this message.";
const RESPONDER_APOLOGY: &str = "Sorry, I'm having trouble answering right now. \
I can still help with balances, transfers, transactions, exchange rates and beneficiaries.";
const EMPTY_TURN_REPLY: &str = "Sorry, I wasn't able to process that.";

/// Upper bounds for each adapter call
#[derive(Debug, Clone, Copy)]
pub struct AdapterTimeouts {
    pub classify: Duration,
    pub reason: Duration,
    pub respond: Duration,
}

impl AdapterTimeouts {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            classify: timeout,
            reason: timeout,
            respond: timeout,
        }
    }
}

impl Default for AdapterTimeouts {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(30))
    }
}

/// Output of the branch state, fed to REASONING
#[derive(Debug, Clone)]
enum BranchResult {
    Tool(ToolOutput),
    /// Could not build a tool call from the message; nothing was executed
    Clarify(String),
    /// Plain conversation, no operation
    Chat,
}

impl BranchResult {
    fn text(&self) -> Option<&str> {
        match self {
            BranchResult::Tool(output) => Some(&output.message),
            BranchResult::Clarify(text) => Some(text),
            BranchResult::Chat => None,
        }
    }
}

/// What one run of the graph produced
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub intent: Intent,
    pub branch: Branch,
    pub reply: String,
    pub trace: Vec<String>,
}

pub struct TurnGraph {
    classifier: Arc<dyn IntentClassifier>,
    reasoner: Arc<dyn Reasoner>,
    responder: Arc<dyn Responder>,
    tools: Arc<ToolRegistry>,
    context: ContextManager,
    timeouts: AdapterTimeouts,
}

async fn bounded<T, F>(limit: Duration, fut: F) -> crate::Result<T>
where
    F: Future<Output = crate::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(crate::error::AssistantError::Timeout(format!(
            "adapter call after {:?}",
            limit
        ))),
    }
}

impl TurnGraph {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        reasoner: Arc<dyn Reasoner>,
        responder: Arc<dyn Responder>,
        tools: Arc<ToolRegistry>,
    ) -> Self {
        Self {
            classifier,
            reasoner,
            responder,
            tools,
            context: ContextManager::new(),
            timeouts: AdapterTimeouts::default(),
        }
    }

    pub fn with_timeouts(mut self, timeouts: AdapterTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn with_context(mut self, context: ContextManager) -> Self {
        self.context = context;
        self
    }

    /// Run one turn over `session`, whose latest message is the user's.
    ///
    /// Appends exactly one assistant message unless the session has no user
    /// message at all, in which case nothing is touched.
    pub async fn run(&self, session: &mut Session, actor: &str) -> TurnOutcome {
        let mut trace = Vec::with_capacity(6);

        // -------------------------------------------------
        // NLU
        // -------------------------------------------------
        let Some(message) = session.last_user_message().map(|m| m.content.clone()) else {
            warn!(session_id = %session.session_id, "Turn started with empty history");
            trace.push("NLU: empty history, intent=unknown".to_string());
            return TurnOutcome {
                intent: Intent::Unknown,
                branch: Branch::Conversation,
                reply: EMPTY_TURN_REPLY.to_string(),
                trace,
            };
        };

        let pending = session.take_pending();
        let intent = self.classify(&message, &mut trace).await;
        let branch = route(intent);

        debug!(session_id = %session.session_id, %intent, %branch, "Routed turn");
        trace.push(format!("ROUTE: {}", branch));

        if pending.is_some() && branch != Branch::Beneficiary {
            debug!(session_id = %session.session_id, "Discarding pending confirmation");
            trace.push("PENDING: discarded".to_string());
        }

        // -------------------------------------------------
        // DB / INFO / BENEFICIARY / CONVERSATION
        // -------------------------------------------------
        let result = match branch {
            Branch::Db => self.db_branch(intent, actor, &message).await,
            Branch::Info => self.info_branch(actor, &message).await,
            Branch::Beneficiary => {
                self.beneficiary_branch(actor, &message, pending.as_ref())
                    .await
            }
            Branch::Conversation => BranchResult::Chat,
        };

        match &result {
            BranchResult::Tool(output) => {
                trace.push(format!("{}: {} -> {:?}", branch, output.tool_name, output.status));
                if let Some(pending) = &output.pending {
                    info!(session_id = %session.session_id, ?pending, "Awaiting confirmation");
                    session.pending_confirmation = Some(pending.clone());
                }
            }
            BranchResult::Clarify(_) => trace.push(format!("{}: clarification requested", branch)),
            BranchResult::Chat => trace.push(format!("{}: no tool", branch)),
        }

        // -------------------------------------------------
        // REASONING
        // -------------------------------------------------
        let reasoning = match result.text() {
            Some(tool_text) => {
                match bounded(self.timeouts.reason, self.reasoner.interpret(tool_text)).await {
                    Ok(summary) if !summary.trim().is_empty() => {
                        trace.push("REASONING: ok".to_string());
                        summary
                    }
                    Ok(_) => {
                        trace.push("REASONING: empty, using tool text".to_string());
                        tool_text.to_string()
                    }
                    Err(e) => {
                        warn!(session_id = %session.session_id, error = %e, "Reasoner failed, using tool text");
                        trace.push("REASONING: fallback to tool text".to_string());
                        tool_text.to_string()
                    }
                }
            }
            None => {
                trace.push("REASONING: nothing to interpret".to_string());
                NO_OPERATION_SUMMARY.to_string()
            }
        };

        // -------------------------------------------------
        // CONVERSATION (final)
        // -------------------------------------------------
        let grounded = result.text().is_some();
        let responded = {
            let request = ResponseRequest {
                reasoning: &reasoning,
                grounded,
                history: self.context.prior_context(session),
                message: &message,
            };
            bounded(self.timeouts.respond, self.responder.respond(&request)).await
        };

        let reply = match responded {
            Ok(reply) if !reply.trim().is_empty() => {
                trace.push("CONVERSATION: reply ready".to_string());
                reply
            }
            other => {
                if let Err(e) = other {
                    warn!(session_id = %session.session_id, error = %e, "Responder failed, using fallback reply");
                }
                trace.push("CONVERSATION: fallback reply".to_string());
                result
                    .text()
                    .map(str::to_string)
                    .unwrap_or_else(|| RESPONDER_APOLOGY.to_string())
            }
        };

        session.push_assistant(reply.clone());
        session.last_intent = Some(intent);
        session.last_reasoning = Some(reasoning);
        session.last_tool_result = match result {
            BranchResult::Tool(output) => Some(output),
            _ => None,
        };

        TurnOutcome {
            intent,
            branch,
            reply,
            trace,
        }
    }

    async fn classify(&self, message: &str, trace: &mut Vec<String>) -> Intent {
        match bounded(self.timeouts.classify, self.classifier.classify(message)).await {
            Ok(intent) => {
                trace.push(format!("NLU: intent={}", intent));
                intent
            }
            Err(e) => {
                warn!(error = %e, "Classifier failed, routing to conversation");
                trace.push("NLU: classifier unavailable, intent=conversation".to_string());
                Intent::Conversation
            }
        }
    }

    async fn run_tool(&self, tool_name: &str, actor: &str, parameters: Value) -> BranchResult {
        let input = ToolInput {
            tool_name: tool_name.to_string(),
            actor: actor.to_string(),
            parameters,
        };

        match self.tools.execute(&input).await {
            Ok(output) => BranchResult::Tool(output),
            Err(e) => {
                warn!(tool_name, error = %e, "Tool invocation failed");
                BranchResult::Tool(ToolOutput::new(tool_name, ToolStatus::Failed, CANNOT_HANDLE))
            }
        }
    }

    async fn db_branch(&self, intent: Intent, actor: &str, message: &str) -> BranchResult {
        match intent {
            Intent::Balance => self.run_tool(BALANCE_TOOL, actor, json!({})).await,
            Intent::Transactions => {
                let limit = extract::parse_history_limit(message);
                self.run_tool(TRANSACTIONS_TOOL, actor, json!({ "limit": limit }))
                    .await
            }
            Intent::Transfer => match extract::parse_transfer(message) {
                TransferParse::Complete(request) => {
                    self.run_tool(
                        TRANSFER_TOOL,
                        actor,
                        json!({
                            "to": request.recipient,
                            "amount": request.amount.to_string(),
                        }),
                    )
                    .await
                }
                TransferParse::MissingAmount {
                    recipient: Some(recipient),
                } => BranchResult::Clarify(format!(
                    "How much would you like to send to {}?",
                    recipient
                )),
                TransferParse::MissingAmount { recipient: None } => BranchResult::Clarify(
                    "Please tell me the amount and the recipient, like 'send $50 to Bob'."
                        .to_string(),
                ),
                TransferParse::MissingRecipient { amount } => BranchResult::Clarify(format!(
                    "Who should receive the {}? For example 'send {} to Bob'.",
                    format_money(amount),
                    format_money(amount)
                )),
            },
            _ => BranchResult::Clarify(CANNOT_HANDLE.to_string()),
        }
    }

    async fn info_branch(&self, actor: &str, message: &str) -> BranchResult {
        match extract::parse_currency_pair(message) {
            Some((base, target)) => {
                self.run_tool(
                    EXCHANGE_RATE_TOOL,
                    actor,
                    json!({ "base": base, "target": target }),
                )
                .await
            }
            None => BranchResult::Clarify(
                "Which two currencies should I compare? For example 'USD to EUR'.".to_string(),
            ),
        }
    }

    async fn beneficiary_branch(
        &self,
        actor: &str,
        message: &str,
        pending: Option<&PendingConfirmation>,
    ) -> BranchResult {
        let pending_name = pending.map(|PendingConfirmation::AddBeneficiary { name, .. }| name.clone());

        let Some(name) = extract::parse_beneficiary_name(message).or(pending_name) else {
            return BranchResult::Clarify(
                "Couldn't identify the beneficiary's name. Please specify like 'add Charlie'."
                    .to_string(),
            );
        };

        let mut parameters = json!({ "name": name });
        if let Some(PendingConfirmation::AddBeneficiary {
            name: pending_name,
            amount,
        }) = pending
        {
            if *pending_name == name {
                parameters["retry_amount"] = json!(amount.to_string());
            }
        }

        self.run_tool(ADD_BENEFICIARY_TOOL, actor, parameters).await
    }
}
