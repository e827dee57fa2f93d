//! Turn orchestrator
//!
//! RESOLVE SESSION → LOCK → LOAD → APPEND → GRAPH → PERSIST → REPLY

pub mod graph;

pub use graph::{AdapterTimeouts, TurnGraph, TurnOutcome};

use crate::auth::{Caller, SessionResolver};
use crate::classifier::{IntentClassifier, KeywordIntentClassifier, LlmIntentClassifier};
use crate::conversational::{
    LlmReasoner, LlmResponder, PassThroughReasoner, Reasoner, Responder, TemplateResponder,
};
use crate::error::AssistantError;
use crate::llm::LanguageModel;
use crate::memory::{Session, SessionLocks, SessionStore};
use crate::models::TurnReply;
use crate::Result;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

const MAX_MESSAGE_CHARS: usize = 4_000;

/// Classifier, reasoner and responder, built once at startup
pub struct Adapters {
    pub classifier: Arc<dyn IntentClassifier>,
    pub reasoner: Arc<dyn Reasoner>,
    pub responder: Arc<dyn Responder>,
}

impl Adapters {
    /// Model-backed adapters, or the offline set when there is no model
    pub fn from_model(model: Option<Arc<dyn LanguageModel>>) -> Self {
        match model {
            Some(model) => {
                info!(backend = model.name(), "Using model-backed adapters");
                Self {
                    classifier: Arc::new(LlmIntentClassifier::new(model.clone())),
                    reasoner: Arc::new(LlmReasoner::new(model.clone())),
                    responder: Arc::new(LlmResponder::new(model)),
                }
            }
            None => {
                info!("No model configured, using offline adapters");
                Self {
                    classifier: Arc::new(KeywordIntentClassifier),
                    reasoner: Arc::new(PassThroughReasoner),
                    responder: Arc::new(TemplateResponder),
                }
            }
        }
    }
}

/// Main orchestrator: runs one inbound message as a turn of its session
pub struct Orchestrator {
    graph: TurnGraph,
    sessions: Arc<dyn SessionStore>,
    resolver: Arc<dyn SessionResolver>,
    locks: SessionLocks,
}

impl Orchestrator {
    pub fn new(
        graph: TurnGraph,
        sessions: Arc<dyn SessionStore>,
        resolver: Arc<dyn SessionResolver>,
    ) -> Self {
        Self {
            graph,
            sessions,
            resolver,
            locks: SessionLocks::new(),
        }
    }

    /// Execute one turn for `caller`.
    ///
    /// Only validation and session-ownership problems are returned as errors;
    /// everything else ends in a reply.
    pub async fn handle_turn(
        &self,
        caller: &Caller,
        requested_session: Option<&str>,
        message: &str,
    ) -> Result<TurnReply> {
        let message = message.trim();
        if message.is_empty() {
            return Err(AssistantError::ValidationError(
                "Message must not be empty".to_string(),
            ));
        }
        if message.chars().count() > MAX_MESSAGE_CHARS {
            return Err(AssistantError::ValidationError(format!(
                "Message exceeds {} characters",
                MAX_MESSAGE_CHARS
            )));
        }

        let session_id = self.resolver.resolve(caller, requested_session)?;
        let start_time = Instant::now();

        // Held until the reply is built; same-session turns queue here in arrival order
        let _guard = self.locks.acquire(&session_id).await;

        let (mut session, persist) = match self.sessions.get(&session_id).await {
            Ok(Some(session)) if session.principal != caller.principal => {
                warn!(
                    %session_id,
                    caller = %caller.principal,
                    "Rejected turn on another principal's session"
                );
                return Err(AssistantError::SessionForbidden(session_id));
            }
            Ok(Some(session)) => (session, true),
            Ok(None) => (Session::new(session_id.clone(), caller.principal.clone()), true),
            Err(error) => {
                warn!(
                    %session_id,
                    %error,
                    "Session load failed, continuing with a transient session"
                );
                (Session::new(session_id.clone(), caller.principal.clone()), false)
            }
        };

        session.push_user(message);
        let outcome = self.graph.run(&mut session, &caller.principal).await;

        if persist {
            if let Err(error) = self.sessions.put(&session).await {
                warn!(
                    %session_id,
                    %error,
                    "Session save failed, reply will still be returned"
                );
            }
        }

        info!(
            %session_id,
            intent = %outcome.intent,
            branch = %outcome.branch,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Turn complete"
        );

        Ok(TurnReply {
            reply: outcome.reply,
            session_id,
            intent: outcome.intent,
            trace: outcome.trace,
        })
    }
}
