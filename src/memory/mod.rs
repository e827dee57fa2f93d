//! Conversation memory
//!
//! Session state, its persistence, per-session turn serialization and the
//! history window handed to the responder.

pub mod context_manager;
pub mod locks;
pub mod session_store;
pub mod store;

pub use context_manager::{ContextConfig, ContextManager};
pub use locks::{SessionGuard, SessionLocks};
pub use session_store::{InMemorySessionStore, PgSessionStore, SessionStore};
pub use store::{ConversationMessage, MessageRole, Session};
