//! Startup wiring shared by the binaries

use crate::agent::{AdapterTimeouts, Adapters, Orchestrator, TurnGraph};
use crate::auth::CallerScopedResolver;
use crate::config::AppConfig;
use crate::error::AssistantError;
use crate::ledger::{InMemoryLedger, Ledger, PgLedger};
use crate::llm::build_model;
use crate::memory::{ContextManager, InMemorySessionStore, PgSessionStore, SessionStore};
use crate::tools::create_default_registry;
use crate::tools::rates::FallbackRateSource;
use crate::Result;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber, filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Ledger and session store: Postgres when a database URL is configured, memory otherwise
pub fn build_stores(config: &AppConfig) -> Result<(Arc<dyn Ledger>, Arc<dyn SessionStore>)> {
    match &config.database_url {
        Some(url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect_lazy(url)
                .map_err(|e| {
                    AssistantError::DatabaseError(format!("Invalid database URL: {}", e))
                })?;
            info!("Ledger and session backend: postgres");
            Ok((
                Arc::new(PgLedger::new(pool.clone())),
                Arc::new(PgSessionStore::new(pool)),
            ))
        }
        None => {
            info!("Ledger and session backend: in-memory");
            Ok((
                Arc::new(InMemoryLedger::new()),
                Arc::new(InMemorySessionStore::new()),
            ))
        }
    }
}

pub async fn seed_accounts(ledger: &dyn Ledger, config: &AppConfig) -> Result<()> {
    for (name, balance) in &config.seed_accounts {
        ledger.seed_account(name, *balance).await?;
        info!(%name, %balance, "Seeded account");
    }
    Ok(())
}

/// Build the orchestrator with every adapter constructed once and injected.
pub async fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator> {
    let (ledger, sessions) = build_stores(config)?;
    seed_accounts(ledger.as_ref(), config).await?;

    let rates = Arc::new(FallbackRateSource::from_config(&config.rates)?);
    let tools = Arc::new(create_default_registry(ledger, rates));
    info!(tools = ?tools.catalog(), "Tool registry ready");

    let adapters = Adapters::from_model(build_model(&config.llm)?);

    let graph = TurnGraph::new(
        adapters.classifier,
        adapters.reasoner,
        adapters.responder,
        tools,
    )
    .with_timeouts(AdapterTimeouts::uniform(config.llm.timeout))
    .with_context(ContextManager::with_window(config.history_window));

    Ok(Orchestrator::new(
        graph,
        sessions,
        Arc::new(CallerScopedResolver),
    ))
}
