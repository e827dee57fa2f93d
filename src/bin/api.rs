use banking_assistant::{
    api::{create_router, start_server, ApiState},
    auth::TokenService,
    bootstrap::{build_orchestrator, init_tracing},
    config::{AppConfig, DEV_JWT_SECRET},
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;

    info!("Banking Assistant - API Server");
    info!(port = config.port, backend = ?config.llm.backend, "Configuration loaded");

    let orchestrator = Arc::new(build_orchestrator(&config).await?);
    let tokens = Arc::new(TokenService::new(&config.jwt_secret));

    info!("Orchestrator initialized");

    if config.jwt_secret == DEV_JWT_SECRET {
        let user = std::env::var("ASSISTANT_USER").unwrap_or_else(|_| "Alice".to_string());
        let token = tokens.issue(&user, Duration::from_secs(24 * 3600))?;
        info!(%user, %token, "Development token (24h)");
    }

    let router = create_router(
        ApiState {
            orchestrator,
            tokens,
        },
        &config.cors_origins,
    );

    start_server(router, config.port).await?;

    Ok(())
}
