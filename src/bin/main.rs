use banking_assistant::{
    auth::Caller,
    bootstrap::{build_orchestrator, init_tracing},
    config::AppConfig,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv::dotenv().ok();
    init_tracing();

    let config = AppConfig::from_env()?;
    let user = std::env::var("ASSISTANT_USER").unwrap_or_else(|_| "Alice".to_string());
    let caller = Caller::new(user.clone());

    let orchestrator = build_orchestrator(&config).await?;
    info!(%user, backend = ?config.llm.backend, "Banking assistant ready");

    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut session_id: Option<String> = None;

    stdout
        .write_all(format!("Chatting as {}. Type 'exit' to quit.\n> ", user).as_bytes())
        .await?;
    stdout.flush().await?;

    while let Some(line) = lines.next_line().await? {
        let message = line.trim();
        if matches!(message, "exit" | "quit") {
            break;
        }

        if !message.is_empty() {
            match orchestrator
                .handle_turn(&caller, session_id.as_deref(), message)
                .await
            {
                Ok(turn) => {
                    session_id = Some(turn.session_id);
                    stdout
                        .write_all(format!("{}\n", turn.reply).as_bytes())
                        .await?;
                }
                Err(e) => {
                    warn!(error = %e, "Turn rejected");
                    stdout.write_all(format!("[error] {}\n", e).as_bytes()).await?;
                }
            }
        }

        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
    }

    Ok(())
}
