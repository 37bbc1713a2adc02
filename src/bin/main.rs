use clap::Parser;
use financial_query_agent::{
    agent::Orchestrator,
    config::AppConfig,
    execution::SqliteConnection,
    llm::GeminiClient,
    memory::ConversationMemory,
    models::QueryRequest,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Ask questions about the financial store in plain language.
#[derive(Debug, Parser)]
#[command(name = "analyst", version)]
struct Cli {
    /// Question to answer
    #[arg(required_unless_present_any = ["clear", "history"])]
    query: Option<String>,

    /// Continue an existing conversation
    #[arg(long, env = "CHAT_ID")]
    chat_id: Option<String>,

    #[arg(long)]
    user_id: Option<String>,

    /// Clear stored turns for --chat-id, or for every session
    #[arg(long, conflicts_with_all = ["query", "history"])]
    clear: bool,

    /// Print recent turns for --chat-id
    #[arg(long, requires = "chat_id", conflicts_with = "query")]
    history: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let memory = Arc::new(ConversationMemory::from_config(&config).await);

    if cli.clear {
        let removed = memory.clear(cli.chat_id.as_deref()).await?;
        info!(removed, "Conversation turns cleared");
        println!("{}", serde_json::json!({ "cleared_turns": removed }));
        return Ok(());
    }

    if cli.history {
        let chat_id = cli.chat_id.as_deref().unwrap_or_default();
        let turns = memory.recent_turns(chat_id, config.history_limit).await?;
        let statistics = memory.statistics(chat_id).await?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "statistics": statistics,
                "turns": turns,
            }))?
        );
        return Ok(());
    }

    let Some(query) = cli.query else {
        return Ok(());
    };

    let model = Arc::new(GeminiClient::from_config(&config)?);
    let connection = Arc::new(SqliteConnection::connect(&config.database_url).await?);
    let orchestrator = Orchestrator::from_config(&config, model, connection, memory);

    let mut request = QueryRequest::new(query);
    if let Some(chat_id) = cli.chat_id {
        request = request.with_chat_id(chat_id);
    }
    if let Some(user_id) = cli.user_id {
        request = request.with_user_id(user_id);
    }

    let response = orchestrator.handle(request).await;
    println!("{}", serde_json::to_string_pretty(&response)?);

    Ok(())
}
