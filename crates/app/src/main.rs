use std::process::ExitCode;
use std::sync::Arc;

use kismet_llm::{GeminiClient, LlmProvider};
use kismet_store::{FileStateStore, SessionStore};

use kismet::chat::ChatTurnRunner;
use kismet::cli;
use kismet::codegen::ClassGenerator;
use kismet::config;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let settings = config::load();

    // Hard precondition: without a credential the app refuses to start
    // rather than degrading into a surface that cannot answer anything.
    if let Err(error) = settings.require_api_key() {
        eprintln!("{error}");
        return ExitCode::FAILURE;
    }

    let provider: Arc<dyn LlmProvider> = match GeminiClient::new(settings.to_gemini_config()) {
        Ok(client) => Arc::new(client),
        Err(error) => {
            eprintln!("{error}");
            return ExitCode::FAILURE;
        }
    };

    let mut store = SessionStore::load(Box::new(FileStateStore::at_default()));
    let mut chat = ChatTurnRunner::new(provider.clone());
    let mut generator = ClassGenerator::new(provider);

    if let Err(error) = cli::run(&mut store, &mut chat, &mut generator).await {
        tracing::error!(error = %error, "interactive loop failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
