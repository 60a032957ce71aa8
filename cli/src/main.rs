//! Parley CLI - binary entry point.
//!
//! ```text
//! main() -> load config -> spawn Librarian -> spawn ChatOrchestrator
//!                                               ^
//!                              stdin lines ─────┘ (until EOF or Ctrl-C)
//! ```
//!
//! Logs go to stderr; stdout is the conversation.

mod console;

use anyhow::{Context, Result};
use tokio::io::BufReader;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use parley_config::ParleyConfig;
use parley_engine::parley_context::{Librarian, LibrarianSettings};
use parley_engine::parley_providers::CompletionClient;
use parley_engine::{ChatOrchestrator, ChatSettings, MessageFilter};

use crate::console::ConsoleChannel;

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = ParleyConfig::load().context("failed to load configuration")?;
    let api_key = config
        .api
        .resolve_key()
        .context("no API key: set [api] key or OPENAI_API_KEY")?;
    let base_url = config.api.resolve_base_url();

    let chat_client = CompletionClient::new(api_key.clone(), &base_url, config.chat.timeout())
        .context("failed to build chat HTTP client")?;
    let librarian_client = CompletionClient::new(api_key, &base_url, config.librarian.timeout())
        .context("failed to build librarian HTTP client")?;

    let mut librarian_settings = LibrarianSettings::new(config.librarian.sampling_params());
    librarian_settings.batch_size = config.librarian.batch_size;
    librarian_settings.settle_delay = config.librarian.settle_delay();

    let librarian = Librarian::new(librarian_client, librarian_settings);
    let facts = librarian.reader();
    let (librarian_handle, librarian_task) = librarian.spawn();

    let chat = &config.chat;
    let mut settings = ChatSettings::new(
        &chat.bot_name,
        &chat.system_message,
        chat.sampling_params(),
        chat.max_tokens,
    );
    settings.message_interval = chat.message_interval();
    settings.typing = chat.typing;

    let orchestrator = ChatOrchestrator::new(
        chat_client,
        ConsoleChannel::new(&chat.bot_name, std::io::stdout()),
        MessageFilter::new(console::author_id(&chat.bot_name), &chat.channel),
        settings,
        facts,
    )
    .with_librarian(librarian_handle);
    let (inbox, chat_task) = orchestrator.spawn();

    tracing::info!(
        channel = %chat.channel,
        model = %chat.model,
        librarian_model = %config.librarian.model,
        "Parley ready; type `name: message` lines"
    );

    let pipeline = async {
        let stdin = BufReader::new(tokio::io::stdin());
        console::forward_lines(stdin, inbox, &chat.channel).await?;
        chat_task.await.context("chat task panicked")?;
        let store = librarian_task.await.context("librarian task panicked")?;
        anyhow::Ok(store)
    };

    tokio::select! {
        result = pipeline => {
            let store = result?;
            tracing::info!(facts = store.fact_count(), "Shut down cleanly");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted; shutting down");
        }
    }

    Ok(())
}
