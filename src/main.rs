use anyhow::Context;
use clap::Parser;
use refu_chat::backend::HttpChatBackend;
use refu_chat::catalog::PdfCatalog;
use refu_chat::config::ChatConfig;
use refu_chat::controller::ChatController;
use refu_chat::demo::{self, DemoState};
use refu_chat::terminal::{self, TerminalView};
use refu_chat::voice::{CommandSpeechProvider, SpeechProvider, UnsupportedSpeech, VoiceInput};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "refu-chat")]
#[command(about = "Product assistant chat client and demo backend.", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Chat with the product assistant from the terminal
    Chat {
        /// Overrides BACKEND_URL
        #[arg(long)]
        backend_url: Option<Url>,
        /// Write the rendered HTML transcript here on exit
        #[arg(long)]
        transcript_out: Option<PathBuf>,
    },
    /// Serve the in-memory development backend
    ServeDemo {
        /// Overrides BIND_ADDR
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = ChatConfig::from_env()?;

    match cli.command {
        Commands::Chat {
            backend_url,
            transcript_out,
        } => {
            if let Some(url) = backend_url {
                config.backend_url = url;
            }
            run_chat(config, transcript_out).await
        }
        Commands::ServeDemo { bind } => {
            if let Some(addr) = bind {
                config.bind_addr = addr;
            }
            demo::serve(config.bind_addr, DemoState::default(), config.enable_cors).await
        }
    }
}

async fn run_chat(config: ChatConfig, transcript_out: Option<PathBuf>) -> anyhow::Result<()> {
    let backend = HttpChatBackend::new(config.backend_url.clone(), config.request_timeout)
        .context("failed to build backend client")?;
    let catalog = match &config.pdf_catalog_path {
        Some(path) => PdfCatalog::load(path)
            .await
            .with_context(|| format!("failed to load PDF catalog from {}", path.display()))?,
        None => PdfCatalog::builtin(),
    };
    tracing::info!(
        backend = %config.backend_url,
        products = catalog.len(),
        ordering = ?config.response_ordering,
        "starting chat session"
    );

    let controller = ChatController::new(
        Arc::new(backend),
        Arc::new(catalog),
        Arc::new(TerminalView),
    )
    .with_ordering(config.response_ordering);

    let speech: Arc<dyn SpeechProvider> = match config
        .speech_command
        .as_deref()
        .and_then(CommandSpeechProvider::from_command_line)
    {
        Some(provider) => Arc::new(provider),
        None => Arc::new(UnsupportedSpeech),
    };
    let voice = VoiceInput::new(speech, controller.clone());

    terminal::run(controller.clone(), voice).await?;

    if let Some(path) = transcript_out {
        terminal::export_transcript(&controller, &path).await?;
        tracing::info!(path = %path.display(), "transcript written");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
