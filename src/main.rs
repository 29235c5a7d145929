use clap::{Parser, Subcommand};
use std::io::Read;
use std::sync::Arc;
use wabridge::channels::whatsapp::WaSenderTransport;
use wabridge::channels::Transport;
use wabridge::history::{FileHistoryStore, HistoryStore};
use wabridge::responder::gemini::GeminiClient;
use wabridge::responder::{ResponseGenerator, UnavailableGenerator};

#[derive(Parser)]
#[command(
    name = "wabridge",
    version,
    about = "WhatsApp to Gemini reply bridge"
)]
struct Cli {
    /// Path to config file (default: ~/.wabridge/config.toml)
    #[arg(short, long)]
    config: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new wabridge config directory
    Init,
    /// Print the chunks a reply would be sent as
    Split {
        /// Maximum lines per chunk
        #[arg(long, default_value_t = 3)]
        max_lines: usize,
        /// Maximum characters per line
        #[arg(long, default_value_t = 100)]
        max_chars: usize,
        /// Text to split (default: read stdin)
        text: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("wabridge=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Init) => run_init(cli.config.as_deref()),
        Some(Commands::Split {
            max_lines,
            max_chars,
            text,
        }) => run_split(max_lines, max_chars, text),
        None => run_main(cli.config.as_deref()).await,
    }
}

// ---------------------------------------------------------------------------
// Init
// ---------------------------------------------------------------------------

fn run_init(config_override: Option<&std::path::Path>) -> anyhow::Result<()> {
    let dir = match config_override {
        Some(p) => p
            .parent()
            .map(|d| d.to_path_buf())
            .unwrap_or_else(wabridge::config::config_dir),
        None => wabridge::config::config_dir(),
    };
    std::fs::create_dir_all(&dir)?;
    std::fs::create_dir_all(dir.join("conversations"))?;

    let config_path = match config_override {
        Some(p) => p.to_path_buf(),
        None => dir.join("config.toml"),
    };
    if !config_path.exists() {
        std::fs::write(
            &config_path,
            r#"[agent]
model = "gemini-2.0-flash"
api_key = "${GEMINI_API_KEY}"
persona = "persona.json"

[channels.whatsapp]
api_token = "${WASENDER_API_TOKEN}"
webhook_secret = "${WEBHOOK_SECRET}"

[chunking]
max_lines = 3
max_chars_per_line = 100
delay_min_ms = 550
delay_max_ms = 1500

[persistence]
conversations_dir = "~/.wabridge/conversations"
max_history = 20

[web]
bind = "0.0.0.0"
port = 5001
"#,
        )?;
        println!("Created {}", config_path.display());
    } else {
        println!("Config already exists: {}", config_path.display());
    }

    let persona_path = dir.join("persona.json");
    if !persona_path.exists() {
        std::fs::write(
            &persona_path,
            r#"{
  "name": "Assistant",
  "description": "You are a helpful assistant."
}
"#,
        )?;
        println!("Created {}", persona_path.display());
    }

    println!("wabridge initialized at {}", dir.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Split
// ---------------------------------------------------------------------------

fn run_split(max_lines: usize, max_chars: usize, text: Option<String>) -> anyhow::Result<()> {
    let text = match text {
        Some(t) => t,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let chunks = wabridge::chunker::split_message(&text, max_lines, max_chars)?;
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            println!("---");
        }
        println!("{}", chunk);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Serve
// ---------------------------------------------------------------------------

async fn run_main(config_path: Option<&std::path::Path>) -> anyhow::Result<()> {
    let config = Arc::new(wabridge::config::load_config(config_path)?);
    let limits = config.chunking.limits()?;
    let (delay_min, delay_max) = config.chunking.delay_window()?;

    let persona = wabridge::persona::load_persona(&config.persona_path());

    let conversations_dir = config.conversations_dir();
    if !conversations_dir.exists() {
        std::fs::create_dir_all(&conversations_dir)?;
        tracing::info!("Created conversations directory at {}", conversations_dir.display());
    }
    let history: Arc<dyn HistoryStore> = Arc::new(FileHistoryStore::new(
        conversations_dir.clone(),
        config.persistence.max_history,
    ));

    let generator: Arc<dyn ResponseGenerator> =
        match config.agent.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => Arc::new(GeminiClient::new(
                key,
                &config.agent.model,
                &config.agent.base_url,
                &persona.system_instruction,
            )),
            None => {
                tracing::error!("Gemini API key not configured. Replies will be apologies.");
                Arc::new(UnavailableGenerator::new(&config.agent.model))
            }
        };

    let transport: Option<Arc<dyn Transport>> = config
        .whatsapp()
        .and_then(WaSenderTransport::from_config)
        .map(|t| Arc::new(t) as Arc<dyn Transport>);

    tracing::info!("Persona: {}", persona.name);
    tracing::info!("Gemini model: {}", config.agent.model);
    tracing::info!("Conversations directory: {}", conversations_dir.display());
    tracing::info!(
        "Chunking: {} lines x {} chars per message",
        limits.max_lines(),
        limits.max_chars_per_line()
    );
    tracing::info!(
        "WaSender client: {}",
        if transport.is_some() { "initialized" } else { "NOT INITIALIZED" }
    );
    tracing::info!(
        "Gemini client: {}",
        if generator.is_available() { "initialized" } else { "NOT INITIALIZED" }
    );

    let (queue_tx, queue_rx) = tokio::sync::mpsc::unbounded_channel();

    match transport.clone() {
        Some(transport) => {
            let relay = Arc::new(wabridge::relay::Relay::new(
                generator.clone(),
                transport,
                history.clone(),
                limits,
                wabridge::relay::Pacing::new(delay_min, delay_max),
            ));
            tokio::spawn(relay.run(queue_rx));
        }
        None => tracing::warn!("No WaSender API token configured; webhooks will be rejected"),
    }

    let state = wabridge::web::AppState {
        config,
        persona_name: persona.name,
        history,
        generator,
        transport,
        queue: queue_tx,
    };

    tokio::select! {
        result = wabridge::web::start_server(state) => result?,
        _ = tokio::signal::ctrl_c() => tracing::info!("Shutting down..."),
    }

    Ok(())
}
