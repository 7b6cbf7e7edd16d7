use anyhow::Result;
use clap::{Parser, Subcommand};
use memex::{app, config, server};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "memex", version, about = "Persistent semantic memory service for AI agents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the server (transport from config: http or stdio)
    Serve {
        /// Override the configured transport
        #[arg(long)]
        transport: Option<String>,
    },
    /// Run the idempotent schema bootstrap and exit
    Schema {
        /// Drop and recreate all tables (destroys data)
        #[arg(long)]
        reset: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::MemexConfig::load()?;

    // Log to stderr so stdout stays clean for MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve { transport } => {
            let transport = transport.unwrap_or_else(|| config.server.transport.clone());
            match transport.trim().to_lowercase().as_str() {
                "stdio" => server::serve_stdio(config).await?,
                "http" | "streamable" | "sse" => server::serve_http(config).await?,
                other => anyhow::bail!("unsupported transport: {other} (expected http or stdio)"),
            }
        }
        Command::Schema { reset } => {
            let state = app::AppState::new(config).await?;
            state.ensure_schema(reset).await?;
            tracing::info!(reset, "schema bootstrap complete");
        }
    }

    Ok(())
}
