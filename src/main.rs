// GenAI Gate - Main Entry Point
//
// CLI for the rate-gated generative-AI queue:
// - serve: HTTP API (usage, health, metrics, generate)
// - stats: print current usage
// - generate: one gated call from the command line

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use genai_gate::client::{GatedClient, GeminiClient, GenerateContentRequest};
use genai_gate::config::Config;
use genai_gate::rate_limit::{open_store, RateLimiter};
use genai_gate::server::{self, AppState};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// GenAI Gate: rate-gated request queue for generative-AI APIs
#[derive(Parser, Debug)]
#[command(name = "genai-gate")]
#[command(author = "GenAI Gate Contributors")]
#[command(version)]
#[command(about = "Rate-gated FIFO queue with a persisted usage ledger for the Gemini API", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the HTTP API
    Serve {
        /// Bind address (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Bind port (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Print current usage as JSON
    Stats {
        /// Print the dashboard payload instead of the stats
        #[arg(long)]
        dashboard: bool,
    },
    /// Send one prompt through the gate
    Generate {
        /// Prompt text
        prompt: String,

        /// Model to call (defaults to provider.default_model)
        #[arg(long)]
        model: Option<String>,

        /// Generation config as a JSON object
        #[arg(long)]
        generation_config: Option<String>,

        /// Print the raw provider JSON instead of the text
        #[arg(long)]
        raw: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    init_tracing(&config, args.verbose)?;

    match args.command {
        Some(Commands::Serve { host, port }) => serve(config, host, port).await?,
        Some(Commands::Stats { dashboard }) => stats(config, dashboard).await?,
        Some(Commands::Generate {
            prompt,
            model,
            generation_config,
            raw,
        }) => generate(config, prompt, model, generation_config, raw).await?,
        None => {
            info!("No command specified. Use \"genai-gate --help\" for usage.");
        }
    }

    Ok(())
}

fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }
    Ok(())
}

fn build_limiter(config: &Config) -> Result<RateLimiter> {
    let store = open_store(&config.ledger).context("Failed to open usage store")?;
    Ok(RateLimiter::with_store(
        config.limits.clone(),
        config.ledger.clone(),
        store,
    ))
}

/// Run the HTTP API until Ctrl-C
async fn serve(config: Config, host: Option<String>, port: Option<u16>) -> Result<()> {
    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", host, port))?;

    let inner = Arc::new(GeminiClient::from_config(&config.provider)?);
    let limiter = build_limiter(&config)?;
    // A failed load leaves the gate closed; /health reports it.
    if let Err(e) = limiter.init().await {
        tracing::error!("Starting with the gate closed: {}", e);
    }

    let mut state_rx = limiter.subscribe();
    tokio::spawn(async move {
        while state_rx.changed().await.is_ok() {
            let state = *state_rx.borrow_and_update();
            info!("Usage ledger is now {}", state);
        }
    });

    let client = GatedClient::new(limiter.clone(), inner, &config.provider.default_model);
    let app = server::router(AppState::new(client), config.server.metrics_enabled);

    let result = server::serve(addr, app, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown signal received");
    })
    .await;

    limiter.shutdown().await;
    result
}

/// Print usage stats
async fn stats(config: Config, dashboard: bool) -> Result<()> {
    let limiter = build_limiter(&config)?;
    limiter.init().await.context("Failed to load usage ledger")?;

    let output = if dashboard {
        serde_json::to_string_pretty(&limiter.dashboard())?
    } else {
        serde_json::to_string_pretty(&limiter.usage_stats())?
    };
    println!("{}", output);

    limiter.shutdown().await;
    Ok(())
}

/// Send one prompt through the gate
async fn generate(
    config: Config,
    prompt: String,
    model: Option<String>,
    generation_config: Option<String>,
    raw: bool,
) -> Result<()> {
    let inner = Arc::new(GeminiClient::from_config(&config.provider)?);

    let mut request = GenerateContentRequest::new(prompt);
    request.model = model;
    if let Some(json) = generation_config {
        let value = serde_json::from_str(&json).context("--generation-config is not valid JSON")?;
        request = request.config(value);
    }

    let limiter = build_limiter(&config)?;
    limiter.init().await.context("Failed to load usage ledger")?;
    let client = GatedClient::new(limiter.clone(), inner, &config.provider.default_model);

    let result = client.generate_content(request).await;
    limiter.shutdown().await;

    let response = result.context("Gated generateContent call failed")?;
    match response.text() {
        Some(text) if !raw => println!("{}", text),
        _ => println!("{}", serde_json::to_string_pretty(&response.raw)?),
    }
    Ok(())
}
