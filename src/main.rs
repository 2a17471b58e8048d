//! Studio Link CLI - talk to a running engine from the terminal.
//!
//! See the `studio_link` library for the protocol implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use mimalloc::MiMalloc;
use studio_link::constants::DEFAULT_LINGER;
use studio_link::{Command, Config, EngineClient, EngineSimulator, EventDispatcher, InboundEvent};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Parser)]
#[command(name = "studio-link")]
#[command(version)]
#[command(about = "Drive a game engine over the editor socket protocol")]
struct Cli {
    /// Engine host (overrides config and STUDIO_LINK_HOST)
    #[arg(long, global = true)]
    host: Option<String>,
    /// Engine port (overrides config and STUDIO_LINK_PORT)
    #[arg(long, global = true)]
    port: Option<u16>,
    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print engine events as JSON lines until the connection drops
    Watch,
    /// Send one command and print the engine's replies
    Send {
        /// Command as JSON, e.g. '{"op":"create_entity"}'
        command: String,
        /// How long to wait for replies, in milliseconds
        #[arg(long)]
        linger_ms: Option<u64>,
    },
    /// Run a stand-in engine on the configured address
    Simulate,
    /// Print the effective configuration
    Config {
        /// Also write it to the config file
        #[arg(long)]
        save: bool,
    },
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(path) = log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("Failed to create log file at {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.format_timestamp_secs().init();
    Ok(())
}

fn print_event(event: &InboundEvent) {
    match serde_json::to_string(event) {
        Ok(line) => println!("{line}"),
        Err(e) => log::error!("Failed to serialize {event:?}: {e}"),
    }
}

/// A dispatcher that prints every inbound event.
fn printing_dispatcher() -> Arc<EventDispatcher> {
    let dispatcher = Arc::new(EventDispatcher::new());
    dispatcher.on_entity_selected(|e| print_event(&InboundEvent::EntitySelected(e.clone())));
    dispatcher.on_component_properties(|e| {
        print_event(&InboundEvent::ComponentProperties(e.clone()));
    });
    dispatcher.on_entity_position(|e| print_event(&InboundEvent::EntityPosition(*e)));
    dispatcher.on_log_message(|e| print_event(&InboundEvent::LogMessage(e.clone())));
    dispatcher
}

async fn connect(config: &Config) -> Result<EngineClient> {
    EngineClient::connect_with(config, printing_dispatcher())
        .await
        .with_context(|| format!("Failed to connect to engine at {}", config.address()))
}

async fn watch(config: &Config) -> Result<()> {
    let client = connect(config).await?;
    tokio::select! {
        reason = client.closed() => eprintln!("{reason}"),
        _ = tokio::signal::ctrl_c() => client.close(),
    }
    Ok(())
}

async fn send(config: &Config, json: &str, linger: Duration) -> Result<()> {
    let command: Command = serde_json::from_str(json).context("Invalid command JSON")?;
    let client = connect(config).await?;
    client.send(&command)?;
    log::info!("Sent {}", command.name());

    tokio::select! {
        reason = client.closed() => eprintln!("{reason}"),
        () = tokio::time::sleep(linger) => client.close(),
    }
    Ok(())
}

async fn simulate(config: &Config) -> Result<()> {
    let simulator = EngineSimulator::start(config).await?;
    println!("Simulator listening on {}", simulator.local_addr());
    tokio::signal::ctrl_c().await?;
    simulator.shutdown();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    let mut config = Config::load()?;
    if let Some(host) = cli.host {
        config.host = host;
    }
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        Commands::Watch => watch(&config).await?,
        Commands::Send { command, linger_ms } => {
            let linger = linger_ms.map_or(DEFAULT_LINGER, Duration::from_millis);
            send(&config, &command, linger).await?;
        }
        Commands::Simulate => simulate(&config).await?,
        Commands::Config { save } => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            if save {
                let path = Config::config_dir()?.join("config.json");
                config.save_to_path(&path)?;
                eprintln!("Saved to {}", path.display());
            }
        }
    }

    Ok(())
}
