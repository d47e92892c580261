use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use quanta_config::{ConfigLoader, LogLevel, QuantaConfig};
use quanta_execution::{ProcessWorkerBridge, WorkerBackend, WorkerBridgeConfig};
use quanta_mcp::{McpServer, ToolCatalog, ToolService};
use quanta_storage::PersistenceManager;

#[derive(Parser)]
#[command(name = "quanta-mcp")]
#[command(about = "Quanta Model Context Protocol (MCP) tool server")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdio (default)
    Serve,

    /// List available tools
    Tools {
        /// Also list legacy single-purpose names
        #[arg(long)]
        legacy: bool,
    },

    /// Validate configuration file
    ValidateConfig,

    /// Print a sample configuration file
    SampleConfig,

    /// Print the recorded events and artifacts of a session
    Session {
        /// Session identifier
        id: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => serve_command(cli.config, cli.verbose).await,
        Commands::Tools { legacy } => tools_command(cli.config, legacy),
        Commands::ValidateConfig => validate_config_command(cli.config),
        Commands::SampleConfig => {
            print!("{}", QuantaConfig::generate_sample());
            Ok(())
        }
        Commands::Session { id } => session_command(cli.config, cli.verbose, &id).await,
    }
}

fn load_config(path: Option<PathBuf>, verbose: bool) -> Result<QuantaConfig> {
    let mut config = ConfigLoader::new()
        .load(path.as_ref())
        .context("Failed to load configuration")?;
    if verbose {
        config.logging.level = LogLevel::Debug;
    }
    Ok(config)
}

async fn serve_command(config_path: Option<PathBuf>, verbose: bool) -> Result<()> {
    let config = load_config(config_path, verbose)?;
    let _logging = quanta_logging::init_logging_from_config(&config.logging)?;

    tracing::info!("Starting Quanta MCP server");

    let persistence = PersistenceManager::from_config(&config.database).await;
    if persistence.is_degraded() {
        tracing::warn!("Running without persistence; tool calls will not be recorded");
    }

    let bridge = Arc::new(ProcessWorkerBridge::new(WorkerBridgeConfig::from_config(
        &config.worker,
        config.tools.default_timeout,
    )));
    if let Err(e) = bridge.start().await {
        // The bridge retries on the first call
        tracing::warn!("Worker did not start: {}", e);
    }
    let backend: Arc<dyn WorkerBackend> = bridge.clone();

    let service = Arc::new(ToolService::new(
        config.tools.clone(),
        &config.artifacts,
        backend.clone(),
        persistence.clone(),
    ));
    let server = McpServer::new(service.clone(), config.server.clone());

    tracing::info!("MCP server ready on stdio");
    let outcome = tokio::select! {
        result = server.run_stdio() => result.map_err(anyhow::Error::from),
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            Ok(())
        }
    };

    if let Err(e) = backend.shutdown(config.worker.shutdown_grace).await {
        tracing::warn!("Worker shutdown failed: {}", e);
    }
    service.flush_persistence().await;

    let stats = persistence.stats();
    tracing::info!(
        events = stats.events_recorded,
        artifacts = stats.artifacts_recorded,
        failed_writes = stats.failed_writes,
        "MCP server stopped"
    );
    outcome
}

fn tools_command(config_path: Option<PathBuf>, legacy: bool) -> Result<()> {
    let config = load_config(config_path, false)?;
    let catalog = ToolCatalog::from_config(&config.tools);

    println!("Available MCP Tools:");
    println!();
    for family in catalog.families() {
        println!("  {} - {}", family.name, family.description);
        if !family.aliases.is_empty() {
            println!("      aliases: {}", family.aliases.join(", "));
        }
        println!("      methods: {}", family.methods.join(", "));
    }
    for tool in catalog.standalone() {
        println!("  {} - {}", tool.name, tool.description);
    }

    if legacy {
        println!();
        println!("Legacy names:");
        for (name, method) in catalog.legacy_names() {
            println!("  {} -> {}", name, method);
        }
    }
    Ok(())
}

fn validate_config_command(config_path: Option<PathBuf>) -> Result<()> {
    let Some(path) = config_path else {
        bail!("--config <path> is required to validate a configuration file");
    };

    match ConfigLoader::new().from_file(&path) {
        Ok(_) => {
            println!("Configuration in {} is valid", path.display());
            Ok(())
        }
        Err(e) => bail!("Configuration in {} is invalid: {}", path.display(), e),
    }
}

async fn session_command(config_path: Option<PathBuf>, verbose: bool, id: &str) -> Result<()> {
    let config = load_config(config_path, verbose)?;
    quanta_logging::init_simple_tracing(if verbose { "debug" } else { "warn" })?;

    if !config.database.enabled {
        bail!("Persistence is disabled in the configuration");
    }
    let persistence = PersistenceManager::from_config(&config.database).await;

    let Some(session) = persistence.get_session(id).await? else {
        bail!("Session '{}' not found", id);
    };
    let events = persistence.get_session_events(id).await?;
    let artifacts = persistence.get_session_artifacts(id).await?;

    let events: Vec<_> = events
        .iter()
        .map(|event| {
            serde_json::json!({
                "id": event.id,
                "timestamp": event.timestamp,
                "tool_name": event.tool_name,
                "input": event.input_json().unwrap_or_else(|_| event.input.clone().into()),
                "output": event.output_json().unwrap_or_else(|_| event.output.clone().into()),
            })
        })
        .collect();

    let report = serde_json::json!({
        "session": session,
        "events": events,
        "artifacts": artifacts,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
