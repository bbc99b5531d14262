//! mqtt2template - Main Entry Point

use clap::{Parser, Subcommand};
use mqtt2template::bridge::Bridge;
use mqtt2template::config::{BridgeConfig, ConfigError, DEFAULT_CONFIG_PATH};
use mqtt2template::error::{error_chain, BridgeResult};
use mqtt2template::observability::init_default_logging;
use mqtt2template::templates::TemplateRegistry;
use mqtt2template::transport::mqtt::redact_broker_url;
use mqtt2template::transport::MqttTransport;
use std::path::PathBuf;
use std::process;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Render templates from MQTT messages into files
#[derive(Parser)]
#[command(name = "mqtt2template")]
#[command(about = "Render templates from MQTT message payloads into files")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        env = "MQTT2TEMPLATE_CONFIG",
        default_value = DEFAULT_CONFIG_PATH
    )]
    config: PathBuf,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the bridge (default)
    Run,
    /// Validate configuration and compile every template, then exit
    Check {
        /// Print the validated configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logging depends on the config's verbose flag, so load first and report after
    let loaded = BridgeConfig::load_from_file(&cli.config);
    let verbose = match &loaded {
        Ok(config) => config.is_verbose(cli.verbose),
        Err(_) => cli.verbose,
    };
    init_default_logging(verbose);

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", error_chain(&e));
            process::exit(1);
        }
    };

    for skipped in &config.skipped_topics {
        warn!("Skipping topic '{}': {}", skipped.topic, skipped.reason);
    }

    let result = match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run_bridge(config).await,
        Commands::Check { show } => check_config(&config, show).await,
    };

    if let Err(e) = result {
        error!(kind = e.kind(), "{}", error_chain(&e));
        process::exit(1);
    }
}

async fn run_bridge(config: BridgeConfig) -> BridgeResult<()> {
    info!("Starting mqtt2template v{}", env!("CARGO_PKG_VERSION"));

    let registry = TemplateRegistry::from_config(&config).await?;
    let transport = MqttTransport::new(&config.broker_url);
    info!(
        "Connecting to MQTT broker at {}...",
        transport.broker_display()
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let signals = tokio::spawn(forward_shutdown_signals(shutdown_tx));

    let result = Bridge::new(&config, registry, transport, shutdown_rx)
        .run()
        .await;
    signals.abort();

    result?;
    info!("Application shutdown complete");
    Ok(())
}

/// Turn SIGINT/SIGTERM into a shutdown request for the bridge
async fn forward_shutdown_signals(shutdown_tx: watch::Sender<bool>) {
    let (mut sigint, mut sigterm) =
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(sigint), Ok(sigterm)) => (sigint, sigterm),
            (Err(e), _) | (_, Err(e)) => {
                error!("Failed to install signal handlers: {}", e);
                return;
            }
        };

    tokio::select! {
        _ = sigint.recv() => {
            info!("Received SIGINT, shutting down gracefully...");
        }
        _ = sigterm.recv() => {
            info!("Received SIGTERM, shutting down gracefully...");
        }
    }

    let _ = shutdown_tx.send(true);
}

async fn check_config(config: &BridgeConfig, show: bool) -> BridgeResult<()> {
    let registry = TemplateRegistry::from_config(config).await?;
    let topics = registry.topics_with_bindings();

    println!(
        "Configuration OK: {} topics, {} templates",
        topics.len(),
        registry.binding_count()
    );
    for topic in &topics {
        println!("  {topic}");
        for binding in registry.bindings(topic).unwrap_or_default() {
            println!(
                "    {} -> {}",
                binding.source_path().display(),
                binding.output_path().display()
            );
        }
    }
    for skipped in &config.skipped_topics {
        println!("  skipped '{}': {}", skipped.topic, skipped.reason);
    }

    if show {
        let mut shown = config.clone();
        shown.broker_url = redact_broker_url(&config.broker_url);
        let json = serde_json::to_string_pretty(&shown).map_err(ConfigError::from)?;
        println!("{json}");
    }

    Ok(())
}
