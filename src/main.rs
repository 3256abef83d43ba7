//! MIDI vJoy GW
//!
//! Feeds virtual joystick devices from MIDI controllers.

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use midi_vjoy_gw::commands::{
    CommandRepository, CommandStore, JsonFileRepository, SledRepository,
};
use midi_vjoy_gw::config::{AppConfig, StorageBackend};
use midi_vjoy_gw::joystick::{JoyManager, SharedDriver, SimulatedDriver};
use midi_vjoy_gw::midi::{MidiSource, MidirSource};
use midi_vjoy_gw::model::ActionKind;
use midi_vjoy_gw::paths::AppPaths;
use midi_vjoy_gw::tower::DispatchTower;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// MIDI vJoy Gateway - drive virtual joysticks from MIDI controllers
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "MIDI_VJOY_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI input ports
    #[arg(long)]
    list_ports: bool,

    /// List saved commands
    #[arg(long)]
    list_commands: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let paths = AppPaths::detect();
    paths.ensure_directories()?;
    let _log_guard = init_logging(&args.log_level, &paths)?;

    info!("Starting MIDI vJoy GW v{}...", env!("CARGO_PKG_VERSION"));

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = AppConfig::load_or_default(&config_path).await?;
    info!("Configuration: {}", config_path.display());

    if args.list_ports {
        list_ports(&config);
        return Ok(());
    }

    let repository = open_repository(&config, &paths)?;
    let store = Arc::new(CommandStore::new(repository));
    store.load_commands().await?;

    if args.list_commands {
        list_commands(&store);
        return Ok(());
    }

    run(config, store).await?;

    info!("MIDI vJoy GW shutdown complete");
    Ok(())
}

async fn run(config: AppConfig, store: Arc<CommandStore>) -> Result<()> {
    // No native vJoy binding is linked; devices are simulated in-process
    let driver = SharedDriver::new(SimulatedDriver::with_devices(config.joystick.device_count));
    let joysticks = Arc::new(JoyManager::new(
        driver,
        config.joystick.device_count,
        config.joystick.feeder_options(),
        config.joystick.poll_schedule(),
    ));

    let versions = joysticks.versions();
    if !versions.matched {
        warn!(
            "Joystick library ({:#x}) and driver ({:#x}) versions differ",
            versions.library, versions.driver
        );
    }

    joysticks.subscribe_status(|change| {
        info!("Joystick {} is now {}", change.device_id, change.status);
    });

    for id in &config.joystick.acquire {
        joysticks.acquire(*id).await;
    }
    joysticks.start_polling();

    let tower = Arc::new(DispatchTower::new(Arc::clone(&store), Arc::clone(&joysticks)));
    let source = MidirSource::new(config.midi.client_name.clone(), config.midi.inputs.clone());
    match tower.attach(&source) {
        Ok(0) => warn!("No MIDI inputs found, waiting for shutdown"),
        Ok(count) => info!("Listening to {} MIDI inputs", count),
        Err(e) => warn!("MIDI input unavailable: {}", e),
    }

    shutdown_signal().await;

    joysticks.shutdown().await;
    store
        .save_commands()
        .await
        .context("Failed to save commands on shutdown")?;
    Ok(())
}

fn open_repository(config: &AppConfig, paths: &AppPaths) -> Result<Arc<dyn CommandRepository>> {
    let path = config
        .storage
        .path
        .clone()
        .unwrap_or_else(|| paths.commands_path(config.storage.backend));

    let repository: Arc<dyn CommandRepository> = match config.storage.backend {
        StorageBackend::Json => Arc::new(JsonFileRepository::new(path)),
        StorageBackend::Sled => Arc::new(
            SledRepository::open(&path)
                .with_context(|| format!("Failed to open {}", path.display()))?,
        ),
    };
    Ok(repository)
}

fn init_logging(level: &str, paths: &AppPaths) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::daily(&paths.logs_dir, "midi-vjoy-gw.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}

fn list_ports(config: &AppConfig) {
    let source = MidirSource::new(config.midi.client_name.clone(), config.midi.inputs.clone());

    println!("\n{}", "=== Available MIDI Inputs ===".bold().cyan());
    let devices = source.devices();
    if devices.is_empty() {
        println!("  {}", "No input ports found".dimmed());
    }
    for name in devices {
        let selected = config.midi.inputs.is_empty()
            || config
                .midi
                .inputs
                .iter()
                .any(|pattern| name.to_lowercase().contains(&pattern.to_lowercase()));
        let marker = if selected {
            "[LISTEN]".green()
        } else {
            "[SKIP]".yellow()
        };
        println!("  {} {}", marker, name);
    }
    println!();
}

fn list_commands(store: &CommandStore) {
    println!("\n{}", "=== Saved Commands ===".bold().cyan());

    let commands = store.list_commands();
    let bound: Vec<_> = commands.iter().filter(|c| c.is_bound()).collect();
    if bound.is_empty() {
        println!("  {}", "No commands saved".dimmed());
    }

    for command in bound {
        let action = &command.action;
        let target = match action.kind {
            ActionKind::Axis => format!("axis {} ({:?})", action.axis.name, action.axis.subtype),
            ActionKind::Button => format!(
                "button {} ({:?})",
                action.button.number, action.button.subtype
            ),
            ActionKind::None => "none".to_string(),
        };
        println!(
            "  {} {} [{}..={}] -> joystick {} {}",
            command.name.bright_white(),
            command.key().to_string().dimmed(),
            command.event.value,
            command.event.value_range_high,
            action.device_id.to_string().green(),
            target.yellow()
        );
    }
    println!();
}
