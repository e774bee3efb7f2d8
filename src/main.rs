//! joybind - remap physical controllers onto virtual joysticks
//!
//! Runs the mapping engine headless against GilRs devices, and offers
//! one-shot commands for capturing bindings and inspecting devices.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::*;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::runtime::Handle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use joybind::binding::{ActionKey, BindingTable, CommitOutcome, Resolution};
use joybind::detect::{ListenTarget, NoKeys};
use joybind::device::{DeviceEnumerator, GilrsDevices, LogSink};
use joybind::profile::loader::{read_profile, LoadEvent};
use joybind::profile::{ProfileLoader, ProfileWatcher};
use joybind::{Engine, EngineConfig, EngineEvent, ListenRequest};

/// joybind - map controllers to virtual joysticks and game actions
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the user config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the mapping engine with profile hot reload (default)
    Run,
    /// Wait for a joystick input and bind it to an action
    Listen {
        /// Action map, e.g. spaceship_weapons
        action_map: String,
        /// Action name, e.g. v_attack1
        action_name: String,
        /// Virtual device the binding targets
        #[arg(long, default_value_t = 1)]
        device: u32,
        /// What to do if the input is already bound elsewhere
        #[arg(long, value_enum, default_value_t = OnConflict::Cancel)]
        on_conflict: OnConflict,
    },
    /// List devices and the detected instance order
    Devices {
        /// Print the enumeration as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate the profile and report binding conflicts
    Check {
        /// Profile to check instead of the configured one
        profile: Option<PathBuf>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OnConflict {
    Cancel,
    Replace,
    Apply,
}

impl From<OnConflict> for Resolution {
    fn from(value: OnConflict) -> Self {
        match value {
            OnConflict::Cancel => Resolution::Cancel,
            OnConflict::Replace => Resolution::ReplaceAll,
            OnConflict::Apply => Resolution::ApplyAnyway,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level)?;

    let config = load_config(args.config.as_deref()).await?;

    match args.command.unwrap_or(Command::Run) {
        Command::Run => run(config).await,
        Command::Listen { action_map, action_name, device, on_conflict } => {
            listen(config, ActionKey::new(action_map, action_name), device, on_conflict.into()).await
        }
        Command::Devices { json } => list_devices(&config, json),
        Command::Check { profile } => check(&config, profile),
    }
}

async fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    if let Some(path) = path {
        info!("Configuration file: {}", path.display());
        return EngineConfig::load(path).await;
    }
    match EngineConfig::default_path() {
        Some(path) if path.exists() => {
            info!("Configuration file: {}", path.display());
            EngineConfig::load(&path).await
        }
        _ => {
            info!("No configuration file, using defaults");
            Ok(EngineConfig::default())
        }
    }
}

fn load_bindings(config: &EngineConfig) -> Result<BindingTable> {
    match &config.bindings {
        Some(path) if path.exists() => {
            let table = BindingTable::load(path)
                .with_context(|| format!("Failed to load bindings: {}", path.display()))?;
            info!("Loaded {} bindings from {}", table.len(), path.display());
            Ok(table)
        }
        _ => Ok(BindingTable::new()),
    }
}

async fn run(config: EngineConfig) -> Result<()> {
    info!("Starting joybind...");

    let mut devices = GilrsDevices::new()?;
    let mut sink = LogSink::new();
    let mut keys = NoKeys;

    let mut engine = Engine::new(&config);
    engine.set_bindings(load_bindings(&config)?);
    engine.auto_detect_order(&devices);

    let mut loader = ProfileLoader::with_axis_defaults(Handle::current(), config.axis_defaults.clone());
    let _watcher = match &config.profile {
        Some(path) => {
            loader.request(path);
            Some(ProfileWatcher::new(path, loader.handle())?)
        }
        None => {
            warn!("No profile configured, outputs stay idle");
            None
        }
    };

    let mut ticker = tokio::time::interval(config.tick_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    info!("Ticking at {} Hz", config.tick_rate_hz);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                devices.refresh();
                if let Some(event) = engine.tick(&devices, &mut keys, &mut sink, Instant::now()) {
                    debug!("Unexpected listening event: {:?}", event);
                }
            }

            Some(event) = loader.next() => {
                if let LoadEvent::Loaded { profile, .. } = event {
                    if let Err(e) = engine.set_profile(profile) {
                        warn!("Profile rejected (keeping old profile): {}", e);
                    }
                }
            }

            _ = &mut shutdown => {
                info!("Shutdown signal received, stopping tick loop");
                break;
            }
        }
    }

    info!("joybind stopped after {} output writes", sink.writes());
    Ok(())
}

async fn listen(config: EngineConfig, action: ActionKey, device: u32, resolution: Resolution) -> Result<()> {
    let mut devices = GilrsDevices::new()?;
    let mut sink = LogSink::new();
    let mut keys = NoKeys;

    let mut engine = Engine::new(&config);
    engine.set_bindings(load_bindings(&config)?);
    engine.auto_detect_order(&devices);

    println!(
        "{} {} {}",
        "Press the control for".bold(),
        action.to_string().yellow(),
        "(Ctrl+C cancels)".dimmed()
    );
    engine.begin_listening(ListenRequest { action, target: ListenTarget::Joystick, virtual_device: device });

    let mut ticker = tokio::time::interval(config.tick_interval());
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    let event = loop {
        tokio::select! {
            _ = ticker.tick() => {
                devices.refresh();
                if let Some(event) = engine.tick(&devices, &mut keys, &mut sink, Instant::now()) {
                    break event;
                }
            }
            _ = &mut shutdown => {
                if let Some(request) = engine.cancel_listening() {
                    break EngineEvent::Cancelled { request };
                }
                return Ok(());
            }
        }
    };

    match event {
        EngineEvent::Detected { input, proposal, conflicts, .. } => {
            let input_string = proposal.input_string(engine.device_order());
            println!("{} {} ({})", "Detected".green().bold(), input.name, input_string.cyan());

            for conflict in &conflicts {
                println!("  {} already bound to {}", "conflict:".red(), conflict.action.to_string().yellow());
            }

            match engine.commit_binding(proposal, resolution) {
                CommitOutcome::Committed { removed, kept_conflicts, .. } => {
                    println!(
                        "{} {} removed, {} conflicts kept",
                        "Bound.".green().bold(),
                        removed.len(),
                        kept_conflicts
                    );
                    if let Some(path) = &config.bindings {
                        engine
                            .bindings()
                            .save(path)
                            .with_context(|| format!("Failed to save bindings: {}", path.display()))?;
                        info!("Bindings saved to {}", path.display());
                    }
                }
                CommitOutcome::Cancelled { conflicts } => {
                    println!(
                        "{} {} conflicting binding(s); rerun with --on-conflict replace or apply",
                        "Not bound:".red().bold(),
                        conflicts
                    );
                }
            }
        }
        EngineEvent::Cancelled { .. } => println!("{}", "Listening cancelled".yellow()),
        EngineEvent::TimedOut { .. } => println!("{}", "No input detected before the timeout".yellow()),
    }
    Ok(())
}

fn list_devices(config: &EngineConfig, json: bool) -> Result<()> {
    let devices = GilrsDevices::new()?;
    let descriptors = devices.enumerate()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&descriptors)?);
        return Ok(());
    }

    println!("\n{}", "=== Devices ===".bold().cyan());
    for (i, device) in descriptors.iter().enumerate() {
        let slot = match device.virtual_slot {
            Some(slot) => format!("virtual {}", slot).green().to_string(),
            None => "physical".dimmed().to_string(),
        };
        println!("  {:>2}. {} [{}] {}", i + 1, device.name, slot, device.id.to_string().dimmed());
    }

    let mut engine = Engine::new(config);
    let outcome = engine.auto_detect_order(&devices);

    println!("\n{} ({:?})", "Instance order:".bold(), outcome);
    for (virtual_id, instance) in engine.device_order().iter() {
        println!("  vjoy{} -> js{}", virtual_id, instance.to_string().yellow());
    }
    Ok(())
}

fn check(config: &EngineConfig, profile: Option<PathBuf>) -> Result<()> {
    let mut failed = false;

    match profile.as_ref().or(config.profile.as_ref()) {
        Some(path) => match read_profile(path, &config.axis_defaults) {
            Ok(profile) => println!(
                "{} '{}': {} axes, {} buttons, {} hats",
                "Profile OK".green().bold(),
                profile.name,
                profile.axes.len(),
                profile.buttons.len(),
                profile.hats.len()
            ),
            Err(e) => {
                println!("{} {:#}", "Profile invalid:".red().bold(), e);
                failed = true;
            }
        },
        None => println!("{}", "No profile configured".dimmed()),
    }

    let mut engine = Engine::new(config);
    engine.set_bindings(load_bindings(config)?);
    let report = engine.conflict_report();

    if report.is_empty() {
        println!("{} {} bindings, no conflicts", "Bindings OK".green().bold(), engine.bindings().len());
    } else {
        println!(
            "{} {} bindings in {} group(s)",
            "Conflicts:".red().bold(),
            report.conflicting_count(),
            report.groups.len()
        );
        for (key, members) in &report.groups {
            println!("  {:?} {} {:?}", key.device, key.input_name.cyan(), key.modifiers);
            for member in members {
                println!("    {} ({})", member.action.to_string().yellow(), member.device_type);
            }
        }
        failed = true;
    }

    if failed {
        anyhow::bail!("check failed");
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .init();

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
