//! Command-line interface for the OSRAM remote bridge.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use osram_bridge_core::config::env_vars;
use osram_bridge_core::{BridgeConfig, EventBus, EventBusReceiver};
use osram_bridge_devices::{AccessoryHost, BusConnection, MemoryHost, MessageRouter, StoredHost};

/// OSRAM Bridge - Expose OSRAM Smart+ Mini remotes from zigbee2mqtt as programmable switches.
#[derive(Parser, Debug)]
#[command(name = "osram-bridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Action to perform (defaults to run).
    #[command(subcommand)]
    command: Option<Command>,

    /// Configuration file (TOML).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Connect to the broker and bridge remotes until interrupted.
    Run(RunArgs),
    /// List accessories in the cache.
    Accessories {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Remove an accessory from the cache.
    Forget {
        /// Accessory UUID.
        #[arg(required = true)]
        uuid: String,
    },
    /// Print the effective configuration and exit.
    CheckConfig,
}

/// Overrides for the run command.
#[derive(clap::Args, Debug, Default)]
struct RunArgs {
    /// Broker URL (mqtt://host:port or mqtts://host:port).
    #[arg(long)]
    mqtt_url: Option<String>,
    /// Broker username.
    #[arg(long)]
    username: Option<String>,
    /// Broker password.
    #[arg(long)]
    password: Option<String>,
    /// zigbee2mqtt base topic.
    #[arg(long)]
    base_topic: Option<String>,
    /// Accessory cache database.
    #[arg(long)]
    cache: Option<PathBuf>,
    /// Keep accessories in memory only.
    #[arg(long)]
    no_cache: bool,
}

impl RunArgs {
    fn apply(&self, config: &mut BridgeConfig) {
        if let Some(url) = &self.mqtt_url {
            config.mqtt_url = url.clone();
        }
        if let Some(username) = &self.username {
            config.mqtt_username = Some(username.clone());
        }
        if let Some(password) = &self.password {
            config.mqtt_password = Some(password.clone());
        }
        if let Some(base_topic) = &self.base_topic {
            config.base_topic = base_topic.clone();
        }
        if let Some(cache) = &self.cache {
            config.cache_path = cache.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let command = args.command.unwrap_or(Command::Run(RunArgs::default()));
    let mut config = BridgeConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Command::Run(run_args) = &command {
        run_args.apply(&mut config);
    }
    config.validate().context("Invalid configuration")?;

    match command {
        Command::Run(run_args) => run_bridge(config, run_args.no_cache).await,
        Command::Accessories { json } => list_accessories(&config.cache_path, json),
        Command::Forget { uuid } => forget_accessory(&config.cache_path, &uuid),
        Command::CheckConfig => check_config(&config),
    }
}

/// Logs are written to stderr.
fn init_logging(verbose: bool) {
    // JSON format for production/container environments
    let json_logging = std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false);

    let default_directive = if verbose {
        "osram_bridge=debug"
    } else {
        "osram_bridge=info"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new(default_directive).add_directive(tracing::Level::WARN.into())
    });

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

/// Run the bridge until Ctrl-C.
async fn run_bridge(config: BridgeConfig, no_cache: bool) -> Result<()> {
    info!("OSRAM Bridge v{}", osram_bridge_core::VERSION);
    let bus = EventBus::new();
    tokio::spawn(log_events(bus.subscribe()));

    if no_cache {
        info!("Accessory cache disabled");
        run_with_host(config, MemoryHost::new(), bus).await
    } else {
        let host = StoredHost::open(&config.cache_path)?;
        info!("Using accessory cache {}", config.cache_path.display());
        run_with_host(config, host, bus).await
    }
}

async fn run_with_host<H: AccessoryHost>(config: BridgeConfig, host: H, bus: EventBus) -> Result<()> {
    let mut router = MessageRouter::new(&config.base_topic, host, bus.clone());

    // Cached accessories are restored before the first connect
    match router.restore_cached() {
        Ok(count) => info!("Restored {} cached accessories", count),
        Err(e) => error!("Failed to restore cached accessories: {}", e),
    }

    let connection = BusConnection::new(config, bus)?;
    connection.run(&mut router, shutdown_signal()).await?;

    info!(
        "Bridge stopped ({} accessories, {} routed devices)",
        router.reconciler().accessories().len(),
        router.routes().len()
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn log_events(mut rx: EventBusReceiver) {
    while let Some((event, meta)) = rx.recv().await {
        match serde_json::to_string(&event) {
            Ok(json) => debug!("[{}] {}", meta.source, json),
            Err(_) => debug!("[{}] {}", meta.source, event.type_name()),
        }
    }
}

/// List cached accessories.
fn list_accessories(cache_path: &Path, json: bool) -> Result<()> {
    if !cache_path.exists() {
        println!("No accessory cache at {}", cache_path.display());
        return Ok(());
    }

    let mut host = StoredHost::open(cache_path)?;
    let accessories = host.cached_accessories()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&accessories)?);
        return Ok(());
    }

    if accessories.is_empty() {
        println!("No cached accessories.");
        return Ok(());
    }

    println!("{:<38} {:<24} {:<20} {:>8}", "UUID", "NAME", "MODEL", "BATTERY");
    for accessory in &accessories {
        let battery = accessory
            .battery()
            .and_then(|b| b.level)
            .map(|level| format!("{}%", level))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<38} {:<24} {:<20} {:>8}",
            accessory.uuid.to_string(),
            accessory.display_name,
            accessory.information.model,
            battery
        );
    }
    println!("\nTotal: {} accessories", accessories.len());
    Ok(())
}

/// Remove one accessory from the cache.
fn forget_accessory(cache_path: &Path, uuid: &str) -> Result<()> {
    let uuid = Uuid::parse_str(uuid).with_context(|| format!("Invalid accessory UUID: {}", uuid))?;
    if !cache_path.exists() {
        bail!("No accessory cache at {}", cache_path.display());
    }

    let mut host = StoredHost::open(cache_path)?;
    if !host.unregister_accessory(&uuid)? {
        bail!("Accessory {} not found", uuid);
    }
    println!("Removed accessory {}", uuid);
    Ok(())
}

fn check_config(config: &BridgeConfig) -> Result<()> {
    let endpoint = config.endpoint()?;
    print!("{}", toml::to_string_pretty(&config.redacted())?);
    println!(
        "\n# broker {} ({})",
        endpoint.address(),
        if endpoint.tls { "tls" } else { "plain" }
    );
    Ok(())
}
