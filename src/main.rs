//! Nakama - Network MIDI 2.0 bridge
//!
//! Connects the local "Network MIDI 2.0 VD" virtual device to a remote
//! Network MIDI 2.0 endpoint (zynthian and friends).

use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use nakama::cli::{self, CliCommand};
use nakama::config::AppConfig;
use nakama::controller::{ConnectionController, ConnectionState, ControllerParts, StartOutcome};
use nakama::device::{self, MidirRegistry};
use nakama::endpoint::{sanitize_display_name, validate_display_name};
use nakama::forwarder::PortPair;
use nakama::messages::{format_message, message_channel, ConsoleAdvisor, MessageSender, NotificationAdvisor};
use nakama::paths::AppPaths;
use nakama::resolver::HostResolver;
use nakama::settings::{MemorySettings, Settings, SettingsStore, SledSettings};
use nakama::transport::build_transport;

/// Nakama - bridge a virtual MIDI device to a Network MIDI 2.0 endpoint
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (defaults to the app directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// List available MIDI ports
    #[arg(long)]
    list_ports: bool,

    /// Remote host name or IP address
    #[arg(long, env = "NAKAMA_HOST")]
    host: Option<String>,

    /// Remote UDP port
    #[arg(long)]
    port: Option<u16>,

    /// UMP endpoint name announced to the remote
    #[arg(long)]
    endpoint: Option<String>,

    /// Connect right away
    #[arg(long)]
    connect: bool,

    /// Remember whether to connect at launch (true/false)
    #[arg(long)]
    autoconnect: Option<bool>,

    /// Don't start the interactive prompt
    #[arg(long)]
    no_repl: bool,

    /// Keep settings in memory only
    #[arg(long)]
    no_persist: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let paths = AppPaths::detect();
    let dirs_ready = paths.ensure_directories();
    let _log_guard = init_logging(
        &args.log_level,
        dirs_ready.is_ok().then_some(paths.logs_dir.as_path()),
    )?;
    if let Err(e) = dirs_ready {
        warn!("File logging disabled: {:#}", e);
    }

    info!("Starting Nakama v{}...", env!("CARGO_PKG_VERSION"));

    if args.list_ports {
        device::print_ports()?;
        return Ok(());
    }

    let config_path = args.config.clone().unwrap_or_else(|| paths.config.clone());
    let config = AppConfig::load_or_default(&config_path)?;
    info!("Configuration file: {}", config_path.display());

    let store: Arc<dyn SettingsStore> = if args.no_persist {
        Arc::new(MemorySettings::new())
    } else {
        Arc::new(SledSettings::open(paths.settings_db_path())?)
    };

    let mut settings = Settings::load(store.as_ref());
    if let Some(host) = &args.host {
        settings.remote_host = host.clone();
    }
    if let Some(port) = args.port {
        settings.remote_port = port;
    }
    if let Some(name) = &args.endpoint {
        settings.ump_endpoint = sanitize_display_name(name);
    }
    if let Some(autoconnect) = args.autoconnect {
        Settings::persist_autoconnect(store.as_ref(), autoconnect)
            .context("Failed to store autoconnect preference")?;
        settings.autoconnect = autoconnect;
    }

    let (messages_tx, mut messages) = message_channel();
    let controller = ConnectionController::new(ControllerParts {
        transport: build_transport(config.transport.kind),
        devices: Arc::new(MidirRegistry::default()),
        ports: PortPair::new(),
        resolver: HostResolver::system(config.resolve_timeout()),
        settings: Arc::clone(&store),
        messages: messages_tx.clone(),
        device_name: config.device.name.clone(),
        options: config.transport.session.clone(),
    });
    info!("Controller ready ({:?} transport)", config.transport.kind);

    if controller.current_state() == ConnectionState::Stopped {
        if settings.autoconnect || args.connect {
            connect(&controller, &settings, &messages_tx);
        } else {
            ConsoleAdvisor.advise("Nakama", "Did you connect to remote device?");
        }
    }

    let (cli_tx, mut cli_rx) = mpsc::unbounded_channel();
    if !args.no_repl {
        cli::spawn_repl(cli_tx.clone())?;
        println!("Type {} for commands.", "help".green());
    }

    let mut watchdog = tokio::time::interval(config.watchdog_interval());
    let mut state_rx = controller.subscribe();
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(command) = cli_rx.recv() => {
                if !handle_command(command, &controller, &mut settings, store.as_ref(), &messages_tx).await {
                    break;
                }
            }

            Some(msg) = messages.next() => {
                println!("{}", format_message(&msg));
            }

            _ = watchdog.tick() => {
                controller.check_liveness().await;
            }

            Ok(()) = state_rx.changed() => {
                let state = *state_rx.borrow_and_update();
                info!("Connection state: {}", state);
            }

            _ = &mut shutdown => {
                break;
            }
        }
    }

    // Cleanup
    info!("Shutting down...");
    drop(cli_tx);
    controller.request_stop().await;
    for msg in messages.drain() {
        println!("{}", format_message(&msg));
    }

    info!("Nakama shutdown complete");
    Ok(())
}

fn connect(controller: &ConnectionController, settings: &Settings, messages: &MessageSender) {
    match settings.endpoint() {
        Ok(endpoint) => {
            if controller.request_start(endpoint) == StartOutcome::AlreadyActive {
                println!("{}", "A session is already active.".yellow());
            }
        },
        Err(e) => messages.show(format!("ERROR: {}", e)),
    }
}

/// Apply one prompt command; `false` means leave
async fn handle_command(
    command: CliCommand,
    controller: &ConnectionController,
    settings: &mut Settings,
    store: &dyn SettingsStore,
    messages: &MessageSender,
) -> bool {
    match command {
        CliCommand::Start => connect(controller, settings, messages),
        CliCommand::Stop => controller.request_stop().await,
        CliCommand::Status => print_status(controller.current_state(), settings),
        CliCommand::Host(host) => {
            settings.remote_host = host;
            println!("Host set to {} (applies on next start)", settings.remote_host.green());
        },
        CliCommand::Port(port) => {
            settings.remote_port = port;
            println!("Port set to {} (applies on next start)", port.to_string().green());
        },
        CliCommand::Name(name) => {
            if let Err(e) = validate_display_name(&name) {
                println!("{}", format!("{}, truncating", e).yellow());
            }
            settings.ump_endpoint = sanitize_display_name(&name);
            println!("Endpoint name set to {}", settings.ump_endpoint.green());
        },
        CliCommand::Autoconnect(enabled) => match Settings::persist_autoconnect(store, enabled) {
            Ok(()) => {
                settings.autoconnect = enabled;
                println!("Autoconnect {}", if enabled { "on".green() } else { "off".yellow() });
            },
            Err(e) => warn!("Failed to store autoconnect preference: {:#}", e),
        },
        CliCommand::Help => cli::print_help(),
        CliCommand::Quit => return false,
    }
    true
}

fn print_status(state: ConnectionState, settings: &Settings) {
    let state_text = match state {
        ConnectionState::Running => state.to_string().green(),
        ConnectionState::Starting => state.to_string().yellow(),
        ConnectionState::Stopped => state.to_string().red(),
    };
    println!("\n{}", "=== Status ===".bold().cyan());
    println!("  State:       {}", state_text);
    println!("  Remote:      {}:{}", settings.remote_host, settings.remote_port);
    println!("  Endpoint:    {}", settings.ump_endpoint);
    println!("  Autoconnect: {}", settings.autoconnect);
    println!();
}

fn init_logging(level: &str, logs_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (file_layer, guard) = match logs_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "nakama.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        },
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false),
        )
        .with(file_layer)
        .init();

    Ok(guard)
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install CTRL+C signal handler");
    info!("Shutdown signal received");
}
