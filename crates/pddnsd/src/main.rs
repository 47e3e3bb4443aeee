// # pddnsd - passive DDNS daemon
//
// Thin integration layer: everything that decides when and what to update
// lives in pddns-core. The daemon is responsible for:
// 1. Reading the configuration file
// 2. Initializing logging and the runtime
// 3. Registering IP sources and providers
// 4. Wiring OS signals to the engine's control handle
// 5. Starting the engine
//
// ## Usage
//
// ```text
// pddnsd            poll forever
// pddnsd --once     run one reconciliation pass and exit
// pddnsd --version  print the version
// ```
//
// ## Configuration
//
// A TOML file, path from `PDDNS_CONFIG` (default `data/config.toml`):
//
// ```toml
// interval_secs = 600
//
// [ip_source]
// type = "openwrt"
// route = "192.168.1.1"
// user = "root"
// password = "secret"
//
// [provider]
// type = "cloudflare"
// api_token = "..."
// zones = { "023e105f4ecef8ad9ca31a8372d0c353" = ["home.example.com"] }
//
// [log]
// level = "info"
// ```
//
// `PDDNS_LOG_LEVEL` overrides `log.level`.
//
// ## Signals
//
// - `SIGUSR1`: drop provider caches and poll now
// - `SIGINT` / `SIGTERM`: close the provider and exit

use anyhow::{Context, Result};
use pddns_core::{ControlHandle, DdnsConfig, DdnsEngine, LoopControl, ProviderRegistry};
use std::env;
use std::path::Path;
use std::process::ExitCode;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Default configuration file location
const DEFAULT_CONFIG_PATH: &str = "data/config.toml";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DdnsExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<DdnsExitCode> for ExitCode {
    fn from(code: DdnsExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// What the command line asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run,
    Once,
    Version,
}

fn parse_args<I, S>(args: I) -> Result<Command>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut command = Command::Run;
    for arg in args {
        command = match arg.as_ref() {
            "--once" => Command::Once,
            "--version" | "-V" => return Ok(Command::Version),
            other => anyhow::bail!(
                "unknown argument '{}'. Usage: pddnsd [--once | --version]",
                other
            ),
        };
    }
    Ok(command)
}

/// Read and validate the configuration file
fn load_config(path: &Path) -> Result<DdnsConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: DdnsConfig =
        toml::from_str(&text).with_context(|| format!("Failed to parse {}", path.display()))?;
    config
        .validate()
        .with_context(|| format!("Invalid configuration in {}", path.display()))?;
    Ok(config)
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// `PDDNS_LOG_LEVEL` wins over the config file when it names a valid level
fn effective_level(env_level: Option<&str>, config_level: &str) -> Level {
    if let Some(level) = env_level {
        match parse_level(level) {
            Some(level) => return level,
            None => eprintln!(
                "WARNING: PDDNS_LOG_LEVEL '{}' is not valid, using '{}' from config",
                level, config_level
            ),
        }
    }
    parse_level(config_level).unwrap_or(Level::INFO)
}

fn registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();
    pddns_ip_http::register(&mut registry);
    pddns_ip_router::register(&mut registry);
    pddns_provider_cloudflare::register(&mut registry);
    pddns_provider_hostker::register(&mut registry);
    pddns_provider_upstream::register(&mut registry);
    registry
}

fn main() -> ExitCode {
    let command = match parse_args(env::args().skip(1)) {
        Ok(command) => command,
        Err(e) => {
            eprintln!("{}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    if command == Command::Version {
        println!("pddnsd {}", env!("CARGO_PKG_VERSION"));
        return DdnsExitCode::CleanShutdown.into();
    }

    let config_path =
        env::var("PDDNS_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let config = match load_config(Path::new(&config_path)) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return DdnsExitCode::ConfigError.into();
        }
    };

    // Initialize tracing
    let env_level = env::var("PDDNS_LOG_LEVEL").ok();
    let log_level = effective_level(env_level.as_deref(), &config.log.level);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return DdnsExitCode::ConfigError.into();
    }

    info!("Starting pddnsd {}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", config_path);

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return DdnsExitCode::RuntimeError.into();
        }
    };

    rt.block_on(run_daemon(config, command == Command::Once))
        .into()
}

/// Build the engine and run it to completion
async fn run_daemon(config: DdnsConfig, once: bool) -> DdnsExitCode {
    let registry = registry();

    info!("IP source type: {}", config.ip_source.type_name());
    info!("Provider type: {}", config.provider.type_name());

    let built = registry
        .create_ip_source(&config.ip_source, &config.engine)
        .and_then(|source| {
            let provider = registry.create_provider(&config.provider, &config.engine)?;
            DdnsEngine::new(source, provider, LoopControl::new(), &config)
        });

    let (mut engine, mut events) = match built {
        Ok(pair) => pair,
        Err(e) => {
            error!("Failed to start engine: {}", e);
            return DdnsExitCode::ConfigError;
        }
    };

    if once {
        return match run_once(&mut engine).await {
            Ok(()) => DdnsExitCode::CleanShutdown,
            Err(e) => {
                error!("Reconciliation pass failed: {:#}", e);
                DdnsExitCode::RuntimeError
            }
        };
    }

    if let Err(e) = spawn_signal_forwarder(engine.control_handle()) {
        error!("{:#}", e);
        return DdnsExitCode::ConfigError;
    }

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!("Engine event: {:?}", event);
        }
    });

    match engine.run().await {
        Ok(()) => {
            info!("Shutting down daemon");
            DdnsExitCode::CleanShutdown
        }
        Err(e) => {
            error!("Daemon error: {}", e);
            DdnsExitCode::RuntimeError
        }
    }
}

async fn run_once(engine: &mut DdnsEngine) -> Result<()> {
    let report = engine.run_cycle().await;
    if let Err(e) = engine.close().await {
        warn!("Failed to close provider cleanly: {}", e);
    }

    let report = report?;
    info!(
        "Pass complete: {} record(s) checked, {} updated, address {}",
        report.records, report.updated, report.ip
    );
    Ok(())
}

/// Forward SIGUSR1 as reload and SIGINT/SIGTERM as shutdown
#[cfg(unix)]
fn spawn_signal_forwarder(handle: ControlHandle) -> Result<()> {
    let mut sigusr1 =
        signal(SignalKind::user_defined1()).context("Failed to setup SIGUSR1 handler")?;
    let mut sigterm =
        signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint =
        signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = sigusr1.recv() => {
                    info!("Received SIGUSR1, reloading");
                    handle.request_reload();
                }
                _ = sigterm.recv() => {
                    info!("Received shutdown signal: SIGTERM");
                    handle.request_shutdown();
                }
                _ = sigint.recv() => {
                    info!("Received shutdown signal: SIGINT");
                    handle.request_shutdown();
                }
            }
        }
    });

    Ok(())
}

/// Forward Ctrl-C as shutdown
///
/// Fallback implementation for non-Unix platforms, which have no reload
/// signal.
#[cfg(not(unix))]
fn spawn_signal_forwarder(handle: ControlHandle) -> Result<()> {
    tokio::spawn(async move {
        loop {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Received Ctrl-C");
                    handle.request_shutdown();
                }
                Err(e) => {
                    error!("Failed to wait for Ctrl-C: {}", e);
                    return;
                }
            }
        }
    });

    Ok(())
}
