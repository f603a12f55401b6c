// # srund - Captive Portal Guard Daemon
//
// Thin integration layer: all login, retry, DDNS and event logic lives in
// srun-core. The daemon is responsible for:
// 1. Loading the JSON configuration
// 2. Initializing logging and the runtime
// 3. Registering DNS providers and building the portal, webhook and queue
// 4. Running a single pass or the guardian until a shutdown signal
// 5. Draining the event queue before exit
//
// ## Environment
//
// - `SRUN_CONFIG`: Path to the configuration file (default `config.json`)
// - `SRUN_LOG_LEVEL`: trace, debug, info, warn or error; overrides `log.level`
//
// ## Example
//
// ```bash
// export SRUN_CONFIG=/etc/srun-guard/config.json
// export SRUN_LOG_LEVEL=debug
//
// srund
// ```
//
// ## Exit Status
//
// A failed login is logged and reported as an event; it does not change the
// exit status. Non-zero codes are reserved for startup and runtime failures.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use srun_core::{
    DnsUpdater, EventQueue, Guardian, LoginWorkflow, ProviderRegistry, Settings, login_all,
};
use srun_portal::PortalFactory;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

const DEFAULT_CONFIG_PATH: &str = "config.json";

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SrunExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SrunExitCode> for ExitCode {
    fn from(code: SrunExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

fn parse_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!(
            "log level '{}' is not valid. Valid levels: trace, debug, info, warn, error",
            level
        ),
    }
}

fn main() -> ExitCode {
    let config_path = env::var("SRUN_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());

    let settings = match Settings::from_file(&config_path) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SrunExitCode::ConfigError.into();
        }
    };

    let level_name = env::var("SRUN_LOG_LEVEL").unwrap_or_else(|_| settings.log.level.clone());
    let log_level = match parse_level(&level_name) {
        Ok(level) => level,
        Err(e) => {
            eprintln!("Configuration validation error: {}", e);
            return SrunExitCode::ConfigError.into();
        }
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SrunExitCode::ConfigError.into();
    }

    info!("Starting srund daemon");
    info!(
        "Configuration loaded from {}: {} account(s)",
        config_path,
        settings.accounts.len()
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SrunExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let workflow = match build_workflow(&settings) {
            Ok(workflow) => Arc::new(workflow),
            Err(e) => {
                error!("Startup error: {:#}", e);
                return SrunExitCode::ConfigError;
            }
        };

        if let Err(e) = run_daemon(&settings, workflow).await {
            error!("Daemon error: {:#}", e);
            SrunExitCode::RuntimeError
        } else {
            SrunExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Wire the portal, DNS updater and event queue into one workflow
fn build_workflow(settings: &Settings) -> Result<LoginWorkflow> {
    let registry = ProviderRegistry::new();

    #[cfg(feature = "cloudflare")]
    {
        info!("Registering Cloudflare provider");
        srun_dns_cloudflare::register(&registry);
    }

    let ddns = if settings.ddns.enable {
        let provider = registry
            .create_dns_provider(&settings.ddns.provider, &settings.ddns.config)
            .with_context(|| format!("failed to create DNS provider '{}'", settings.ddns.provider))?;
        info!(
            provider = %settings.ddns.provider,
            domain = %settings.ddns.domain,
            "DDNS enabled"
        );
        Some(DnsUpdater::new(Arc::from(provider), &settings.ddns))
    } else {
        None
    };

    let sink = srun_webhook::from_config(&settings.webhook).context("failed to create webhook sink")?;
    let queue = EventQueue::new(sink);
    let portal = Arc::new(PortalFactory::new(settings.portal.clone()));

    Ok(LoginWorkflow::from_settings(settings, portal, queue, ddns))
}

/// Run a single pass or the guardian, then drain the event queue
async fn run_daemon(settings: &Settings, workflow: Arc<LoginWorkflow>) -> Result<()> {
    let shutdown = CancellationToken::new();
    let watcher = tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match wait_for_shutdown().await {
                Ok(signal) => {
                    info!("Received shutdown signal: {}", signal);
                    shutdown.cancel();
                }
                Err(e) => error!("Shutdown signal error: {}", e),
            }
        }
    });

    if settings.guardian.enable {
        let guardian = Guardian::new(Arc::clone(&workflow), settings.guardian.duration());
        let accounts = settings.accounts.iter().cloned().map(Arc::new).collect();
        guardian.run(accounts, shutdown.clone()).await;
    } else {
        if settings.accounts.is_empty() {
            warn!("No accounts configured, nothing to log in");
        }
        let report = login_all(&workflow, &settings.accounts, &shutdown).await;
        for (username, reason) in &report.failed {
            warn!(username = %username, "Account not logged in: {}", reason);
        }
    }

    watcher.abort();

    info!("Shutting down daemon");
    let deadline = settings.webhook.timeout();
    if let Err(e) = workflow.queue().close(deadline).await {
        warn!("Event queue did not drain cleanly: {}", e);
    }

    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_levels_case_insensitively() {
        assert_eq!(parse_level("DEBUG").unwrap(), Level::DEBUG);
        assert_eq!(parse_level("warn").unwrap(), Level::WARN);
        assert!(parse_level("verbose").is_err());
    }
}
