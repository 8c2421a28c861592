//! Vigil Server: headless daemon that keeps vault lifecycles current
//!
//! Opens the SQLite store, then sweeps every open vault on a fixed
//! interval so Warning and Triggered transitions are persisted even when
//! nobody reads the vault. Designed for Docker / server deployment.
//!
//! # Usage
//!
//! ```bash
//! vigil-server --config /path/to/vigil-server.toml
//! vigil-server --check    # Run one sweep and exit
//! vigil-server --validate # Validate config and exit
//! ```

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use vigil_server::{config, daemon};

fn main() -> Result<()> {
    // Parse CLI args (minimal, no clap dependency needed)
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;
    let mut one_shot = false;
    let mut validate_only = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                if i < args.len() {
                    config_path = Some(PathBuf::from(&args[i]));
                } else {
                    anyhow::bail!("--config requires a path argument");
                }
            }
            "--check" | "--once" => {
                one_shot = true;
            }
            "--validate" => {
                validate_only = true;
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--version" | "-V" => {
                println!("vigil-server {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            other => {
                anyhow::bail!("Unknown argument: {}", other);
            }
        }
        i += 1;
    }

    // Load config; without --config every setting comes from defaults and env
    let mut server_config = match &config_path {
        Some(path) => config::ServerConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => config::ServerConfig::default(),
    };

    // Apply env overrides
    server_config.apply_env_overrides();

    // Validate
    server_config
        .validate()
        .context("Configuration validation failed")?;

    // Init logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(server_config.server.log_level.as_str()),
    )
    .init();

    if validate_only {
        let lifecycle = &server_config.lifecycle;
        let cipher = &server_config.cipher;
        println!("Configuration is valid.");
        println!(
            "  Data dir:       {}",
            server_config.server.data_dir.display()
        );
        println!(
            "  Sweep interval: {} secs",
            server_config.server.sweep_interval_secs
        );
        println!(
            "  Quorum:         {} ({:?})",
            lifecycle.attestation_quorum, lifecycle.attestation_roles
        );
        println!("  Revoke window:  {} hours", lifecycle.revoke_window_hours);
        println!("  Invite TTL:     {} days", lifecycle.invite_ttl_days);
        println!(
            "  Limits:         {} guardians, {} beneficiaries",
            server_config.limits.max_guardians, server_config.limits.max_beneficiaries
        );
        println!(
            "  Argon2id:       m={} KiB, t={}, p={}",
            cipher.m_cost, cipher.t_cost, cipher.p_cost
        );
        return Ok(());
    }

    // Build tokio runtime
    let rt = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;

    if one_shot {
        log::info!("Running single sweep…");
        let service = Arc::new(daemon::open_service(&server_config)?);
        let n = rt.block_on(daemon::run_check_cycle(service))?;
        log::info!("Done: {} transition(s).", n);
    } else {
        // Install Ctrl-C handler for graceful shutdown
        let shutdown = rt.block_on(async {
            tokio::select! {
                result = daemon::run(server_config) => result,
                _ = tokio::signal::ctrl_c() => {
                    log::info!("Received shutdown signal. Exiting…");
                    Ok(())
                }
            }
        });

        if let Err(e) = shutdown {
            log::error!("Server error: {:#}", e);
            std::process::exit(1);
        }
    }

    Ok(())
}

fn print_help() {
    println!(
        r#"Vigil Server: dead-man's-switch vault daemon

USAGE:
    vigil-server [OPTIONS]

OPTIONS:
    -c, --config <PATH>   Config file path (defaults apply when omitted)
    --check, --once       Run a single sweep and exit
    --validate            Validate configuration and exit
    -h, --help            Show this help message
    -V, --version         Show version

ENVIRONMENT VARIABLES (override config file):
    VIGIL_DATA_DIR             Data directory path
    VIGIL_SWEEP_INTERVAL       Sweep interval in seconds
    VIGIL_LOG_LEVEL            Log level (error/warn/info/debug/trace)
    VIGIL_ATTESTATION_QUORUM   Attestations needed to trigger early
    VIGIL_REVOKE_WINDOW_HOURS  Hours the owner may revoke a trigger

EXAMPLES:
    # Run as daemon with config file
    vigil-server --config /path/to/config.toml

    # Single sweep (useful for cron jobs)
    vigil-server --config config.toml --check

    # Validate configuration
    vigil-server --config config.toml --validate
"#
    );
}
