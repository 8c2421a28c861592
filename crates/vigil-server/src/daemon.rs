//! The daemon loop: periodically sweeps vaults and persists lifecycle transitions.

use crate::config::ServerConfig;
use crate::db::SqliteStore;
use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use vigil_inherit::{LifecycleEvent, VaultService};

/// Service type backing the daemon
pub type Service = VaultService<SqliteStore>;

/// Open the database and build the vault service from config.
pub fn open_service(config: &ServerConfig) -> Result<Service> {
    // Ensure data directory exists
    std::fs::create_dir_all(&config.server.data_dir).with_context(|| {
        format!(
            "Failed to create data dir: {}",
            config.server.data_dir.display()
        )
    })?;

    let db_path = config.db_path();
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    Ok(VaultService::new(Arc::new(store))
        .with_lifecycle(config.lifecycle.clone())
        .with_limits(config.limits)
        .with_cipher(config.cipher.params()))
}

/// Run the daemon loop. Blocks forever (until shutdown signal).
pub async fn run(config: ServerConfig) -> Result<()> {
    log::info!("Vigil server starting…");
    log::info!(
        "  Interval:   {} seconds ({:.1} minutes)",
        config.server.sweep_interval_secs,
        config.server.sweep_interval_secs as f64 / 60.0
    );
    log::info!("  Data dir:   {}", config.server.data_dir.display());
    log::info!(
        "  Quorum:     {} ({:?})",
        config.lifecycle.attestation_quorum,
        config.lifecycle.attestation_roles
    );

    let service = Arc::new(open_service(&config)?);
    let interval = Duration::from_secs(config.server.sweep_interval_secs);

    // Run first sweep immediately, then loop
    let mut first = true;
    loop {
        if !first {
            log::debug!(
                "Sleeping {} seconds until next sweep…",
                config.server.sweep_interval_secs
            );
            tokio::time::sleep(interval).await;
        }
        first = false;

        match run_check_cycle(Arc::clone(&service)).await {
            Ok(n) => log::info!("Sweep completed: {} transition(s).", n),
            Err(e) => log::error!("Sweep failed: {:#}", e),
        }
    }
}

/// Execute a single sweep and log every transition. Returns the number of events.
pub async fn run_check_cycle(service: Arc<Service>) -> Result<usize> {
    log::debug!("Starting sweep…");

    // SQLite calls block; keep them off the async workers
    let events = tokio::task::spawn_blocking(move || service.sweep(Utc::now()))
        .await
        .context("Sweep task panicked")?
        .context("Sweep failed")?;

    for event in &events {
        log_event(event);
    }
    Ok(events.len())
}

fn log_event(event: &LifecycleEvent) {
    match event {
        LifecycleEvent::EnteredWarning {
            vault_id,
            grace_deadline,
        } => {
            log::warn!(
                "[{}] Check-in overdue, grace period ends {}",
                vault_id,
                grace_deadline
            );
        }
        LifecycleEvent::Triggered {
            vault_id,
            reason,
            triggered_at,
        } => {
            log::warn!(
                "[{}] Vault triggered at {} ({:?}); beneficiaries may claim",
                vault_id,
                triggered_at,
                reason
            );
        }
        other => {
            log::info!("[{}] {}", other.vault_id(), other.label());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use vigil_inherit::{CreateVaultRequest, PartyInput, VaultStatus};

    fn config(dir: &TempDir) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.server.data_dir = dir.path().join("data");
        config.cipher.m_cost = 8 * 1024;
        config.cipher.t_cost = 1;
        config.cipher.p_cost = 1;
        config
    }

    #[tokio::test]
    async fn test_check_cycle_persists_transitions() {
        let dir = TempDir::new().unwrap();
        let config = config(&dir);
        let service = Arc::new(open_service(&config).unwrap());

        // Created long enough ago to be past due + grace
        let created = Utc::now() - chrono::Duration::days(60);
        let request = CreateVaultRequest {
            owner: "owner@example.com".into(),
            check_in_interval_days: 30,
            grace_period_days: 7,
            guardians: vec![
                PartyInput::new("Ann", "ann@example.com"),
                PartyInput::new("Ben", "ben@example.com"),
                PartyInput::new("Cat", "cat@example.com"),
            ],
            beneficiaries: vec![PartyInput::new("Dee", "dee@example.com")],
            attestors: vec![],
        };
        let id = service.create_vault(&request, created).unwrap().vault.id;

        let n = run_check_cycle(Arc::clone(&service)).await.unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            vigil_inherit::VaultStore::vault(service.store(), id)
                .unwrap()
                .unwrap()
                .status,
            VaultStatus::Triggered
        );

        // Second sweep is a no-op
        assert_eq!(run_check_cycle(service).await.unwrap(), 0);

        // Reopening sees the persisted state
        let reopened = open_service(&config).unwrap();
        assert_eq!(reopened.fragments(id).unwrap().len(), 3);
    }
}
