//! Server configuration, parsed from a TOML file plus environment variable overrides.
//!
//! Priority: environment variables > config file > defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vigil_core::CipherParams;
use vigil_inherit::{LifecyclePolicy, TierLimits};

/// Database file name inside `data_dir`
const DB_FILE: &str = "vigil.db";

/// Top-level server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    /// General server settings
    #[serde(default)]
    pub server: ServerSection,

    /// Lifecycle tuning
    #[serde(default)]
    pub lifecycle: LifecyclePolicy,

    /// Tier limits applied to new vaults
    #[serde(default)]
    pub limits: TierLimits,

    /// Argon2id cost for fragment encryption
    #[serde(default)]
    pub cipher: CipherSection,
}

/// General server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Data directory (SQLite DB)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Sweep interval in seconds (default: 15 minutes)
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            sweep_interval_secs: default_sweep_interval(),
            log_level: default_log_level(),
        }
    }
}

/// Argon2id parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CipherSection {
    /// Memory cost in KiB
    #[serde(default = "default_m_cost")]
    pub m_cost: u32,

    /// Iterations
    #[serde(default = "default_t_cost")]
    pub t_cost: u32,

    /// Lanes
    #[serde(default = "default_p_cost")]
    pub p_cost: u32,
}

impl Default for CipherSection {
    fn default() -> Self {
        Self {
            m_cost: default_m_cost(),
            t_cost: default_t_cost(),
            p_cost: default_p_cost(),
        }
    }
}

impl CipherSection {
    pub fn params(&self) -> CipherParams {
        CipherParams {
            m_cost: self.m_cost,
            t_cost: self.t_cost,
            p_cost: self.p_cost,
        }
    }
}

// ============================================================================
// Default value functions
// ============================================================================

fn default_data_dir() -> PathBuf {
    PathBuf::from("/data")
}

fn default_sweep_interval() -> u64 {
    900 // 15 minutes
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_m_cost() -> u32 {
    CipherParams::default().m_cost
}

fn default_t_cost() -> u32 {
    CipherParams::default().t_cost
}

fn default_p_cost() -> u32 {
    CipherParams::default().p_cost
}

// ============================================================================
// Loading & environment override
// ============================================================================

impl ServerConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: ServerConfig =
            toml::from_str(&contents).with_context(|| "Failed to parse TOML config")?;
        Ok(config)
    }

    /// Apply environment variable overrides.
    ///
    /// Supported env vars:
    /// - `VIGIL_DATA_DIR`
    /// - `VIGIL_SWEEP_INTERVAL`
    /// - `VIGIL_LOG_LEVEL`
    /// - `VIGIL_ATTESTATION_QUORUM`
    /// - `VIGIL_REVOKE_WINDOW_HOURS`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VIGIL_DATA_DIR") {
            self.server.data_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VIGIL_SWEEP_INTERVAL") {
            if let Ok(secs) = v.parse::<u64>() {
                self.server.sweep_interval_secs = secs;
            }
        }
        if let Ok(v) = std::env::var("VIGIL_LOG_LEVEL") {
            self.server.log_level = v;
        }
        if let Ok(v) = std::env::var("VIGIL_ATTESTATION_QUORUM") {
            if let Ok(quorum) = v.parse::<usize>() {
                self.lifecycle.attestation_quorum = quorum;
            }
        }
        if let Ok(v) = std::env::var("VIGIL_REVOKE_WINDOW_HOURS") {
            if let Ok(hours) = v.parse::<u32>() {
                self.lifecycle.revoke_window_hours = hours;
            }
        }
    }

    /// Path of the SQLite database
    pub fn db_path(&self) -> PathBuf {
        self.server.data_dir.join(DB_FILE)
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        // Sweep interval must be at least 60 seconds
        anyhow::ensure!(
            self.server.sweep_interval_secs >= 60,
            "server.sweep_interval_secs must be >= 60"
        );

        self.lifecycle
            .validate()
            .map_err(|e| anyhow::anyhow!("lifecycle: {}", e))?;

        anyhow::ensure!(
            self.limits.max_guardians >= 1,
            "limits.max_guardians must be >= 1"
        );
        anyhow::ensure!(
            self.limits.max_guardians <= u8::MAX as usize,
            "limits.max_guardians must be <= 255"
        );
        anyhow::ensure!(
            self.limits.max_beneficiaries >= 1,
            "limits.max_beneficiaries must be >= 1"
        );

        self.cipher
            .params()
            .validate()
            .context("cipher parameters out of range")?;

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
