//! Engine configuration
//!
//! The minimal surface the core honours: ring capacity, risk limits, and
//! the persistence root/mode. Loaded from JSON; every field has a default
//! so partial configs are valid.

use crate::risk::RiskLimits;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Event ring configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    /// Number of pre-allocated event slots. Must be a power of two.
    pub capacity: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self { capacity: 65_536 }
    }
}

/// How journals persist records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PersistenceMode {
    /// Indices only, nothing touches disk.
    InMemory,
    /// Buffered appends, fsync on flush() and close().
    FileBased,
    /// fsync after every append.
    DurableLog,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub root: PathBuf,
    pub mode: PersistenceMode,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./journal"),
            mode: PersistenceMode::FileBased,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub ring: RingConfig,
    pub risk: RiskLimits,
    pub persistence: PersistenceConfig,
}

impl EngineConfig {
    /// In-memory configuration for tests and simulations.
    pub fn in_memory() -> Self {
        Self {
            persistence: PersistenceConfig {
                root: PathBuf::new(),
                mode: PersistenceMode::InMemory,
            },
            ..Self::default()
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&raw)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ring.capacity == 0 || !self.ring.capacity.is_power_of_two() {
            bail!(
                "ring.capacity must be a non-zero power of two, got {}",
                self.ring.capacity
            );
        }
        if self.persistence.mode != PersistenceMode::InMemory
            && self.persistence.root.as_os_str().is_empty()
        {
            bail!("persistence.root must be set for file-backed modes");
        }
        self.risk.validate()?;
        Ok(())
    }
}
