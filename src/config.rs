//! Configuration for ArborDB
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::error::{ArborError, Result};

/// Main configuration for an ArborDB handle
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Path of the single database file
    pub path: PathBuf,

    /// Create the file (with an empty header) when it does not exist
    pub create_if_missing: bool,

    // -------------------------------------------------------------------------
    // Durability Configuration
    // -------------------------------------------------------------------------
    /// Sync strategy: when to fsync after publishing a new root
    pub sync_strategy: SyncStrategy,
}

/// Sync strategy applied at commit time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every header publish (safest, slowest)
    EveryCommit,

    /// Leave write-back to the operating system
    OsManaged,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./arbor.db"),
            create_if_missing: true,
            sync_strategy: SyncStrategy::EveryCommit,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the config before any file is touched
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(ArborError::Config("database path is empty".to_string()));
        }
        if self.path.is_dir() {
            return Err(ArborError::Config(format!(
                "database path {} is a directory",
                self.path.display()
            )));
        }
        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the database file path
    pub fn path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Set whether a missing file is created on open
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Set the commit sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
