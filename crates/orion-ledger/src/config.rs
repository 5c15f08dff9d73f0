//! Ledger configuration.

use crate::error::{Error, Result};
use std::path::PathBuf;

/// Default number of placement attempts before surfacing a conflict.
pub const DEFAULT_MAX_PLACEMENT_ATTEMPTS: u32 = 5;

/// Configuration for a ledger instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Data directory for storage
    pub data_dir: PathBuf,

    /// Attempts per transactional operation when commits conflict
    pub max_placement_attempts: u32,

    /// Member (code or id) that resolves commissions when none is given
    pub admin: Option<String>,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./orion-data"),
            max_placement_attempts: DEFAULT_MAX_PLACEMENT_ATTEMPTS,
            admin: None,
        }
    }
}

impl LedgerConfig {
    /// Create config from environment variables with sensible defaults.
    ///
    /// - `ORION_DATA_DIR` (default `./orion-data`)
    /// - `ORION_MAX_PLACEMENT_ATTEMPTS` (default 5)
    /// - `ORION_ADMIN` (default unset, meaning the root member)
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let data_dir = lookup("ORION_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let max_placement_attempts = match lookup("ORION_MAX_PLACEMENT_ATTEMPTS") {
            Some(raw) => {
                let attempts: u32 = raw.trim().parse().map_err(|_| {
                    Error::Config(format!("ORION_MAX_PLACEMENT_ATTEMPTS: not a number: {:?}", raw))
                })?;
                if attempts == 0 {
                    return Err(Error::Config(
                        "ORION_MAX_PLACEMENT_ATTEMPTS must be at least 1".to_string(),
                    ));
                }
                attempts
            }
            None => defaults.max_placement_attempts,
        };

        let admin = lookup("ORION_ADMIN")
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        Ok(Self {
            data_dir,
            max_placement_attempts,
            admin,
        })
    }
}
