//! Per-user settings.
//!
//! These do not belong to any one solution: where the package cache lives,
//! how many packages to fetch at once, and how patient to be with slow feeds
//! and locked files. They are read from `<config dir>/ripple/config.toml`
//! and `RIPPLE_*` environment variables, e.g. `RIPPLE_CONCURRENCY=8`.

use config::{Config as ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use crate::core::{
    errors::{Error, Result},
    storage::LockPolicy,
};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct RippleSettings {
    /// Overrides the platform cache directory.
    pub cache: Option<PathBuf>,

    /// Maximum number of packages fetched concurrently.
    pub concurrency: usize,

    /// Per-package fetch timeout, in seconds.
    pub timeout_secs: u64,

    /// Extra attempts for fetches that fail transiently.
    pub fetch_retries: u32,

    pub lock_retries: u32,

    pub lock_delay_ms: u64,
}

impl Default for RippleSettings {
    fn default() -> Self {
        let policy = LockPolicy::default();

        RippleSettings {
            cache: None,
            concurrency: 4,
            timeout_secs: 120,
            fetch_retries: 1,
            lock_retries: policy.retries,
            lock_delay_ms: policy.delay.as_millis() as u64,
        }
    }
}

impl RippleSettings {
    /// Load the user's settings file and environment.
    pub fn load() -> Result<Self> {
        let path = dirs::config_dir().map(|dir| dir.join("ripple").join("config.toml"));
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(false));
        }

        let settings: RippleSettings = builder
            .add_source(
                Environment::with_prefix("RIPPLE")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| Error::new(e).context("failed to load user settings"))?
            .try_deserialize()
            .map_err(|e| Error::new(e).context("failed to deserialize user settings"))?;

        Ok(settings)
    }

    /// The package cache directory: the configured one, else the platform
    /// cache directory.
    pub fn cache_dir(&self) -> PathBuf {
        match self.cache {
            Some(ref dir) => dir.clone(),
            None => dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("ripple"),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn lock_policy(&self) -> LockPolicy {
        LockPolicy {
            retries: self.lock_retries,
            delay: Duration::from_millis(self.lock_delay_ms),
        }
    }
}
