// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Configuration loading from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::job::JobOptions;

/// Deposit service configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite connection URL for the status registries
    pub database_url: String,
    /// Root directory holding per-deposit graph, events, techmd and data
    pub deposits_dir: PathBuf,
    /// Base URI of the FITS characterization servlet
    pub fits_url: String,
    /// `host:port` of the clamd daemon
    pub clamd_addr: String,
    /// Whether clamd shares a filesystem with this process; selects
    /// path-based SCAN over INSTREAM
    pub clamd_local: bool,
    /// Worker pool size for per-object fan-out
    pub workers: usize,
    /// Maximum spawned-but-unreaped tasks per job
    pub max_queued: usize,
    /// Timeout for any single external call
    pub external_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Required:
    /// - `PRESERVA_DATABASE_URL`: SQLite connection string
    ///
    /// Optional (with defaults):
    /// - `PRESERVA_DEPOSITS_DIR`: deposit storage root (default: `.data/deposits`)
    /// - `PRESERVA_FITS_URL`: FITS servlet base URI (default: `http://localhost:8080/fits`)
    /// - `PRESERVA_CLAMD_ADDR`: clamd address (default: `127.0.0.1:3310`)
    /// - `PRESERVA_CLAMD_LOCAL`: clamd sees the deposit filesystem (default: `false`)
    /// - `PRESERVA_WORKERS`: worker pool size (default: 4)
    /// - `PRESERVA_MAX_QUEUED`: task admission limit (default: 64)
    /// - `PRESERVA_EXTERNAL_TIMEOUT_SECS`: external call timeout (default: 120)
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = std::env::var("PRESERVA_DATABASE_URL")
            .map_err(|_| ConfigError::Missing("PRESERVA_DATABASE_URL"))?;

        let deposits_dir = std::env::var("PRESERVA_DEPOSITS_DIR")
            .unwrap_or_else(|_| ".data/deposits".to_string())
            .into();

        let fits_url = std::env::var("PRESERVA_FITS_URL")
            .unwrap_or_else(|_| "http://localhost:8080/fits".to_string());

        let clamd_addr = std::env::var("PRESERVA_CLAMD_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:3310".to_string());

        let clamd_local: bool = std::env::var("PRESERVA_CLAMD_LOCAL")
            .unwrap_or_else(|_| "false".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("PRESERVA_CLAMD_LOCAL", "must be 'true' or 'false'")
            })?;

        let workers: usize = std::env::var("PRESERVA_WORKERS")
            .unwrap_or_else(|_| "4".to_string())
            .parse()
            .map_err(|_| ConfigError::Invalid("PRESERVA_WORKERS", "must be a positive integer"))?;
        if workers == 0 {
            return Err(ConfigError::Invalid(
                "PRESERVA_WORKERS",
                "must be a positive integer",
            ));
        }

        let max_queued: usize = std::env::var("PRESERVA_MAX_QUEUED")
            .unwrap_or_else(|_| "64".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid("PRESERVA_MAX_QUEUED", "must be a positive integer")
            })?;
        if max_queued < workers {
            return Err(ConfigError::Invalid(
                "PRESERVA_MAX_QUEUED",
                "must be at least PRESERVA_WORKERS",
            ));
        }

        let timeout_secs: u64 = std::env::var("PRESERVA_EXTERNAL_TIMEOUT_SECS")
            .unwrap_or_else(|_| "120".to_string())
            .parse()
            .map_err(|_| {
                ConfigError::Invalid(
                    "PRESERVA_EXTERNAL_TIMEOUT_SECS",
                    "must be a positive integer",
                )
            })?;

        Ok(Self {
            database_url,
            deposits_dir,
            fits_url,
            clamd_addr,
            clamd_local,
            workers,
            max_queued,
            external_timeout: Duration::from_secs(timeout_secs),
        })
    }

    /// Job tuning knobs derived from this configuration.
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            workers: self.workers,
            max_queued: self.max_queued,
            external_timeout: self.external_timeout,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    Missing(&'static str),

    /// An environment variable has an invalid value.
    #[error("invalid value for {0}: {1}")]
    Invalid(&'static str, &'static str),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Mutex to serialize tests that modify environment variables
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    /// Helper to set env vars for a test and restore them after
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new() -> Self {
            Self { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::set_var(key, value) };
        }

        fn remove(&mut self, key: &str) {
            let old = env::var(key).ok();
            self.vars.push((key.to_string(), old));
            // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
            unsafe { env::remove_var(key) };
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (key, value) in self.vars.drain(..).rev() {
                // SAFETY: Tests are serialized via ENV_MUTEX, so no concurrent access
                unsafe {
                    match value {
                        Some(v) => env::set_var(&key, v),
                        None => env::remove_var(&key),
                    }
                }
            }
        }
    }

    fn clear_optional(guard: &mut EnvGuard) {
        guard.remove("PRESERVA_DEPOSITS_DIR");
        guard.remove("PRESERVA_FITS_URL");
        guard.remove("PRESERVA_CLAMD_ADDR");
        guard.remove("PRESERVA_CLAMD_LOCAL");
        guard.remove("PRESERVA_WORKERS");
        guard.remove("PRESERVA_MAX_QUEUED");
        guard.remove("PRESERVA_EXTERNAL_TIMEOUT_SECS");
    }

    #[test]
    fn test_config_from_env_with_defaults() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PRESERVA_DATABASE_URL", "sqlite:.data/preserva.db");
        clear_optional(&mut guard);

        let config = Config::from_env().unwrap();

        assert_eq!(config.database_url, "sqlite:.data/preserva.db");
        assert_eq!(config.deposits_dir, PathBuf::from(".data/deposits"));
        assert_eq!(config.fits_url, "http://localhost:8080/fits");
        assert_eq!(config.clamd_addr, "127.0.0.1:3310");
        assert!(!config.clamd_local);
        assert_eq!(config.workers, 4);
        assert_eq!(config.max_queued, 64);
        assert_eq!(config.external_timeout, Duration::from_secs(120));
    }

    #[test]
    fn test_config_from_env_all_custom() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PRESERVA_DATABASE_URL", "sqlite::memory:");
        guard.set("PRESERVA_DEPOSITS_DIR", "/srv/deposits");
        guard.set("PRESERVA_FITS_URL", "http://fits.internal:8080/fits");
        guard.set("PRESERVA_CLAMD_ADDR", "clamd.internal:3310");
        guard.set("PRESERVA_CLAMD_LOCAL", "true");
        guard.set("PRESERVA_WORKERS", "8");
        guard.set("PRESERVA_MAX_QUEUED", "128");
        guard.set("PRESERVA_EXTERNAL_TIMEOUT_SECS", "30");

        let config = Config::from_env().unwrap();

        assert_eq!(config.deposits_dir, PathBuf::from("/srv/deposits"));
        assert_eq!(config.fits_url, "http://fits.internal:8080/fits");
        assert_eq!(config.clamd_addr, "clamd.internal:3310");
        assert!(config.clamd_local);
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_queued, 128);
        assert_eq!(config.external_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_config_missing_database_url() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.remove("PRESERVA_DATABASE_URL");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Missing("PRESERVA_DATABASE_URL")));
        assert!(err.to_string().contains("PRESERVA_DATABASE_URL"));
    }

    #[test]
    fn test_config_invalid_workers() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PRESERVA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("PRESERVA_WORKERS", "zero");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("PRESERVA_WORKERS", _)));
    }

    #[test]
    fn test_config_invalid_clamd_local() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PRESERVA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("PRESERVA_CLAMD_LOCAL", "yes");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid("PRESERVA_CLAMD_LOCAL", _)
        ));
    }

    #[test]
    fn test_config_zero_workers_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PRESERVA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("PRESERVA_WORKERS", "0");

        assert!(Config::from_env().is_err());
    }

    #[test]
    fn test_config_max_queued_below_workers_rejected() {
        let _lock = ENV_MUTEX.lock().unwrap();
        let mut guard = EnvGuard::new();

        guard.set("PRESERVA_DATABASE_URL", "sqlite::memory:");
        clear_optional(&mut guard);
        guard.set("PRESERVA_WORKERS", "8");
        guard.set("PRESERVA_MAX_QUEUED", "4");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid("PRESERVA_MAX_QUEUED", _)));
    }

    #[test]
    fn test_job_options_derived() {
        let config = Config {
            database_url: "sqlite::memory:".to_string(),
            deposits_dir: ".data/deposits".into(),
            fits_url: "http://localhost:8080/fits".to_string(),
            clamd_addr: "127.0.0.1:3310".to_string(),
            clamd_local: false,
            workers: 2,
            max_queued: 16,
            external_timeout: Duration::from_secs(10),
        };
        let options = config.job_options();
        assert_eq!(options.workers, 2);
        assert_eq!(options.max_queued, 16);
        assert_eq!(options.external_timeout, Duration::from_secs(10));
    }
}
