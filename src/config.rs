//! Runtime configuration from the environment.
//!
//! | Variable | Default |
//! |---|---|
//! | `EXPENSE_LEDGER_DB` | `data/ledger.db` |
//! | `EXPENSE_LEDGER_PROVIDER_STATE` | `data/provider.sealed` |
//! | `EXPENSE_LEDGER_LOG_MODE` | `stderr` (or `file`) |
//! | `EXPENSE_LEDGER_LOG_FILE` | `data/expense-ledger.log` |
//!
//! # Provider password
//!
//! The sealed provider state is protected by a password read from, highest
//! precedence first:
//! - `EXPENSE_LEDGER_PASSWORD_FD` (read from an already-open FD, then close it)
//! - `EXPENSE_LEDGER_PASSWORD_FILE` (read from a file path)
//! - `/run/secrets/expense_ledger_password` (Docker/Compose secret default)
//!
//! In release builds, reading the password from an environment variable is
//! refused.

use std::path::{Path, PathBuf};
#[cfg(unix)]
use std::{io::Read, os::unix::io::FromRawFd};

use zeroize::Zeroizing;

const DB_ENV: &str = "EXPENSE_LEDGER_DB";
const PROVIDER_STATE_ENV: &str = "EXPENSE_LEDGER_PROVIDER_STATE";
const LOG_MODE_ENV: &str = "EXPENSE_LEDGER_LOG_MODE";
const LOG_FILE_ENV: &str = "EXPENSE_LEDGER_LOG_FILE";

const PASSWORD_FD_ENV: &str = "EXPENSE_LEDGER_PASSWORD_FD";
const PASSWORD_FILE_ENV: &str = "EXPENSE_LEDGER_PASSWORD_FILE";
const PASSWORD_DOCKER_SECRET_PATH: &str = "/run/secrets/expense_ledger_password";

// Dev-only escape hatch for local runs and tests.
const PASSWORD_ENV_DEV: &str = "EXPENSE_LEDGER_PASSWORD";

const DEFAULT_DB: &str = "data/ledger.db";
const DEFAULT_PROVIDER_STATE: &str = "data/provider.sealed";
const DEFAULT_LOG_FILE: &str = "data/expense-ledger.log";

/// Error type for configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Missing provider password: provide {PASSWORD_FD_ENV} or {PASSWORD_FILE_ENV} (or mount {PASSWORD_DOCKER_SECRET_PATH})"
    )]
    MissingPassword,

    #[error("Invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },

    #[error("Failed to read secret: {0}")]
    Io(#[from] std::io::Error),
}

/// Where log output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogMode {
    #[default]
    Stderr,
    File,
}

impl LogMode {
    fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "" | "stderr" => Ok(Self::Stderr),
            "file" => Ok(Self::File),
            _ => Err(ConfigError::InvalidValue {
                name: LOG_MODE_ENV,
                value: value.to_string(),
            }),
        }
    }
}

/// Paths and logging settings for the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    pub db_path: PathBuf,
    pub provider_state_path: PathBuf,
    pub log_mode: LogMode,
    pub log_file: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB),
            provider_state_path: PathBuf::from(DEFAULT_PROVIDER_STATE),
            log_mode: LogMode::Stderr,
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
        }
    }
}

impl LedgerConfig {
    /// Resolve configuration from the process environment.
    ///
    /// # Errors
    /// Returns `ConfigError::InvalidValue` for an unknown log mode.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let path = |name: &str, default: PathBuf| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map_or(default, PathBuf::from)
        };

        Ok(Self {
            db_path: path(DB_ENV, defaults.db_path),
            provider_state_path: path(PROVIDER_STATE_ENV, defaults.provider_state_path),
            log_mode: lookup(LOG_MODE_ENV)
                .map(|v| LogMode::parse(&v))
                .transpose()?
                .unwrap_or_default(),
            log_file: path(LOG_FILE_ENV, defaults.log_file),
        })
    }

    /// Get the provider sealing password from a secure source.
    ///
    /// # Errors
    /// Returns `ConfigError::MissingPassword` if no source yields a
    /// non-empty password.
    pub fn provider_password(&self) -> Result<Zeroizing<String>, ConfigError> {
        // 1) Read from an already-open FD (recommended for systemd/K8s sidecars)
        #[cfg(unix)]
        if let Ok(fd_str) = std::env::var(PASSWORD_FD_ENV) {
            let fd: i32 = fd_str
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    name: PASSWORD_FD_ENV,
                    value: fd_str.clone(),
                })?;
            if fd <= 2 {
                // Refuse stdio FDs; stdout carries command output.
                return Err(ConfigError::MissingPassword);
            }

            // SAFETY: We take ownership of the FD for one-time secret read and close it.
            let mut file = unsafe { std::fs::File::from_raw_fd(fd) };
            let mut buf = Zeroizing::new(String::new());
            file.read_to_string(&mut buf)?;
            return non_empty(&buf);
        }

        resolve_password(
            |name| std::env::var(name).ok(),
            Path::new(PASSWORD_DOCKER_SECRET_PATH),
        )
    }
}

/// File, Docker secret and dev env var sources, in that order.
fn resolve_password(
    lookup: impl Fn(&str) -> Option<String>,
    docker_secret: &Path,
) -> Result<Zeroizing<String>, ConfigError> {
    if let Some(path) = lookup(PASSWORD_FILE_ENV) {
        let content = Zeroizing::new(std::fs::read_to_string(path.trim())?);
        return non_empty(&content);
    }

    if docker_secret.exists() {
        let content = Zeroizing::new(std::fs::read_to_string(docker_secret)?);
        return non_empty(&content);
    }

    if cfg!(debug_assertions) {
        if let Some(v) = lookup(PASSWORD_ENV_DEV) {
            return non_empty(&Zeroizing::new(v));
        }
    }

    Err(ConfigError::MissingPassword)
}

fn non_empty(raw: &str) -> Result<Zeroizing<String>, ConfigError> {
    let secret = raw.trim_end_matches(['\n', '\r']);
    if secret.is_empty() {
        return Err(ConfigError::MissingPassword);
    }
    Ok(Zeroizing::new(secret.to_string()))
}
