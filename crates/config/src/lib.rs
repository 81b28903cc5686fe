//! # Config - psnap worker configuration
//!
//! All settings are read once at startup, either from the process
//! environment ([`Config::from_env`]) or from an arbitrary key lookup
//! ([`Config::from_lookup`]) so tests never have to touch global state.
//!
//! ```text
//! PSNAP_OUTPUT_DIR          snapshot output root        (required by init)
//! PSNAP_BACKUP_INTERVAL_MS  interval between snapshots  (default: 300000)
//! PSNAP_SNAPSHOT_ORDER      lexicographic | numeric     (default: lexicographic)
//! PSNAP_WORKER_INDEX        worker-group index          (default: 0)
//! PSNAP_ATTEMPT_INDEX       attempt index of this run   (default: 0)
//! PSNAP_CLOCKS_FILE         coordinator clock file      (optional)
//! ```

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const ENV_OUTPUT_DIR: &str = "PSNAP_OUTPUT_DIR";
pub const ENV_BACKUP_INTERVAL_MS: &str = "PSNAP_BACKUP_INTERVAL_MS";
pub const ENV_SNAPSHOT_ORDER: &str = "PSNAP_SNAPSHOT_ORDER";
pub const ENV_WORKER_INDEX: &str = "PSNAP_WORKER_INDEX";
pub const ENV_ATTEMPT_INDEX: &str = "PSNAP_ATTEMPT_INDEX";
pub const ENV_CLOCKS_FILE: &str = "PSNAP_CLOCKS_FILE";

/// Default interval between two snapshot writes (five minutes).
pub const DEFAULT_BACKUP_INTERVAL_MS: u64 = 5 * 60 * 1000;

/// Errors raised while reading configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{key}: invalid value '{value}' ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// How the recovery resolver picks the newest file inside one attempt
/// directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotOrder {
    /// Compare file names byte by byte. `snapshots_10` sorts below
    /// `snapshots_2`, which is the legacy behavior.
    #[default]
    Lexicographic,
    /// Compare the trailing `_<generation>` as an integer.
    Numeric,
}

impl FromStr for SnapshotOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "lexicographic" => Ok(Self::Lexicographic),
            "numeric" => Ok(Self::Numeric),
            other => Err(format!("expected 'lexicographic' or 'numeric', got '{}'", other)),
        }
    }
}

impl fmt::Display for SnapshotOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lexicographic => f.write_str("lexicographic"),
            Self::Numeric => f.write_str("numeric"),
        }
    }
}

/// The part of the configuration consumed by the snapshot subsystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotSettings {
    /// Root under which `snapshots/<worker>/<attempt>/` lives. `None` is a
    /// fatal error once the snapshot manager initializes.
    pub output_root: Option<PathBuf>,
    /// Sleep between two snapshot cycles. Must be non-zero:
    /// `from_lookup` rejects zero and `SnapshotManager::start` refuses it.
    pub backup_interval: Duration,
    pub snapshot_order: SnapshotOrder,
}

impl SnapshotSettings {
    pub fn new<P: Into<PathBuf>>(output_root: P, backup_interval: Duration) -> Self {
        Self {
            output_root: Some(output_root.into()),
            backup_interval,
            snapshot_order: SnapshotOrder::default(),
        }
    }

    pub fn with_snapshot_order(mut self, order: SnapshotOrder) -> Self {
        self.snapshot_order = order;
        self
    }
}

impl Default for SnapshotSettings {
    fn default() -> Self {
        Self {
            output_root: None,
            backup_interval: Duration::from_millis(DEFAULT_BACKUP_INTERVAL_MS),
            snapshot_order: SnapshotOrder::default(),
        }
    }
}

/// Full worker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Config {
    pub snapshot: SnapshotSettings,
    pub worker_index: u32,
    pub attempt_index: u32,
    /// Source of authoritative task clocks for the file-backed coordinator.
    pub clocks_file: Option<PathBuf>,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`. Unset and empty values fall
    /// back to their defaults; malformed values are errors.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let output_root = get(ENV_OUTPUT_DIR).map(PathBuf::from);

        let interval_ms = match get(ENV_BACKUP_INTERVAL_MS) {
            Some(raw) => {
                let ms: u64 = parse(ENV_BACKUP_INTERVAL_MS, &raw)?;
                if ms == 0 {
                    return Err(ConfigError::Invalid {
                        key: ENV_BACKUP_INTERVAL_MS,
                        value: raw,
                        reason: "interval must be positive".to_string(),
                    });
                }
                ms
            }
            None => DEFAULT_BACKUP_INTERVAL_MS,
        };

        let snapshot_order = match get(ENV_SNAPSHOT_ORDER) {
            Some(raw) => parse(ENV_SNAPSHOT_ORDER, &raw)?,
            None => SnapshotOrder::default(),
        };

        let worker_index = match get(ENV_WORKER_INDEX) {
            Some(raw) => parse(ENV_WORKER_INDEX, &raw)?,
            None => 0,
        };
        let attempt_index = match get(ENV_ATTEMPT_INDEX) {
            Some(raw) => parse(ENV_ATTEMPT_INDEX, &raw)?,
            None => 0,
        };

        Ok(Self {
            snapshot: SnapshotSettings {
                output_root,
                backup_interval: Duration::from_millis(interval_ms),
                snapshot_order,
            },
            worker_index,
            attempt_index,
            clocks_file: get(ENV_CLOCKS_FILE).map(PathBuf::from),
        })
    }
}

fn parse<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
