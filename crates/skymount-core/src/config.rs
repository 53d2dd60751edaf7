//! Mount configuration
//!
//! Everything the host binary resolves before handing control to the
//! engine: backend selection, working directory, credential source, mount
//! options, and the change-poll interval. Also holds the settings-file
//! helpers used for credential persistence (JSON or YAML, chosen by file
//! extension).

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Default change-poll interval when `-r` is not given.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Errors produced while assembling a [`MountConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid mount option '{0}': expected key=value or a bare flag")]
    InvalidMountOption(String),

    #[error("invalid value for mount option '{key}': {value}")]
    InvalidOptionValue { key: String, value: String },

    #[error("invalid duration '{0}': use e.g. 30, 30s, 5m or 1h")]
    InvalidDuration(String),
}

/// Resolved configuration for one mount.
///
/// Assembled by the CLI from flags and defaults; the engine consumes
/// `uid`, `gid`, `read_only` and `refresh_interval`, the backend consumes
/// `source`, and the rest stays host-side.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// Backend type selected with `-t` (e.g. `gdrive`).
    pub backend: String,
    /// Directory holding credential files (`-w`).
    pub workdir: PathBuf,
    /// Credential/config file for the selected backend; defaults to
    /// `<workdir>/<backend>.yaml`.
    pub source: PathBuf,
    /// Where the filesystem is mounted.
    pub mountpoint: PathBuf,
    /// Interval between change polls (`-r`).
    pub refresh_interval: Duration,
    /// Identity applied to every attribute response.
    pub uid: u32,
    pub gid: u32,
    /// Mount read-only (`-o ro`); mutating operations return EROFS.
    pub read_only: bool,
    /// Verbosity level (`-v` repeatable).
    pub verbose: u8,
    /// Detach from the terminal after mounting (`-d`).
    pub daemonize: bool,
}

impl MountConfig {
    /// A config for `backend` mounted at `mountpoint`, with the invoking
    /// user's identity and all other fields at their defaults.
    pub fn new(backend: impl Into<String>, mountpoint: impl Into<PathBuf>) -> Self {
        let backend = backend.into();
        let workdir = default_workdir();
        let source = workdir.join(format!("{backend}.yaml"));
        Self {
            backend,
            workdir,
            source,
            mountpoint: mountpoint.into(),
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            uid: process_uid(),
            gid: process_gid(),
            read_only: false,
            verbose: 0,
            daemonize: false,
        }
    }

    /// Default credential source for the configured backend:
    /// `<workdir>/<backend>.yaml`.
    pub fn default_source(&self) -> PathBuf {
        self.workdir.join(format!("{}.yaml", self.backend))
    }

    /// Apply a `-o key=val,…` mount-option string.
    ///
    /// Recognized options are `uid=<n>`, `gid=<n>` and the bare `ro` flag;
    /// unknown keys are ignored so option strings meant for the kernel can
    /// be passed through unchanged.
    pub fn apply_mount_options(&mut self, options: &str) -> Result<(), ConfigError> {
        for raw in options.split(',') {
            let opt = raw.trim();
            if opt.is_empty() {
                continue;
            }
            match opt.split_once('=') {
                Some((key, value)) => {
                    let key = key.trim();
                    let value = value.trim();
                    match key {
                        "uid" => self.uid = parse_id(key, value)?,
                        "gid" => self.gid = parse_id(key, value)?,
                        _ => {}
                    }
                }
                None => {
                    if opt == "ro" {
                        self.read_only = true;
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_id(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidOptionValue {
            key: key.to_string(),
            value: value.to_string(),
        })
}

/// The default working directory, `~/.skymount`.
pub fn default_workdir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".skymount")
}

/// Uid of the invoking user.
pub fn process_uid() -> u32 {
    // Safety: getuid never fails and touches no memory.
    unsafe { libc::getuid() }
}

/// Gid of the invoking user.
pub fn process_gid() -> u32 {
    unsafe { libc::getgid() }
}

/// Parse a refresh interval: bare seconds (`30`) or a value with an
/// `s`/`m`/`h` suffix (`30s`, `5m`, `1h`).
pub fn parse_refresh_interval(input: &str) -> Result<Duration, ConfigError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(ConfigError::InvalidDuration(input.to_string()));
    }
    let (number, unit) = match s.find(|c: char| !c.is_ascii_digit()) {
        Some(idx) => s.split_at(idx),
        None => (s, ""),
    };
    let value: u64 = number
        .parse()
        .map_err(|_| ConfigError::InvalidDuration(input.to_string()))?;
    let secs = match unit {
        "" | "s" => value,
        "m" => value * 60,
        "h" => value * 3600,
        _ => return Err(ConfigError::InvalidDuration(input.to_string())),
    };
    Ok(Duration::from_secs(secs))
}

/// Load a settings file, deserializing as YAML or JSON according to the
/// file extension (anything other than `.json` is treated as YAML).
pub fn load_settings<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let content = std::fs::read_to_string(path)?;
    let value = if is_json(path) {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    Ok(value)
}

/// Persist a settings file in the format implied by its extension.
pub fn store_settings<T: Serialize>(path: &Path, value: &T) -> anyhow::Result<()> {
    let content = if is_json(path) {
        serde_json::to_string_pretty(value)?
    } else {
        serde_yaml::to_string(value)?
    };
    std::fs::write(path, content)?;
    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("json")
}
