//! Runner environment constants and wire configuration.
//!
//! Connection settings come from the optional `JUDGE_WIRE_CONFIG` environment
//! variable as JSON; every field has a default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Expected outputs mounted into the runner.
pub const EXPECTED_DIR: &str = "/expected";
/// Where the runner writes actual outputs.
pub const OUTPUT_DIR: &str = "/actual";
/// Root of the restricted filesystem the test case runs in.
pub const CHROOT_DIR: &str = "/chroot";
pub const EXPECTED_CONSOLE_DIR: &str = "/expected/cio";
pub const EXPECTED_FILE_DIR: &str = "/expected/file";

/// Console entry names used in result payloads.
pub const STDIN_NAME: &str = "stdin";
pub const STDOUT_NAME: &str = "stdout";
pub const STDERR_NAME: &str = "stderr";

/// On-disk capture files for the console streams.
pub const STDIN_FILE: &str = "stdin.txt";
pub const STDOUT_FILE: &str = "stdout.txt";
pub const STDERR_FILE: &str = "stderr.txt";

pub const DEFAULT_PORT: u16 = 55555;
pub const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Receiver bound on a frame's declared payload length (64 MB).
pub const DEFAULT_MAX_FRAME_LEN: u64 = 64 * 1024 * 1024;

const CONFIG_ENV: &str = "JUDGE_WIRE_CONFIG";

/// Result of comparing one file against its expected content.
///
/// Distinct from [`Verdict`](crate::outcome::Verdict), which classifies a whole test case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum DiffCode {
    Pass = 0,
    Fail = 1,
    Error = 2,
}

impl DiffCode {
    pub const fn code(self) -> u8 {
        self as u8
    }

    pub const fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Pass),
            1 => Some(Self::Fail),
            2 => Some(Self::Error),
            _ => None,
        }
    }
}

/// Connection settings shared by runner, validator and orchestrator.
#[derive(Debug, Clone, Deserialize)]
pub struct WireConfig {
    /// Peer host to connect to, or local address to bind.
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bounded wait around each frame read and write.
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Largest payload length a receiver will accept.
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: u64,
}

impl Default for WireConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: DEFAULT_PORT,
            timeout_seconds: DEFAULT_TIMEOUT_SECS,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".into()
}

const fn default_port() -> u16 {
    DEFAULT_PORT
}

const fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

const fn default_max_frame_len() -> u64 {
    DEFAULT_MAX_FRAME_LEN
}

impl WireConfig {
    /// Load from `JUDGE_WIRE_CONFIG`, falling back to defaults when unset.
    pub fn from_env() -> Result<Self> {
        match std::env::var(CONFIG_ENV) {
            Ok(json) => Self::from_json(&json).context("Failed to parse JUDGE_WIRE_CONFIG"),
            Err(_) => {
                debug!("JUDGE_WIRE_CONFIG not set, using defaults");
                Ok(Self::default())
            }
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).context("Failed to parse JSON")?;
        Ok(config)
    }

    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Find the single user home directory inside the chroot.
///
/// The runner image provisions exactly one user under `<chroot>/home`.
pub fn resolve_home_dir(chroot: &Path) -> Result<PathBuf> {
    let home = chroot.join("home");
    let entries = std::fs::read_dir(&home)
        .with_context(|| format!("Cannot read {}", home.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry
            .with_context(|| format!("Error reading {}", home.display()))?
            .path();
        if path.is_dir() {
            dirs.push(path);
        }
    }

    anyhow::ensure!(
        dirs.len() == 1,
        "Expected exactly one user directory in {}, found {}",
        home.display(),
        dirs.len()
    );

    let dir = dirs.remove(0);
    debug!(home = %dir.display(), "Resolved runner home directory");
    Ok(dir)
}

/// Paths of the expected console captures.
pub fn expected_console_paths() -> (PathBuf, PathBuf) {
    let dir = Path::new(EXPECTED_CONSOLE_DIR);
    (dir.join(STDOUT_FILE), dir.join(STDERR_FILE))
}
