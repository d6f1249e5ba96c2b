//! Ledger configuration.

use std::path::PathBuf;

/// Directory name used under the user's home directory.
pub const DEFAULT_DIR_NAME: &str = ".near-payment-channel";

/// Configuration for the filesystem ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Directory holding one `<channel_id>.json` file per channel.
    pub root_dir: PathBuf,

    /// Whether to fsync each record before it replaces the previous one.
    pub sync_writes: bool,
}

impl LedgerConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the root directory.
    pub fn with_root_dir(mut self, root_dir: impl Into<PathBuf>) -> Self {
        self.root_dir = root_dir.into();
        self
    }

    /// Enable or disable fsync on every write.
    pub fn with_sync_writes(mut self, enable: bool) -> Self {
        self.sync_writes = enable;
        self
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            sync_writes: true,
        }
    }
}

/// `$HOME/.near-payment-channel`, or `./.near-payment-channel` when no home
/// directory is set.
pub fn default_root_dir() -> PathBuf {
    match std::env::var_os("HOME") {
        Some(home) if !home.is_empty() => PathBuf::from(home).join(DEFAULT_DIR_NAME),
        _ => PathBuf::from(".").join(DEFAULT_DIR_NAME),
    }
}
