/*!
 * Configuration for the SMB virtual file adapter
 */

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{VfsError, VfsResult};
use crate::protocols::smb::DEFAULT_SMB_PORT;

/// Smallest I/O request issued by streams
pub const MIN_IO_CHUNK_SIZE: usize = 64 * 1024;

/// Largest I/O request issued by streams
pub const MAX_IO_CHUNK_SIZE: usize = 8 * 1024 * 1024;

/// Adapter configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmbVfsConfig {
    /// Port used when a name carries none
    #[serde(default = "default_port")]
    pub default_port: u16,

    /// Domain used when neither the authenticator nor the name supplies one
    #[serde(default)]
    pub default_domain: Option<String>,

    /// Size of individual read/write requests; see [`SmbVfsConfig::chunk_size`]
    #[serde(default = "default_io_chunk_size")]
    pub io_chunk_size: usize,

    /// Logging options
    #[serde(default)]
    pub log: LogConfig,
}

impl Default for SmbVfsConfig {
    fn default() -> Self {
        Self {
            default_port: default_port(),
            default_domain: None,
            io_chunk_size: default_io_chunk_size(),
            log: LogConfig::default(),
        }
    }
}

/// Logging options (`[log]` table)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,

    /// Log file path (None = stdout)
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Emit JSON lines instead of the compact text format
    #[serde(default)]
    pub json: bool,
}

/// Log level for diagnostic output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Only errors
    Error,

    /// Warnings and errors
    Warn,

    /// Info, warnings, and errors
    #[default]
    Info,

    /// Debug and above
    Debug,

    /// All messages including traces
    Trace,
}

impl LogLevel {
    /// Convert to tracing::Level
    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            LogLevel::Error => tracing::Level::ERROR,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Trace => tracing::Level::TRACE,
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_SMB_PORT
}

fn default_io_chunk_size() -> usize {
    1024 * 1024 // 1 MB
}

impl SmbVfsConfig {
    /// Parse configuration from TOML text
    pub fn from_toml_str(contents: &str) -> VfsResult<Self> {
        let config: SmbVfsConfig = toml::from_str(contents)
            .map_err(|e| VfsError::Config(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> VfsResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            VfsError::Config(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Save configuration to a TOML file
    pub fn to_file(&self, path: &Path) -> VfsResult<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| VfsError::Config(format!("Cannot serialize configuration: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    pub fn validate(&self) -> VfsResult<()> {
        if self.default_port == 0 {
            return Err(VfsError::Config("default_port cannot be 0".to_string()));
        }
        Ok(())
    }

    /// I/O chunk size clamped to the supported range
    pub fn chunk_size(&self) -> usize {
        self.io_chunk_size.clamp(MIN_IO_CHUNK_SIZE, MAX_IO_CHUNK_SIZE)
    }

    /// Configured default domain, empty when unset
    pub fn domain_fallback(&self) -> &str {
        self.default_domain.as_deref().unwrap_or("")
    }
}
