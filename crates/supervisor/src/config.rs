//! Pipeline configuration.
//!
//! Loaded from a TOML file. On Unix the loader validates file
//! permissions before reading: config files can carry API keys, so
//! world-writable files are rejected outright and world-readable files
//! holding a key are rejected too.

use serde::{Deserialize, Serialize};
use tracing::warn;

use pentarch_llm::LlmConfig;

/// Top-level configuration for the supervisor and its collaborators.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Model configuration. When absent the pipeline runs in degraded
    /// mode: keyword triage, heuristic optimization, and the actions
    /// stage fails its runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub llm: Option<LlmConfig>,

    #[serde(default)]
    pub checkpoint: CheckpointConfig,

    #[serde(default)]
    pub events: EventsConfig,

    /// Timeout for a single tool dispatch, in milliseconds.
    #[serde(default = "default_tool_timeout_ms")]
    pub tool_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointConfig {
    /// Whether to snapshot run state at phase transitions.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Ceiling on a single checkpoint save, in milliseconds.
    #[serde(default = "default_save_timeout_ms")]
    pub save_timeout_ms: u64,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            save_timeout_ms: default_save_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Ceiling on a single event delivery, in milliseconds.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    /// Capacity of the broadcast channel events fan out on.
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            delivery_timeout_ms: default_delivery_timeout_ms(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_save_timeout_ms() -> u64 {
    2000
}

fn default_delivery_timeout_ms() -> u64 {
    2000
}

fn default_channel_capacity() -> usize {
    256
}

fn default_tool_timeout_ms() -> u64 {
    30000
}

impl PipelineConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix this validates that the file is a regular file, is not
    /// world-writable, and is not world-readable while holding an API
    /// key.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;

        if config.llm.as_ref().is_some_and(|l| l.api_key.is_some()) {
            warn!(
                "API key found in config file '{}'. For better security, \
                 use environment variables instead (OPENAI_API_KEY, ANTHROPIC_API_KEY).",
                path.display()
            );
        }

        Ok(config)
    }

    /// Load configuration from a TOML file without permission checks.
    ///
    /// Use this only for testing or when you've already validated the file.
    pub fn from_file_unchecked(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }
}

/// Validate config file permissions on Unix systems.
///
/// Requirements:
/// - File must be a regular file (not symlink, directory, etc.)
/// - File must not be world-writable (mode & 0o002 == 0)
/// - If file contains API key patterns, must not be world-readable
#[cfg(unix)]
fn validate_config_file_permissions(path: &std::path::Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;

    if !metadata.is_file() {
        anyhow::bail!(
            "Config path '{}' is not a regular file. Symlinks and directories are not allowed.",
            path.display()
        );
    }

    let mode = metadata.permissions().mode();
    let permission_bits = mode & 0o777;

    if permission_bits & 0o002 != 0 {
        anyhow::bail!(
            "Config file '{}' is world-writable (mode {:04o}). \
             This is a security risk. Fix with: chmod o-w {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    let content = std::fs::read_to_string(path).unwrap_or_default();
    let has_api_key =
        content.contains("api_key") && (content.contains("sk-") || content.contains("key ="));

    if has_api_key && permission_bits & 0o004 != 0 {
        anyhow::bail!(
            "Config file '{}' contains an API key but is world-readable (mode {:04o}). \
             This is a security risk. Fix with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    if has_api_key && permission_bits & 0o040 != 0 {
        warn!(
            "Config file '{}' contains an API key and is group-readable (mode {:04o}). \
             Consider restricting access with: chmod 600 {}",
            path.display(),
            permission_bits,
            path.display()
        );
    }

    Ok(())
}
