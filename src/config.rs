use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Maximum events to keep in the audit log ring buffer
pub const MAX_EVENTS: usize = 200;

/// Maximum distinct filenames tracked per region
pub const MAX_REGION_FILES: usize = 20;

/// World extent (square, in map units)
pub const WORLD_SIZE: i64 = 1000;

/// Padding between a region's border and its content area
pub const MAP_PADDING: f64 = 8.0;

/// Space reserved at the top of a region for its label
pub const LABEL_HEIGHT: f64 = 16.0;

/// Default daemon port
pub const DEFAULT_PORT: u16 = 4175;

/// Application configuration loaded from file
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CliRtsConfig {
    /// HTTP daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Snapshot file location
    #[serde(default)]
    pub state: StateConfig,

    /// Sub-agent removal timing
    #[serde(default)]
    pub despawn: DespawnConfig,

    /// Hook emitter settings
    #[serde(default)]
    pub emit: EmitConfig,
}

/// Daemon-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Bind host
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Largest accepted POST /events body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_max_body_bytes() -> usize {
    1024 * 1024
}

/// Where snapshots are written, relative to the daemon's working directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: String,

    #[serde(default = "default_state_file")]
    pub file: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
            file: default_state_file(),
        }
    }
}

fn default_state_dir() -> String {
    ".cli-rts".to_string()
}

fn default_state_file() -> String {
    "game-state.json".to_string()
}

impl StateConfig {
    /// Full snapshot path under `root`
    pub fn snapshot_path(&self, root: &std::path::Path) -> PathBuf {
        root.join(&self.dir).join(&self.file)
    }
}

/// Despawn timing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DespawnConfig {
    /// Grace window before a stopped sub-agent is removed
    #[serde(default = "default_despawn_delay_ms")]
    pub delay_ms: u64,

    /// How often the daemon checks for due removals
    #[serde(default = "default_sweep_interval_ms")]
    pub sweep_interval_ms: u64,
}

impl Default for DespawnConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_despawn_delay_ms(),
            sweep_interval_ms: default_sweep_interval_ms(),
        }
    }
}

fn default_despawn_delay_ms() -> u64 {
    2000
}

fn default_sweep_interval_ms() -> u64 {
    250
}

/// Hook emitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmitConfig {
    /// Request timeout when posting to the daemon
    #[serde(default = "default_emit_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EmitConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_emit_timeout_ms(),
        }
    }
}

fn default_emit_timeout_ms() -> u64 {
    3000
}

impl CliRtsConfig {
    /// Load configuration from default path (~/.config/cli-rts/config.toml)
    pub fn load() -> Self {
        Self::load_from_path(Self::default_path())
    }

    /// Get the default configuration path
    pub fn default_path() -> PathBuf {
        directories::BaseDirs::new().map_or_else(
            || PathBuf::from("~/.config/cli-rts/config.toml"),
            |dirs| dirs.config_dir().join("cli-rts").join("config.toml"),
        )
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    tracing::info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to read config file: {}, using defaults", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_uses_defaults() {
        let tmp = TempDir::new().unwrap();
        let config = CliRtsConfig::load_from_path(tmp.path().join("nope.toml"));
        assert_eq!(config.daemon.port, DEFAULT_PORT);
        assert_eq!(config.daemon.host, "127.0.0.1");
        assert_eq!(config.despawn.delay_ms, 2000);
        assert_eq!(config.state.dir, ".cli-rts");
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[daemon]\nport = 5000\n\n[despawn]\ndelay_ms = 10\n").unwrap();

        let config = CliRtsConfig::load_from_path(path);
        assert_eq!(config.daemon.port, 5000);
        assert_eq!(config.daemon.max_body_bytes, 1024 * 1024);
        assert_eq!(config.despawn.delay_ms, 10);
        assert_eq!(config.despawn.sweep_interval_ms, 250);
        assert_eq!(config.emit.timeout_ms, 3000);
    }

    #[test]
    fn test_malformed_file_falls_back() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[daemon\nport = ").unwrap();

        let config = CliRtsConfig::load_from_path(path);
        assert_eq!(config.daemon.port, DEFAULT_PORT);
    }

    #[test]
    fn test_snapshot_path() {
        let state = StateConfig::default();
        assert_eq!(
            state.snapshot_path(std::path::Path::new("/repo")),
            PathBuf::from("/repo/.cli-rts/game-state.json")
        );
    }
}
