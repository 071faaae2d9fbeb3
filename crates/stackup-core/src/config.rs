use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StackupError};

/// Environment variable naming an explicit config file path.
pub const CONFIG_ENV: &str = "STACKUP_CONFIG";

/// Top-level configuration, loaded once at process start and threaded
/// explicitly; nothing reads it from ambient globals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackupConfig {
    pub storage: StorageConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub application: TreeConfig,
    #[serde(default)]
    pub logs: TreeConfig,
    #[serde(default)]
    pub config_files: TreeConfig,
    /// Services quiesced for the duration of a restore (the database and
    /// cache engines themselves are handled separately).
    #[serde(default)]
    pub services: Vec<String>,
    #[serde(default)]
    pub compression: CompressionConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding local backup artifacts and the operation lock.
    pub local_dir: String,
    /// Optional remote mirror (a mounted share or synced bucket directory).
    #[serde(default)]
    pub remote_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_name")]
    pub name: String,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    /// Database used for administrative statements while the target is
    /// dropped and recreated.
    #[serde(default = "default_maintenance_db")]
    pub maintenance_db: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            name: default_db_name(),
            user: default_db_user(),
            password: None,
            host: default_host(),
            port: default_db_port(),
            maintenance_db: default_maintenance_db(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_cache_port")]
    pub port: u16,
    /// Persistent snapshot file replaced during restore.
    #[serde(default = "default_rdb_path")]
    pub rdb_path: String,
    /// Service unit stopped while the snapshot file is swapped.
    #[serde(default = "default_cache_service")]
    pub service: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_cache_port(),
            rdb_path: default_rdb_path(),
            service: default_cache_service(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeConfig {
    #[serde(default)]
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompressionConfig {
    /// zstd level, 0–9 (0 selects the library default).
    #[serde(default = "default_compression_level")]
    pub level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            level: default_compression_level(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Maximum artifact age in days before pruning.
    #[serde(default = "default_retention_days")]
    pub days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            days: default_retention_days(),
        }
    }
}

fn default_db_name() -> String {
    "app".into()
}
fn default_db_user() -> String {
    "postgres".into()
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_db_port() -> u16 {
    5432
}
fn default_maintenance_db() -> String {
    "postgres".into()
}
fn default_cache_port() -> u16 {
    6379
}
fn default_rdb_path() -> String {
    "/var/lib/redis/dump.rdb".into()
}
fn default_cache_service() -> String {
    "redis-server".into()
}
fn default_compression_level() -> i32 {
    5
}
fn default_retention_days() -> u32 {
    30
}

impl StackupConfig {
    pub fn local_root(&self) -> &Path {
        Path::new(&self.storage.local_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.storage.local_dir.trim().is_empty() {
            return Err(StackupError::Config(
                "storage.local_dir must not be empty".into(),
            ));
        }
        if !(0..=9).contains(&self.compression.level) {
            return Err(StackupError::Config(format!(
                "compression.level must be 0-9 (got {})",
                self.compression.level
            )));
        }
        Ok(())
    }
}

/// Load and validate a configuration file.
pub fn load(path: &Path) -> Result<StackupConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| StackupError::Config(format!("read {}: {e}", path.display())))?;
    let config: StackupConfig = serde_yaml::from_str(&contents)
        .map_err(|e| StackupError::Config(format!("parse {}: {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

/// Resolve the config file path: explicit flag, then `STACKUP_CONFIG`, then
/// `./stackup.yaml`, then `/etc/stackup/config.yaml`.
pub fn resolve_config_path(flag: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = flag {
        return Some(PathBuf::from(path));
    }
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.is_empty() {
            return Some(PathBuf::from(path));
        }
    }
    for candidate in default_config_search_paths() {
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Search locations consulted when no explicit path is given.
pub fn default_config_search_paths() -> Vec<PathBuf> {
    vec![
        PathBuf::from("stackup.yaml"),
        PathBuf::from("/etc/stackup/config.yaml"),
    ]
}
