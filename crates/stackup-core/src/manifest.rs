use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, StackupError};
use crate::platform;

/// Current manifest schema version. New fields must be additive and carry
/// `#[serde(default)]` so older manifests keep parsing.
pub const SCHEMA_VERSION: u32 = 1;

/// File name of the manifest inside the archive root.
pub const MANIFEST_FILE: &str = "manifest.json";

const ID_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";

/// What a backup set covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    Full,
    Database,
    #[serde(rename = "cache")]
    CacheStore,
    Application,
    Logs,
    Config,
}

impl BackupType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackupType::Full => "full",
            BackupType::Database => "database",
            BackupType::CacheStore => "cache",
            BackupType::Application => "application",
            BackupType::Logs => "logs",
            BackupType::Config => "config",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "full" => Ok(BackupType::Full),
            "database" => Ok(BackupType::Database),
            "cache" => Ok(BackupType::CacheStore),
            "application" => Ok(BackupType::Application),
            "logs" => Ok(BackupType::Logs),
            "config" => Ok(BackupType::Config),
            other => Err(StackupError::InvalidFormat(format!(
                "unknown backup type: '{other}'"
            ))),
        }
    }

    /// Components implied by this backup type, in producer order.
    pub fn components(&self) -> &'static [Component] {
        match self {
            BackupType::Full => &[
                Component::Database,
                Component::CacheStore,
                Component::Application,
                Component::Logs,
                Component::Config,
            ],
            BackupType::Database => &[Component::Database],
            BackupType::CacheStore => &[Component::CacheStore],
            BackupType::Application => &[Component::Application],
            BackupType::Logs => &[Component::Logs],
            BackupType::Config => &[Component::Config],
        }
    }
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One subsystem contributing an artifact to a backup set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Component {
    Database,
    CacheStore,
    Application,
    Logs,
    Config,
}

impl Component {
    pub fn name(&self) -> &'static str {
        match self {
            Component::Database => "database",
            Component::CacheStore => "cache-store",
            Component::Application => "application",
            Component::Logs => "logs",
            Component::Config => "config",
        }
    }

    /// A failed critical component aborts set creation; the rest degrade to
    /// a warning.
    pub fn is_critical(&self) -> bool {
        matches!(self, Component::Database)
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A backup set identifier: `{type}_{YYYYMMDD}_{HHMMSS}` (UTC).
///
/// Assigned once at creation time, never mutated. The embedded timestamp is
/// the authoritative creation time for local retention decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupId {
    pub backup_type: BackupType,
    pub created_at: DateTime<Utc>,
}

impl BackupId {
    pub fn new(backup_type: BackupType, now: DateTime<Utc>) -> Self {
        // Truncate to whole seconds so Display/parse round-trips.
        let created_at = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);
        Self {
            backup_type,
            created_at,
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        let (type_str, time_str) = s.split_once('_').ok_or_else(|| {
            StackupError::InvalidFormat(format!("malformed backup id: '{s}'"))
        })?;
        let backup_type = BackupType::parse(type_str)?;
        let created_at = NaiveDateTime::parse_from_str(time_str, ID_TIME_FORMAT)
            .map_err(|e| StackupError::InvalidFormat(format!("malformed backup id '{s}': {e}")))?
            .and_utc();
        Ok(Self {
            backup_type,
            created_at,
        })
    }
}

impl fmt::Display for BackupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}",
            self.backup_type.as_str(),
            self.created_at.format(ID_TIME_FORMAT)
        )
    }
}

/// Per-component artifact record inside the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentArtifact {
    pub name: String,
    /// Location relative to the archive root.
    pub path: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the artifact bytes; for directory artifacts a
    /// hash-of-hashes over all contained files in stable sort order.
    pub checksum: String,
}

/// Descriptive facts about the host that produced a backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemFacts {
    pub hostname: String,
    pub os: String,
    pub kernel: String,
}

impl SystemFacts {
    pub fn collect() -> Self {
        Self {
            hostname: platform::hostname(),
            os: platform::os_description(),
            kernel: platform::kernel_version(),
        }
    }
}

/// Structured metadata describing one backup set, stored as
/// `manifest.json` inside the archive.
///
/// Dependent-system version strings are informational only and are never
/// enforced as a compatibility gate on restore.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub schema_version: u32,
    pub id: String,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub created_at: DateTime<Utc>,
    pub system: SystemFacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_version: Option<String>,
    pub components: Vec<ComponentArtifact>,
}

impl Manifest {
    pub fn find_component(&self, name: &str) -> Option<&ComponentArtifact> {
        self.components.iter().find(|c| c.name == name)
    }
}
