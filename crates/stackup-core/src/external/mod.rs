pub mod postgres;
pub mod redis;
pub mod systemd;

use std::path::{Path, PathBuf};
use std::process::Output;

pub use postgres::PgDatabase;
pub use redis::RedisCache;
pub use systemd::SystemdSupervisor;

use crate::error::{Result, StackupError};

/// The relational database collaborator.
///
/// The bundled implementation shells out to the PostgreSQL client tools;
/// the core depends only on this interface so in-process clients or test
/// doubles substitute freely.
pub trait DatabaseAdmin {
    /// Produce a logical dump of the target database.
    fn dump(&self) -> Result<Vec<u8>>;

    /// Drop and recreate the target database, then replay `dump`.
    /// Destructive: no objects from a newer schema survive the restore.
    fn restore(&self, dump: &[u8]) -> Result<()>;

    /// Engine version string, captured for the manifest.
    fn version(&self) -> Result<String>;
}

/// The key-value cache collaborator.
pub trait CacheAdmin {
    /// Force a persistent snapshot and return its on-disk location.
    fn snapshot(&self) -> Result<PathBuf>;

    /// Replace the persistent snapshot file. The engine must be stopped by
    /// the caller for the duration of the swap.
    fn replace_snapshot(&self, src: &Path) -> Result<()>;

    fn version(&self) -> Result<String>;
}

/// The service supervisor collaborator, used only to quiesce and resume
/// services around a restore.
pub trait ServiceSupervisor {
    fn stop(&self, name: &str) -> Result<()>;
    fn start(&self, name: &str) -> Result<()>;
    fn is_running(&self, name: &str) -> Result<bool>;
}

/// Build an error for a failed external command, carrying the exit code and
/// whatever the tool wrote to stderr.
pub(crate) fn command_failed(label: &str, output: &Output) -> StackupError {
    let code = output
        .status
        .code()
        .map(|c| c.to_string())
        .unwrap_or_else(|| "signal".to_string());
    let stderr = String::from_utf8_lossy(&output.stderr);
    StackupError::External(format!(
        "{label} (exit code {code}): {}",
        stderr.trim()
    ))
}
