use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use tracing::info;

use crate::config::CacheConfig;
use crate::error::{Result, StackupError};
use crate::external::{command_failed, CacheAdmin};
use crate::platform;

/// SAVE is synchronous and can take a while on a large keyspace.
const SAVE_TIMEOUT: Duration = Duration::from_secs(600);
const INFO_TIMEOUT: Duration = Duration::from_secs(30);

/// Redis collaborator via `redis-cli` and the persistent RDB snapshot file.
#[derive(Debug)]
pub struct RedisCache {
    cfg: CacheConfig,
}

impl RedisCache {
    pub fn new(cfg: &CacheConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    fn cli(&self) -> Command {
        let mut cmd = Command::new("redis-cli");
        cmd.arg("-h")
            .arg(&self.cfg.host)
            .arg("-p")
            .arg(self.cfg.port.to_string());
        cmd
    }
}

impl CacheAdmin for RedisCache {
    fn snapshot(&self) -> Result<PathBuf> {
        info!(host = %self.cfg.host, port = self.cfg.port, "forcing cache snapshot (SAVE)");
        let mut cmd = self.cli();
        cmd.arg("SAVE");
        let output = platform::run_command(&mut cmd, SAVE_TIMEOUT)
            .map_err(|e| StackupError::External(format!("redis-cli SAVE: {e}")))?;
        if !output.status.success() {
            return Err(command_failed("redis-cli SAVE", &output));
        }
        let reply = String::from_utf8_lossy(&output.stdout);
        if reply.trim() != "OK" {
            return Err(StackupError::External(format!(
                "redis-cli SAVE replied: {}",
                reply.trim()
            )));
        }

        let path = PathBuf::from(&self.cfg.rdb_path);
        if !path.is_file() {
            return Err(StackupError::External(format!(
                "snapshot file missing after SAVE: {}",
                path.display()
            )));
        }
        Ok(path)
    }

    fn replace_snapshot(&self, src: &Path) -> Result<()> {
        info!(dest = %self.cfg.rdb_path, "replacing cache snapshot file");
        std::fs::copy(src, &self.cfg.rdb_path)?;
        Ok(())
    }

    fn version(&self) -> Result<String> {
        let mut cmd = self.cli();
        cmd.arg("INFO").arg("server");
        let output = platform::run_command(&mut cmd, INFO_TIMEOUT)
            .map_err(|e| StackupError::External(format!("redis-cli INFO: {e}")))?;
        if !output.status.success() {
            return Err(command_failed("redis-cli INFO", &output));
        }
        let info = String::from_utf8_lossy(&output.stdout);
        parse_redis_version(&info).ok_or_else(|| {
            StackupError::External("redis_version not present in INFO output".into())
        })
    }
}

fn parse_redis_version(info: &str) -> Option<String> {
    info.lines()
        .find_map(|line| line.strip_prefix("redis_version:"))
        .map(|v| v.trim().to_string())
}
