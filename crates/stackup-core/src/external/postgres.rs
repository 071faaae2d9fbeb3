use std::process::Command;
use std::time::Duration;

use tracing::{info, warn};

use crate::config::DatabaseConfig;
use crate::error::{Result, StackupError};
use crate::external::{command_failed, DatabaseAdmin};
use crate::platform;

/// Generous ceiling for dump/replay of a production-sized database.
const DUMP_TIMEOUT: Duration = Duration::from_secs(3600);
const RESTORE_TIMEOUT: Duration = Duration::from_secs(3600);
const ADMIN_TIMEOUT: Duration = Duration::from_secs(120);

/// PostgreSQL collaborator via `pg_dump` / `psql`.
#[derive(Debug)]
pub struct PgDatabase {
    cfg: DatabaseConfig,
}

impl PgDatabase {
    pub fn new(cfg: &DatabaseConfig) -> Self {
        Self { cfg: cfg.clone() }
    }

    fn base_command(&self, bin: &str) -> Command {
        let mut cmd = Command::new(bin);
        cmd.arg("-h")
            .arg(&self.cfg.host)
            .arg("-p")
            .arg(self.cfg.port.to_string())
            .arg("-U")
            .arg(&self.cfg.user)
            .arg("--no-password");
        if let Some(password) = &self.cfg.password {
            cmd.env("PGPASSWORD", password);
        }
        cmd
    }
}

impl DatabaseAdmin for PgDatabase {
    fn dump(&self) -> Result<Vec<u8>> {
        info!(database = %self.cfg.name, "running pg_dump");
        let mut cmd = self.base_command("pg_dump");
        cmd.arg("--format=plain").arg(&self.cfg.name);

        let output = platform::run_command(&mut cmd, DUMP_TIMEOUT)
            .map_err(|e| StackupError::External(format!("pg_dump: {e}")))?;
        if !output.status.success() {
            return Err(command_failed("pg_dump", &output));
        }
        if output.stdout.is_empty() {
            warn!(database = %self.cfg.name, "pg_dump produced empty output");
        }
        Ok(output.stdout)
    }

    fn restore(&self, dump: &[u8]) -> Result<()> {
        // Drop and recreate so no objects from a newer schema survive.
        info!(database = %self.cfg.name, "dropping and recreating database");
        let admin_sql = format!(
            "DROP DATABASE IF EXISTS \"{0}\"; CREATE DATABASE \"{0}\";",
            self.cfg.name
        );
        let mut cmd = self.base_command("psql");
        cmd.arg("-d")
            .arg(&self.cfg.maintenance_db)
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-q")
            .arg("-c")
            .arg(&admin_sql);
        let output = platform::run_command(&mut cmd, ADMIN_TIMEOUT)
            .map_err(|e| StackupError::External(format!("psql (recreate): {e}")))?;
        if !output.status.success() {
            return Err(command_failed("psql (recreate database)", &output));
        }

        info!(database = %self.cfg.name, bytes = dump.len(), "replaying dump");
        let mut cmd = self.base_command("psql");
        cmd.arg("-d")
            .arg(&self.cfg.name)
            .arg("-v")
            .arg("ON_ERROR_STOP=1")
            .arg("-q")
            .arg("-f")
            .arg("-");
        let output = platform::run_command_with_stdin(&mut cmd, dump, RESTORE_TIMEOUT)
            .map_err(|e| StackupError::External(format!("psql (replay): {e}")))?;
        if !output.status.success() {
            return Err(command_failed("psql (replay dump)", &output));
        }
        Ok(())
    }

    fn version(&self) -> Result<String> {
        let mut cmd = self.base_command("psql");
        cmd.arg("-d")
            .arg(&self.cfg.maintenance_db)
            .arg("-tAc")
            .arg("SHOW server_version");
        let output = platform::run_command(&mut cmd, ADMIN_TIMEOUT)
            .map_err(|e| StackupError::External(format!("psql (version): {e}")))?;
        if !output.status.success() {
            return Err(command_failed("psql (version)", &output));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
