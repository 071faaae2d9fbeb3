use std::process::Command;
use std::time::Duration;

use tracing::info;

use crate::error::{Result, StackupError};
use crate::external::ServiceSupervisor;
use crate::platform;

const SERVICE_TIMEOUT: Duration = Duration::from_secs(90);

/// Service supervisor via `systemctl`.
#[derive(Debug, Default)]
pub struct SystemdSupervisor;

impl SystemdSupervisor {
    pub fn new() -> Self {
        Self
    }

    fn run_verb(&self, verb: &str, name: &str) -> Result<()> {
        let mut cmd = Command::new("systemctl");
        cmd.arg(verb).arg(name);
        let output = platform::run_command(&mut cmd, SERVICE_TIMEOUT).map_err(|e| {
            StackupError::ServiceQuiesce {
                service: name.to_string(),
                message: format!("systemctl {verb}: {e}"),
            }
        })?;
        if !output.status.success() {
            return Err(StackupError::ServiceQuiesce {
                service: name.to_string(),
                message: format!(
                    "systemctl {verb} failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

impl ServiceSupervisor for SystemdSupervisor {
    fn stop(&self, name: &str) -> Result<()> {
        info!(service = name, "stopping service");
        self.run_verb("stop", name)
    }

    fn start(&self, name: &str) -> Result<()> {
        info!(service = name, "starting service");
        self.run_verb("start", name)
    }

    fn is_running(&self, name: &str) -> Result<bool> {
        let mut cmd = Command::new("systemctl");
        cmd.arg("is-active").arg("--quiet").arg(name);
        let output = platform::run_command(&mut cmd, SERVICE_TIMEOUT).map_err(|e| {
            StackupError::ServiceQuiesce {
                service: name.to_string(),
                message: format!("systemctl is-active: {e}"),
            }
        })?;
        Ok(output.status.success())
    }
}
