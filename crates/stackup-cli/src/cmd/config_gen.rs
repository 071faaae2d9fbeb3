use std::path::Path;

use stackup_core::error::{Result, StackupError};

const TEMPLATE: &str = r#"# stackup configuration
#
# Searched at ./stackup.yaml, then /etc/stackup/config.yaml; override with
# --config or STACKUP_CONFIG.

storage:
  # Local backup artifact directory (also holds the operation lock).
  local_dir: /var/backups/appstack
  # Optional remote mirror: a mounted share or synced bucket directory.
  # remote_dir: /mnt/backup-mirror

database:
  name: app
  user: postgres
  # password: secret          # or rely on .pgpass / peer auth
  host: 127.0.0.1
  port: 5432

cache:
  host: 127.0.0.1
  port: 6379
  rdb_path: /var/lib/redis/dump.rdb
  service: redis-server

application:
  paths: [/opt/app]

logs:
  paths: [/var/log/app]

config_files:
  paths: [/etc/app]

# Services quiesced while a restore replays the data layer.
services: [app-backend, app-worker]

compression:
  level: 5                    # zstd, 0-9

retention:
  days: 30
"#;

pub(crate) fn run(dest: Option<&str>) -> Result<()> {
    let dest = Path::new(dest.unwrap_or("stackup.yaml"));
    if dest.exists() {
        return Err(StackupError::Config(format!(
            "refusing to overwrite existing file: {}",
            dest.display()
        )));
    }
    std::fs::write(dest, TEMPLATE)?;
    println!("Wrote starter configuration to {}", dest.display());
    println!("Edit it, then run `stackup create --type full`.");
    Ok(())
}
