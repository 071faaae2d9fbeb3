use stackup_core::commands::list;
use stackup_core::config::StackupConfig;
use stackup_core::error::Result;
use stackup_core::store::{LocalStore, RemoteStore};

use crate::format::format_bytes;

pub(crate) fn run(cfg: &StackupConfig, remote: Option<&dyn RemoteStore>) -> Result<i32> {
    let local = LocalStore::open(cfg.local_root())?;
    let entries = list::run(&local, remote)?;

    if entries.is_empty() {
        println!("No backups found.");
        return Ok(0);
    }

    println!(
        "{:<30} {:>10}  {:<20} {:<8} {}",
        "ID", "SIZE", "CREATED", "WHERE", "ENCRYPTED"
    );
    for entry in &entries {
        println!(
            "{:<30} {:>10}  {:<20} {:<8} {}",
            entry.id,
            format_bytes(entry.size_bytes),
            entry.created_at.format("%Y-%m-%d %H:%M:%S"),
            entry.location.to_string(),
            if entry.encrypted { "yes" } else { "no" }
        );
    }
    println!();
    println!("{} backup set(s).", entries.len());
    Ok(0)
}
