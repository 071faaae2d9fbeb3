use chrono::Utc;

use stackup_core::commands::prune;
use stackup_core::config::StackupConfig;
use stackup_core::error::Result;
use stackup_core::store::RemoteStore;

pub(crate) fn run(
    cfg: &StackupConfig,
    remote: Option<&dyn RemoteStore>,
    retention_days: Option<u32>,
) -> Result<i32> {
    let days = retention_days.unwrap_or(cfg.retention.days);
    let stats = prune::run(cfg, remote, days, Utc::now())?;

    println!(
        "Pruned {} local, {} remote (retention: {days} days)",
        stats.local_deleted.len(),
        stats.remote_deleted.len()
    );
    for id in &stats.local_deleted {
        println!("  deleted local   {id}");
    }
    for id in &stats.remote_deleted {
        println!("  deleted remote  {id}");
    }
    println!(
        "Kept {} local, {} remote.",
        stats.local_kept, stats.remote_kept
    );
    Ok(0)
}
