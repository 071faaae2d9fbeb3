use std::path::Path;

use stackup_core::commands::{restore, Collaborators};
use stackup_core::config::StackupConfig;
use stackup_core::error::Result;
use stackup_core::lock::OpLock;

use crate::passphrase;

pub(crate) fn run(
    cfg: &StackupConfig,
    collab: &Collaborators<'_>,
    id: &str,
    decrypt: bool,
    target: Option<&str>,
) -> Result<i32> {
    let pass = passphrase::get_existing_passphrase(decrypt)?;

    let lock = OpLock::acquire(cfg.local_root())?;
    let outcome = restore::run(
        cfg,
        collab,
        &lock,
        &restore::RestoreRequest {
            id,
            passphrase: pass.as_deref().map(|s| s.as_str()),
            target_root: target.map(Path::new),
        },
    )?;

    println!("Restore complete: {}", outcome.id);
    for component in &outcome.components {
        match &component.status {
            restore::ReplayStatus::Replayed => {
                println!("  {:<12} replayed", component.component)
            }
            restore::ReplayStatus::Failed(message) => {
                println!("  {:<12} failed: {message}", component.component)
            }
            restore::ReplayStatus::Skipped(reason) => {
                println!("  {:<12} skipped ({reason})", component.component)
            }
        }
    }
    for error in &outcome.resume_errors {
        println!("  Warning:     service resume failed: {error}");
    }

    Ok(if outcome.has_failures() { 1 } else { 0 })
}
