use stackup_core::commands::{create, Collaborators};
use stackup_core::config::StackupConfig;
use stackup_core::error::Result;
use stackup_core::lock::OpLock;

use crate::cli::TypeArg;
use crate::format::format_bytes;
use crate::passphrase;

pub(crate) fn run(
    cfg: &StackupConfig,
    collab: &Collaborators<'_>,
    backup_type: TypeArg,
    compress: Option<i32>,
    encrypt: bool,
    remote: bool,
) -> Result<i32> {
    // Gather the passphrase before taking the lock so a prompt never holds
    // other operations up.
    let pass = if encrypt {
        Some(passphrase::get_new_passphrase()?)
    } else {
        None
    };

    let lock = OpLock::acquire(cfg.local_root())?;
    let outcome = create::run(
        cfg,
        collab,
        &lock,
        pass.as_deref().map(|s| s.as_str()),
        &create::CreateRequest {
            backup_type: backup_type.into(),
            compression_level: compress,
            upload: remote,
        },
    )?;

    println!("Backup created: {}", outcome.id);
    let components = outcome
        .components
        .iter()
        .map(|c| format!("{} ({})", c.name, format_bytes(c.size_bytes)))
        .collect::<Vec<_>>()
        .join(", ");
    println!("  Components: {components}");
    for skipped in &outcome.skipped {
        println!("  Skipped:    {} ({})", skipped.component, skipped.message);
    }
    println!(
        "  Artifact:   {} ({}{})",
        outcome.key,
        format_bytes(outcome.artifact_size),
        if outcome.encrypted { ", encrypted" } else { "" }
    );
    let locations = outcome
        .locations
        .iter()
        .map(|l| l.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("  Locations:  {locations}");
    if let Some(e) = &outcome.encryption_error {
        println!("  Warning:    encryption failed, artifact stored in plaintext: {e}");
    }
    if let Some(e) = &outcome.upload_error {
        println!("  Warning:    upload failed, artifact retained locally: {e}");
    }

    Ok(if outcome.is_partial() { 1 } else { 0 })
}
