use stackup_core::commands::sync;
use stackup_core::config::StackupConfig;
use stackup_core::error::{Result, StackupError};
use stackup_core::store::RemoteStore;

pub(crate) fn run(
    cfg: &StackupConfig,
    remote: Option<&dyn RemoteStore>,
    id: &str,
) -> Result<i32> {
    let remote = remote.ok_or_else(|| {
        StackupError::Config("sync requires storage.remote_dir to be configured".into())
    })?;

    let outcome = sync::run(cfg, remote, id)?;
    if outcome.uploaded {
        println!("Uploaded {} ({}).", outcome.id, outcome.key);
    } else {
        println!("Already present on remote: {} ({}).", outcome.id, outcome.key);
    }
    Ok(0)
}
