use stackup_core::commands::verify;
use stackup_core::config::StackupConfig;
use stackup_core::error::Result;
use stackup_core::store::RemoteStore;

use crate::passphrase;

pub(crate) fn run(
    cfg: &StackupConfig,
    remote: Option<&dyn RemoteStore>,
    id: &str,
) -> Result<i32> {
    let pass = passphrase::from_env();
    let report = verify::run(cfg, remote, pass.as_deref().map(|s| s.as_str()), id)?;

    println!(
        "Verify {}: {}",
        report.id,
        if report.all_ok() { "OK" } else { "FAILED" }
    );
    for check in &report.components {
        match &check.detail {
            None => println!("  {:<12} ok", check.component),
            Some(detail) => println!("  {:<12} {detail}", check.component),
        }
    }

    Ok(if report.all_ok() { 0 } else { 1 })
}
