pub(crate) mod config_gen;
mod create;
mod list;
mod prune;
mod restore;
mod sync;
mod verify;

use std::path::Path;

use stackup_core::commands::Collaborators;
use stackup_core::config::StackupConfig;
use stackup_core::error::Result;
use stackup_core::external::{PgDatabase, RedisCache, SystemdSupervisor};
use stackup_core::store::{FsRemote, RemoteStore};

use crate::cli::Commands;

/// Wire up the external-system adapters and run one command.
/// Returns the process exit code.
pub(crate) fn dispatch(command: &Commands, cfg: &StackupConfig) -> Result<i32> {
    let remote = open_remote(cfg)?;
    let database = PgDatabase::new(&cfg.database);
    let cache = RedisCache::new(&cfg.cache);
    let supervisor = SystemdSupervisor::new();
    let collab = Collaborators {
        database: &database,
        cache: &cache,
        supervisor: &supervisor,
        remote: remote.as_ref().map(|r| r as &dyn RemoteStore),
    };

    match command {
        Commands::Create {
            backup_type,
            compress,
            encrypt,
            remote,
        } => create::run(cfg, &collab, *backup_type, *compress, *encrypt, *remote),
        Commands::Restore {
            id,
            decrypt,
            target,
        } => restore::run(cfg, &collab, id, *decrypt, target.as_deref()),
        Commands::List => list::run(cfg, collab.remote),
        Commands::Verify { id } => verify::run(cfg, collab.remote, id),
        Commands::Prune { retention_days } => prune::run(cfg, collab.remote, *retention_days),
        Commands::Sync { id } => sync::run(cfg, collab.remote, id),
        // Handled before configuration is loaded.
        Commands::Config { .. } => unreachable!("config subcommand is handled in main"),
    }
}

fn open_remote(cfg: &StackupConfig) -> Result<Option<FsRemote>> {
    cfg.storage
        .remote_dir
        .as_deref()
        .map(|dir| FsRemote::open(Path::new(dir)))
        .transpose()
}
