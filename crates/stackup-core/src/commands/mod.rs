pub mod create;
pub mod list;
pub mod prune;
pub mod restore;
pub mod sync;
pub mod util;
pub mod verify;

use crate::external::{CacheAdmin, DatabaseAdmin, ServiceSupervisor};
use crate::store::RemoteStore;

/// The external systems a command operates against, bundled so orchestrator
/// signatures stay flat. Production wiring uses the shell-out adapters;
/// tests substitute in-memory doubles.
pub struct Collaborators<'a> {
    pub database: &'a dyn DatabaseAdmin,
    pub cache: &'a dyn CacheAdmin,
    pub supervisor: &'a dyn ServiceSupervisor,
    pub remote: Option<&'a dyn RemoteStore>,
}
