use clap::{Parser, Subcommand, ValueEnum};

use stackup_core::manifest::BackupType;

#[derive(Parser)]
#[command(
    name = "stackup",
    version,
    about = "Backup and restore for the application stack",
    after_help = "\
Configuration file lookup order:
  1. --config <path>             (explicit flag)
  2. $STACKUP_CONFIG             (environment variable)
  3. ./stackup.yaml              (working directory)
  4. /etc/stackup/config.yaml    (system)

Environment variables:
  STACKUP_CONFIG       Path to configuration file (overrides default search)
  STACKUP_PASSPHRASE   Encryption passphrase (skips interactive prompt)

Exit codes:
  0 success, 1 failure (including partial), 2 invalid arguments,
  3 another backup or restore is in progress"
)]
pub(crate) struct Cli {
    /// Path to configuration file (overrides STACKUP_CONFIG and default search)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Create a new backup set
    Create {
        /// What to back up
        #[arg(long = "type", value_enum)]
        backup_type: TypeArg,

        /// Compression level override (0-9)
        #[arg(long, value_parser = clap::value_parser!(i32).range(0..=9))]
        compress: Option<i32>,

        /// Wrap the archive in a passphrase-encrypted envelope
        #[arg(long)]
        encrypt: bool,

        /// Upload the finished artifact to remote storage
        #[arg(long)]
        remote: bool,
    },

    /// Restore a backup set into the running system
    Restore {
        /// Backup id, or "latest"
        id: String,

        /// Prompt for the passphrase of an encrypted artifact
        #[arg(long)]
        decrypt: bool,

        /// Replay file trees under this directory instead of /
        #[arg(long)]
        target: Option<String>,
    },

    /// List backup sets across local and remote storage
    List,

    /// Recompute a backup set's checksums against its manifest
    Verify {
        /// Backup id, or "latest"
        id: String,
    },

    /// Delete backup sets past the retention window
    Prune {
        /// Retention window override in days
        #[arg(long = "retention-days")]
        retention_days: Option<u32>,
    },

    /// Mirror a local artifact to remote storage if it is not already there
    Sync {
        /// Backup id, or "latest"
        id: String,
    },

    /// Generate a starter configuration file
    Config {
        /// Destination path (default: ./stackup.yaml)
        #[arg(short, long)]
        dest: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum TypeArg {
    Full,
    Database,
    Cache,
    Application,
    Logs,
    Config,
}

impl From<TypeArg> for BackupType {
    fn from(value: TypeArg) -> Self {
        match value {
            TypeArg::Full => BackupType::Full,
            TypeArg::Database => BackupType::Database,
            TypeArg::Cache => BackupType::CacheStore,
            TypeArg::Application => BackupType::Application,
            TypeArg::Logs => BackupType::Logs,
            TypeArg::Config => BackupType::Config,
        }
    }
}
