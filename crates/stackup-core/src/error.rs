use thiserror::Error;

pub type Result<T> = std::result::Result<T, StackupError>;

#[derive(Debug, Error)]
pub enum StackupError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("component '{component}' failed: {message}")]
    ComponentProducerFailed { component: String, message: String },

    #[error("no component completed successfully; backup set not registered")]
    EmptyBackupSet,

    #[error("archive assembly failed: {0}")]
    ArchiveAssembly(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("decryption failed: wrong passphrase or corrupted data")]
    DecryptionFailed,

    #[error("integrity check failed for component '{component}'")]
    IntegrityCheckFailed { component: String },

    #[error("backup not found: '{0}'")]
    BackupNotFound(String),

    #[error("another backup or restore is in progress ({0})")]
    OperationInProgress(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("failed to quiesce service '{service}': {message}")]
    ServiceQuiesce { service: String, message: String },

    #[error("external command failed: {0}")]
    External(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}
