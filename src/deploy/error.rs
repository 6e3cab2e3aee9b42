// ABOUTME: Error taxonomy for deployment operations.
// ABOUTME: Stages raise these; the pipeline is the single place that catches them.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeployError {
    /// Bad configuration or unmet server requirements.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An active (or indeterminate) deployment lease exists.
    #[error("{0}")]
    Locked(String),

    /// A non-suppressed remote command exited non-zero, or the transport failed.
    #[error(transparent)]
    Exec(#[from] crate::exec::ExecError),

    /// Session establishment or authentication failure.
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("health check failed: {0}")]
    HealthCheck(String),

    /// No rollback target, or the target is unusable.
    #[error("rollback failed: {0}")]
    Rollback(String),

    #[error("database backup failed: {0}")]
    Backup(String),

    #[error("file sync failed: {0}")]
    FileSync(String),
}

pub type Result<T> = std::result::Result<T, DeployError>;
