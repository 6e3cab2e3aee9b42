// ABOUTME: Advisory deployment lease stored at <root>/.deploy.lock.
// ABOUTME: Staleness-based takeover; release is best-effort and never raises.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::exec::Executor;
use crate::ssh::Connection;

use super::error::{DeployError, Result};

/// Lease file name under the deploy root.
pub const LOCK_FILE: &str = ".deploy.lock";

/// A lease older than this is eligible for unilateral takeover.
pub const DEFAULT_LEASE_TIMEOUT: Duration = Duration::from_secs(3600);

/// Record written into the lease file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockInfo {
    pub hostname: String,
    pub pid: u32,
    pub timestamp: DateTime<Utc>,
}

impl LockInfo {
    /// Lease record for the current process.
    pub fn new() -> Self {
        Self {
            hostname: gethostname::gethostname().to_string_lossy().into_owned(),
            pid: std::process::id(),
            timestamp: Utc::now(),
        }
    }
}

impl Default for LockInfo {
    fn default() -> Self {
        Self::new()
    }
}

pub fn lock_path(deploy_root: &str) -> String {
    format!("{}/{}", deploy_root.trim_end_matches('/'), LOCK_FILE)
}

/// Acquire the deployment lease for a deploy root.
///
/// Checks for an existing lease file first and only then writes a new one,
/// so two invocations racing inside that window can both proceed. The lock
/// is advisory; an atomic create-exclusive primitive would change which
/// racer wins, so the check-then-create sequence is kept.
///
/// A lease is stale only when its age strictly exceeds `lease_timeout`.
/// When the age cannot be determined the lock fails closed.
pub async fn acquire<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    deploy_root: &str,
    lease_timeout: Duration,
) -> Result<()> {
    acquire_at(exec, deploy_root, lease_timeout, Utc::now()).await
}

/// Acquire the deployment lease, judging staleness against an explicit
/// probe time instead of the wall clock.
pub async fn acquire_at<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    deploy_root: &str,
    lease_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    let lock_file = lock_path(deploy_root);

    if lock_exists(exec, &lock_file).await? {
        handle_existing_lock(exec, &lock_file, lease_timeout, now).await?;
    }

    create_lock(exec, &lock_file).await?;

    tracing::info!("Deployment lock acquired: {}", lock_file);
    Ok(())
}

/// Best-effort removal of the lease file.
///
/// Never raises: cleanup must not mask whatever failure preceded it.
/// Removing an already-absent lease is a no-op.
pub async fn release<C: Connection + ?Sized>(exec: &Executor<'_, C>, deploy_root: &str) {
    let lock_file = lock_path(deploy_root);

    match exec.run_unchecked(&format!("rm -f {}", lock_file)).await {
        Ok(result) if result.success() => {
            tracing::info!("Deployment lock released: {}", lock_file);
        }
        Ok(_) => {
            tracing::warn!("Failed to release deployment lock: {}", lock_file);
        }
        Err(e) => {
            tracing::warn!("Failed to release deployment lock {}: {}", lock_file, e);
        }
    }
}

async fn lock_exists<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    lock_file: &str,
) -> Result<bool> {
    let result = exec.run_unchecked(&format!("test -f {}", lock_file)).await?;
    Ok(result.success())
}

async fn handle_existing_lock<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    lock_file: &str,
    lease_timeout: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    // GNU stat first, BSD stat fallback
    let age_result = exec
        .run_unchecked(&format!(
            "stat -c %Y {lock} 2>/dev/null || stat -f %m {lock}",
            lock = lock_file
        ))
        .await?;

    if age_result.success()
        && let Ok(lock_time) = age_result.output.trim().parse::<i64>()
    {
        let age = now.timestamp() - lock_time;
        let timeout_secs = lease_timeout.as_secs() as i64;

        if age > timeout_secs {
            tracing::warn!("Removing stale deployment lock (age: {}s)", age);
            exec.run(&format!("rm -f {}", lock_file)).await?;
            return Ok(());
        }

        let remaining = timeout_secs - age;
        return Err(DeployError::Locked(format!(
            "Another deployment is in progress. Lock file: {} (age: {}s, timeout in {}s)",
            lock_file, age, remaining
        )));
    }

    // The age probe failed; assuming the lease is stale would risk running
    // two deployments at once, so fail closed.
    Err(DeployError::Locked(format!(
        "Another deployment is in progress. Lock file: {}",
        lock_file
    )))
}

async fn create_lock<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    lock_file: &str,
) -> Result<()> {
    let info = LockInfo::new();
    let json = serde_json::to_string(&info)
        .map_err(|e| DeployError::Validation(format!("failed to serialize lock info: {}", e)))?;
    let escaped = json.replace('\'', "'\\''");

    exec.run(&format!("echo '{}' > {}", escaped, lock_file))
        .await?;
    Ok(())
}
