// ABOUTME: Rollback-target resolution, validation, and execution.
// ABOUTME: The target is the most recent release older than current, or an explicit name.

use crate::config::{Config, HookStage};
use crate::exec::Executor;
use crate::ssh::Connection;

use super::error::{DeployError, Result};
use super::release::Release;
use super::store;

/// Marker files any complete release carries; a target without one must not
/// be activated.
const ENTRYPOINT_MARKERS: [&str; 2] = ["index.php", "artisan"];

/// Determine the release to roll back to.
///
/// With an explicit name the release list is not consulted at all; the
/// caller may be asking for an arbitrary historical release. Otherwise the
/// newest-first listing is scanned past the current release and the next
/// entry wins.
pub async fn identify_target<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    explicit_name: Option<&str>,
) -> Result<Release> {
    if let Some(name) = explicit_name {
        return Ok(Release::named(root, name));
    }

    let current = store::current_release(exec, root)
        .await?
        .ok_or_else(|| DeployError::Rollback("No current release found".to_string()))?;

    tracing::info!("Current release: {}", current);

    identify_successor(exec, root, &current).await
}

/// Most recent release older than `name` in the newest-first listing.
///
/// Failure recovery scans past the failed release rather than the current
/// link, so it lands on whatever was live before the failed run regardless
/// of whether the cutover already happened.
pub async fn identify_successor<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    name: &str,
) -> Result<Release> {
    let releases = store::list(exec, root).await?;

    let mut found = false;
    for entry in &releases {
        if *entry == name {
            found = true;
            continue;
        }

        if found {
            tracing::info!("Rollback target identified: {}", entry);
            return Ok(Release::named(root, entry));
        }
    }

    Err(DeployError::Rollback(
        "No previous release found to rollback to".to_string(),
    ))
}

/// Refuse to activate a target that is missing or incomplete.
pub async fn validate_target<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    target: &Release,
) -> Result<()> {
    tracing::info!("Validating rollback target: {}", target.name);

    let dir_check = exec
        .run_unchecked(&format!("test -d {}", target.path))
        .await?;
    if dir_check.failed() {
        return Err(DeployError::Rollback(format!(
            "Target release not found: {}",
            target.name
        )));
    }

    let marker_check = ENTRYPOINT_MARKERS
        .iter()
        .map(|m| format!("test -f {}/{}", target.path, m))
        .collect::<Vec<_>>()
        .join(" || ");

    let entry_check = exec.run_unchecked(&marker_check).await?;
    if entry_check.failed() {
        return Err(DeployError::Rollback(format!(
            "Target release appears to be incomplete: {}",
            target.name
        )));
    }

    tracing::info!("Rollback target is valid");
    Ok(())
}

/// Cut traffic over to the target release and run after-rollback hooks.
pub async fn execute<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    target: &Release,
) -> Result<()> {
    let current_link = store::current_link_path(config.deploy_root());

    tracing::info!("Rolling back to release: {}", target.name);

    store::activate(exec, &target.path, &current_link).await?;

    for hook in config.hooks.for_stage(HookStage::AfterRollback) {
        exec.run_in_dir(&target.path, hook).await?;
    }

    tracing::info!("Rollback completed successfully");
    Ok(())
}
