// ABOUTME: Release store: directory layout, listing, pruning, and the atomic cutover.
// ABOUTME: The current symlink is only ever mutated through activate().

use crate::exec::Executor;
use crate::ssh::Connection;

use super::error::Result;
use super::release::Release;

/// Symlink under the deploy root whose target defines the live release.
pub const CURRENT_LINK: &str = "current";

/// Directory holding one subdirectory per release.
pub const RELEASES_DIR: &str = "releases";

/// Metadata directory for the deployment journal.
pub const META_DIR: &str = ".meta";

/// Installed-output marker whose absence marks an aborted build.
const DEPENDENCY_MARKER: &str = "vendor";

pub fn releases_path(root: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), RELEASES_DIR)
}

pub fn current_link_path(root: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), CURRENT_LINK)
}

pub fn meta_path(root: &str) -> String {
    format!("{}/{}", root.trim_end_matches('/'), META_DIR)
}

/// Allocate a new release and make sure the on-disk skeleton exists.
///
/// Idempotent with respect to the shared skeleton: everything is
/// create-if-missing.
pub async fn prepare<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
) -> Result<Release> {
    let release = Release::create(root);

    tracing::info!("Creating release directory: {}", release.path);

    exec.run(&format!("mkdir -p {}", release.path)).await?;

    let shared = format!("{}/shared", root.trim_end_matches('/'));
    exec.run(&format!("mkdir -p {}/storage/app", shared)).await?;
    exec.run(&format!("mkdir -p {}/storage/framework/cache", shared))
        .await?;
    exec.run(&format!("mkdir -p {}/storage/framework/sessions", shared))
        .await?;
    exec.run(&format!("mkdir -p {}/storage/framework/views", shared))
        .await?;
    exec.run(&format!("mkdir -p {}/storage/logs", shared)).await?;

    exec.run(&format!("mkdir -p {}", meta_path(root))).await?;

    tracing::info!("Release directory prepared: {}", release.name);

    Ok(release)
}

/// Atomically point a symlink at a new target.
///
/// Two link mutations, in order: create the link at a temporary path, then
/// rename it onto the final path. Directory-entry rename is atomic, so any
/// observer sees the old target or the new one, never a missing or partial
/// link. Used for the current link, the shared storage link, and every
/// custom shared-path link.
pub async fn activate<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    target: &str,
    link: &str,
) -> Result<()> {
    tracing::debug!("Creating symlink: {} -> {}", link, target);

    let temp_link = format!("{}.tmp", link);

    exec.run(&format!("ln -nfs {} {}", target, temp_link)).await?;
    exec.run(&format!("mv -Tf {} {}", temp_link, link)).await?;

    tracing::info!("Symlink created: {} -> {}", link, target);
    Ok(())
}

/// List release names newest-first.
///
/// A missing releases directory is tolerated and reads as empty.
pub async fn list<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
) -> Result<Vec<String>> {
    let result = exec
        .run_unchecked(&format!("ls -t {}", releases_path(root)))
        .await?;

    if result.failed() {
        return Ok(Vec::new());
    }

    Ok(result
        .output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

/// Name of the live release, derived from the current symlink target.
pub async fn current_release<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
) -> Result<Option<String>> {
    let result = exec
        .run_unchecked(&format!("readlink {}", current_link_path(root)))
        .await?;

    if result.failed() {
        return Ok(None);
    }

    let target = result.output.trim();
    if target.is_empty() {
        return Ok(None);
    }

    Ok(Some(basename(target).to_string()))
}

/// Remove all releases but the newest `keep`.
///
/// A failed listing means nothing to prune; a failed removal is logged and
/// the loop moves on to the remaining candidates.
pub async fn prune_old<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    keep: usize,
) -> Result<()> {
    let releases = releases_path(root);

    tracing::info!("Cleaning up old releases (keeping {})...", keep);

    let result = exec
        .run_unchecked(&format!("ls -t {} | tail -n +{}", releases, keep + 1))
        .await?;

    if result.failed() || result.output.trim().is_empty() {
        tracing::info!("No old releases to remove");
        return Ok(());
    }

    for name in result.output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        let path = format!("{}/{}", releases, name);
        tracing::info!("Removing old release: {}", name);

        let removal = exec.run_unchecked(&format!("rm -rf {}", path)).await?;
        if removal.failed() {
            tracing::warn!("Failed to remove old release {}: {}", name, removal.output);
        }
    }

    tracing::info!("Old releases cleaned up");
    Ok(())
}

/// Remove releases that never finished building.
///
/// Only applies when the pipeline installs dependencies: a release without
/// the installed-output marker directory is evidence of an aborted build.
/// The currently active release is always exempt, marker or not.
pub async fn prune_incomplete<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    uses_dependency_manager: bool,
) -> Result<()> {
    let releases = releases_path(root);

    tracing::info!("Pruning incomplete releases...");

    let current = current_release(exec, root).await?;

    let listing = exec.run_unchecked(&format!("ls {}", releases)).await?;
    if listing.failed() {
        return Ok(());
    }

    for name in listing.output.lines().map(str::trim).filter(|l| !l.is_empty()) {
        if Some(name) == current.as_deref() {
            continue;
        }

        if !uses_dependency_manager {
            continue;
        }

        let path = format!("{}/{}", releases, name);
        let marker = exec
            .run_unchecked(&format!("test -d {}/{}", path, DEPENDENCY_MARKER))
            .await?;

        if marker.failed() {
            tracing::info!("Removing incomplete release: {}", name);
            let removal = exec.run_unchecked(&format!("rm -rf {}", path)).await?;
            if removal.failed() {
                tracing::warn!("Failed to remove incomplete release {}", name);
            }
        }
    }

    tracing::info!("Incomplete releases pruned");
    Ok(())
}

fn basename(path: &str) -> &str {
    path.trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(path)
}
