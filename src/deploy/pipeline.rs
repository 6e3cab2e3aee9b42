// ABOUTME: Deployment orchestrator: requirement checks, lease, staged build,
// ABOUTME: cutover, verification, journal, pruning, and failure recovery.

use std::time::Duration;

use crate::config::{Config, HookStage};
use crate::exec::Executor;
use crate::health;
use crate::notify::{self, DeployStatus};
use crate::ssh::Connection;

use super::error::{DeployError, Result};
use super::lock::{self, DEFAULT_LEASE_TIMEOUT};
use super::record;
use super::release::Release;
use super::rollback;
use super::steps;
use super::store;

/// Pause after post-activation hooks so restarted workers settle before the
/// run is declared done.
const POST_ACTIVATION_SETTLE: Duration = Duration::from_secs(2);

/// Run a full deployment and return the activated release.
///
/// The lease is held for the entire staged run and always released
/// afterwards, success or not. Once a release directory exists, any stage
/// failure triggers an automatic rollback to the release preceding it;
/// failures before that point leave the deploy root untouched.
pub async fn deploy<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
) -> Result<Release> {
    steps::validate_server_requirements(exec, config).await?;

    let root = config.deploy_root();
    lock::acquire(exec, root, DEFAULT_LEASE_TIMEOUT).await?;

    let mut release: Option<Release> = None;
    let outcome = run_stages(exec, config, &mut release).await;

    let outcome = match outcome {
        Ok(release) => {
            notify::send(
                &config.notifications,
                DeployStatus::Success,
                &format!("release {} is live", release.name),
            )
            .await;
            Ok(release)
        }
        Err(e) => {
            tracing::error!("Deployment failed: {}", e);

            notify::send(
                &config.notifications,
                DeployStatus::Failed,
                &format!("{}", e),
            )
            .await;

            if let Some(failed) = &release {
                handle_failure(exec, config, failed).await;
            }

            Err(e)
        }
    };

    lock::release(exec, root).await;

    outcome
}

/// The staged deployment sequence.
///
/// `release` is written as soon as the directory exists so the failure
/// handler can see how far the run got.
async fn run_stages<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    release: &mut Option<Release>,
) -> Result<Release> {
    let root = config.deploy_root();

    let created = store::prepare(exec, root).await?;
    *release = Some(created.clone());

    notify::send(
        &config.notifications,
        DeployStatus::Started,
        &format!(
            "release {} (branch {}) to {}",
            created.name, config.repository.branch, config.server.host
        ),
    )
    .await;

    steps::clone_repository(exec, config, &created).await?;

    let checked_out = steps::checkout_branch(exec, config, created).await?;
    *release = Some(checked_out.clone());

    steps::sync_environment_file(exec, config, &checked_out).await?;
    steps::link_shared_storage(exec, config, &checked_out).await?;
    steps::link_custom_shared_paths(exec, config, &checked_out).await?;

    if config.options.install_dependencies {
        steps::install_dependencies(exec, &checked_out).await?;
    }

    if config.options.build_assets {
        steps::build_assets(exec, &checked_out).await?;
    }

    if config.database.backup_enabled {
        steps::backup_database(exec, config, &checked_out).await?;
    }

    if config.options.run_migrations {
        steps::run_migrations(exec, &checked_out).await?;
    }

    steps::run_hooks(exec, config, HookStage::BeforeActivate, &checked_out.path).await?;

    steps::validate_release(exec, config, &checked_out).await?;

    let current_link = store::current_link_path(root);
    store::activate(exec, &checked_out.path, &current_link).await?;

    health::check(&config.health_check).await?;

    steps::run_hooks(exec, config, HookStage::AfterActivate, &checked_out.path).await?;
    if !config.hooks.for_stage(HookStage::AfterActivate).is_empty() {
        tokio::time::sleep(POST_ACTIVATION_SETTLE).await;
    }

    if let Err(e) = record::record_deployment(exec, root, &checked_out).await {
        tracing::warn!("Failed to record deployment: {}", e);
    }

    store::prune_old(exec, root, config.options.keep_releases).await?;

    tracing::info!("Deployment completed: {}", checked_out.name);
    Ok(checked_out)
}

/// Prune incomplete release directories, then releases beyond the keep
/// count.
///
/// Incomplete releases go first so they never occupy a slot in the keep
/// window.
pub async fn clean_up<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
) -> Result<()> {
    let root = config.deploy_root();

    store::prune_incomplete(exec, root, config.options.install_dependencies).await?;
    store::prune_old(exec, root, config.options.keep_releases).await?;

    Ok(())
}

/// Recover from a failed run.
///
/// The scan skips past the failed release, so pre-cutover failures land
/// back on the release that never stopped serving. Any recovery error is
/// logged, never raised, so the original failure stays visible.
async fn handle_failure<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    failed: &Release,
) {
    let root = config.deploy_root();

    tracing::warn!("Rolling back after failed release {}", failed.name);

    let result = async {
        let target = rollback::identify_successor(exec, root, &failed.name).await?;
        rollback::validate_target(exec, &target).await?;
        rollback::execute(exec, config, &target).await?;
        record::record_rollback(exec, root, &target, Some(failed)).await?;
        Ok::<_, DeployError>(target)
    }
    .await;

    match result {
        Ok(target) => {
            tracing::info!("Rolled back to release {}", target.name);
            notify::send(
                &config.notifications,
                DeployStatus::RolledBack,
                &format!("automatic rollback to {}", target.name),
            )
            .await;
        }
        Err(e) => {
            tracing::error!("Automatic rollback failed: {}", e);
        }
    }
}

/// Roll back to a previous release under the deployment lease.
pub async fn roll_back<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    config: &Config,
    explicit_release: Option<&str>,
) -> Result<Release> {
    let root = config.deploy_root();

    lock::acquire(exec, root, DEFAULT_LEASE_TIMEOUT).await?;

    let outcome = async {
        let previous = store::current_release(exec, root)
            .await?
            .map(|name| Release::named(root, &name));

        let target = rollback::identify_target(exec, root, explicit_release).await?;
        rollback::validate_target(exec, &target).await?;
        rollback::execute(exec, config, &target).await?;

        if let Err(e) = record::record_rollback(exec, root, &target, previous.as_ref()).await {
            tracing::warn!("Failed to record rollback: {}", e);
        }

        Ok::<_, DeployError>(target)
    }
    .await;

    lock::release(exec, root).await;

    match outcome {
        Ok(target) => {
            notify::send(
                &config.notifications,
                DeployStatus::RolledBack,
                &format!("rolled back to {}", target.name),
            )
            .await;
            Ok(target)
        }
        Err(e) => Err(e),
    }
}
