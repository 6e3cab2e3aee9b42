// ABOUTME: Append-only deployment journal at <root>/.meta/deployment.log.
// ABOUTME: ND-JSON events; appends are diagnostic and never abort a pipeline.

use chrono::{SecondsFormat, Utc};
use serde_json::json;

use crate::exec::Executor;
use crate::ssh::Connection;

use super::error::Result;
use super::release::Release;
use super::store;

/// Record a completed deployment.
pub async fn record_deployment<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    release: &Release,
) -> Result<()> {
    let entry = json!({
        "event": "deployment_success",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "release": release.name,
        "commit_hash": release.commit_hash,
        "branch": release.branch,
    });

    append(exec, root, &entry.to_string()).await?;

    tracing::info!("Deployment recorded");
    Ok(())
}

/// Record a rollback, noting the release that was abandoned when known.
pub async fn record_rollback<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    target: &Release,
    previous: Option<&Release>,
) -> Result<()> {
    let entry = json!({
        "event": "rollback",
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "target_release": target.name,
        "previous_release": previous.map(|r| r.name.as_str()),
    });

    append(exec, root, &entry.to_string()).await?;

    tracing::info!("Rollback recorded");
    Ok(())
}

async fn append<C: Connection + ?Sized>(
    exec: &Executor<'_, C>,
    root: &str,
    entry: &str,
) -> Result<()> {
    let log_file = format!("{}/deployment.log", store::meta_path(root));
    let escaped = entry.replace('\'', "'\\''");

    exec.run_unchecked(&format!("echo '{}' >> {}", escaped, log_file))
        .await?;
    Ok(())
}
