// ABOUTME: Post-activation HTTP health probe.
// ABOUTME: A failing probe is a deployment failure and triggers rollback upstream.

use crate::config::HealthCheckConfig;
use crate::deploy::DeployError;

const USER_AGENT: &str = concat!("caravel/", env!("CARGO_PKG_VERSION"));

/// Probe the configured health endpoint.
///
/// Disabled checks and checks without a URL pass trivially. Any 2xx
/// response is healthy; everything else, including transport errors and
/// timeouts, fails the deployment.
pub async fn check(config: &HealthCheckConfig) -> Result<(), DeployError> {
    if !config.enabled {
        tracing::debug!("Health check disabled, skipping");
        return Ok(());
    }

    let Some(url) = config.url.as_deref() else {
        tracing::warn!("Health check enabled but no URL configured, skipping");
        return Ok(());
    };

    tracing::info!("Running health check against {}", url);

    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| DeployError::HealthCheck(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| DeployError::HealthCheck(format!("request failed: {}", e)))?;

    let status = response.status();
    if !status.is_success() {
        return Err(DeployError::HealthCheck(format!(
            "endpoint returned {}",
            status
        )));
    }

    tracing::info!("Health check passed ({})", status);
    Ok(())
}
