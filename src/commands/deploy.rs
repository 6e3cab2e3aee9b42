// ABOUTME: Deploy command implementation.
// ABOUTME: Opens the SSH session and drives the full deployment pipeline.

use caravel::config::Config;
use caravel::error::Result;
use caravel::exec::Executor;
use caravel::output::Output;

/// Deploy a new release to the configured server.
pub async fn deploy(config: Config, mut output: Output) -> Result<()> {
    output.start_timer();

    output.progress(&format!(
        "Deploying {} (branch {}) to {}",
        config.repository.url, config.repository.branch, config.server.host
    ));

    output.progress(&format!("  → Connecting to {}...", config.server.host));
    let session = super::connect(&config).await?;

    let result = {
        let exec = Executor::new(&session, config.server.timeout);
        caravel::deploy::deploy(&exec, &config).await
    };

    // Disconnect is non-fatal; the deployment outcome is what matters
    if let Err(e) = session.disconnect().await {
        output.warning(&format!("SSH disconnect failed: {e}"));
    }

    let release = result?;
    output.success(&format!("Release {} is live", release.name));
    Ok(())
}
