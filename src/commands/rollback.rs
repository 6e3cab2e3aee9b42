// ABOUTME: Rollback command implementation.
// ABOUTME: Resolves the target release and swaps the current symlink back to it.

use caravel::config::Config;
use caravel::error::Result;
use caravel::exec::Executor;
use caravel::output::Output;

/// Roll back to a previous (or explicitly named) release.
pub async fn rollback(
    config: Config,
    release: Option<&str>,
    mut output: Output,
) -> Result<()> {
    output.start_timer();

    output.progress(&format!("Rolling back on {}", config.server.host));

    output.progress(&format!("  → Connecting to {}...", config.server.host));
    let session = super::connect(&config).await?;

    let result = {
        let exec = Executor::new(&session, config.server.timeout);
        caravel::deploy::roll_back(&exec, &config, release).await
    };

    if let Err(e) = session.disconnect().await {
        output.warning(&format!("SSH disconnect failed: {e}"));
    }

    let target = result?;
    output.success(&format!("Rolled back to release {}", target.name));
    Ok(())
}
