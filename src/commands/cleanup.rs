// ABOUTME: Cleanup command implementation.
// ABOUTME: Prunes incomplete release directories plus old releases beyond the keep count.

use caravel::config::Config;
use caravel::error::Result;
use caravel::exec::Executor;
use caravel::output::Output;

/// Remove old and incomplete releases from the server.
pub async fn cleanup(config: Config, mut output: Output) -> Result<()> {
    output.start_timer();

    output.progress(&format!(
        "Cleaning up releases on {} (keeping {})",
        config.server.host, config.options.keep_releases
    ));

    output.progress(&format!("  → Connecting to {}...", config.server.host));
    let session = super::connect(&config).await?;

    let result = {
        let exec = Executor::new(&session, config.server.timeout);
        caravel::deploy::clean_up(&exec, &config).await
    };

    if let Err(e) = session.disconnect().await {
        output.warning(&format!("SSH disconnect failed: {e}"));
    }

    result?;
    output.success("Cleanup complete");
    Ok(())
}
