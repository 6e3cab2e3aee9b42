// ABOUTME: Releases command implementation.
// ABOUTME: Lists releases on the server, newest first, marking the live one.

use caravel::config::Config;
use caravel::deploy::store;
use caravel::error::Result;
use caravel::exec::Executor;
use caravel::output::Output;

/// List the releases present under the deploy root.
pub async fn releases(config: Config, output: Output) -> Result<()> {
    output.progress(&format!("  → Connecting to {}...", config.server.host));
    let session = super::connect(&config).await?;

    let result = {
        let exec = Executor::new(&session, config.server.timeout);
        let root = config.deploy_root();

        let current = store::current_release(&exec, root).await?;
        let names = store::list(&exec, root).await?;
        Ok::<_, caravel::deploy::DeployError>((current, names))
    };

    if let Err(e) = session.disconnect().await {
        output.warning(&format!("SSH disconnect failed: {e}"));
    }

    let (current, names) = result?;

    if names.is_empty() {
        output.success("No releases found");
        return Ok(());
    }

    for name in &names {
        if Some(name.as_str()) == current.as_deref() {
            println!("* {name} (current)");
        } else {
            println!("  {name}");
        }
    }

    Ok(())
}
