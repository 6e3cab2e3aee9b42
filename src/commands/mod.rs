// ABOUTME: Command module aggregator for the caravel CLI.
// ABOUTME: Re-exports the deploy, rollback, releases, cleanup, and init handlers.

mod cleanup;
mod deploy;
mod init;
mod releases;
mod rollback;

pub use cleanup::cleanup;
pub use deploy::deploy;
pub use init::init;
pub use releases::releases;
pub use rollback::rollback;

use caravel::config::Config;
use caravel::deploy::DeployError;
use caravel::error::Result;
use caravel::ssh::Session;

/// Establish the SSH session for a command.
pub(crate) async fn connect(config: &Config) -> Result<Session> {
    let session = Session::connect_with_retry(config.server.ssh_session_config())
        .await
        .map_err(|e| DeployError::Connection(e.to_string()))?;
    Ok(session)
}
