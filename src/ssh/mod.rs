// ABOUTME: SSH transport layer: session management and the Connection seam.
// ABOUTME: The deployment core only ever talks to the Connection trait.

mod client;
mod error;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};

use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

/// Transport boundary consumed by the deployment core.
///
/// A connection turns a command string into an exit code plus captured
/// output, and ferries files. Authentication and wire protocol are entirely
/// the implementor's concern. All calls block until the remote side
/// finishes; there is never more than one in-flight command per connection.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Run a command, waiting up to `timeout` for it to complete.
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput>;

    /// Upload a local file to the remote path.
    async fn upload(&self, local: &Path, remote: &str) -> Result<()>;

    /// Download a remote file to the local path.
    async fn download(&self, remote: &str, local: &Path) -> Result<()>;
}

#[async_trait]
impl Connection for Session {
    async fn run(&self, command: &str, timeout: Duration) -> Result<CommandOutput> {
        self.exec_with_timeout(command, timeout).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<()> {
        Session::upload(self, local, remote).await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<()> {
        Session::download(self, remote, local).await
    }
}
