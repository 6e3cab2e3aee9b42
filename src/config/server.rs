// ABOUTME: Server block of the deployment configuration.
// ABOUTME: Converts to an SSH SessionConfig, expanding ~ in the key path.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::ssh::SessionConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub username: String,

    #[serde(default)]
    pub key_path: Option<String>,

    /// Per-command timeout on the remote session.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    #[serde(default = "default_trust_first_connection")]
    pub trust_first_connection: bool,
}

fn default_port() -> u16 {
    22
}

fn default_timeout() -> Duration {
    Duration::from_secs(300)
}

fn default_trust_first_connection() -> bool {
    true
}

impl ServerConfig {
    pub fn ssh_session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(&self.host, &self.username)
            .port(self.port)
            .trust_on_first_use(self.trust_first_connection)
            .command_timeout(self.timeout);

        if let Some(key_path) = &self.key_path {
            config = config.key_path(expand_home(key_path));
        }

        config
    }
}

/// Expand a leading `~/` against $HOME.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Ok(home) = std::env::var("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    PathBuf::from(path)
}
