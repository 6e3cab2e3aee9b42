// ABOUTME: HTTP health check configuration for post-activation verification.
// ABOUTME: Disabled or URL-less checks pass trivially.

use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct HealthCheckConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default)]
    pub url: Option<String>,

    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            timeout: default_timeout(),
        }
    }
}
