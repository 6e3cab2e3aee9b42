// ABOUTME: Webhook notifications for deployment lifecycle events.
// ABOUTME: Delivery is best-effort; a failed webhook never fails a deployment.

use std::time::Duration;

use serde_json::json;

use crate::config::NotificationsConfig;

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle event reported to the webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeployStatus {
    Started,
    Success,
    Failed,
    RolledBack,
}

impl DeployStatus {
    fn as_str(self) -> &'static str {
        match self {
            DeployStatus::Started => "started",
            DeployStatus::Success => "success",
            DeployStatus::Failed => "failed",
            DeployStatus::RolledBack => "rolled_back",
        }
    }

    fn emoji(self) -> &'static str {
        match self {
            DeployStatus::Started => "\u{1F680}",
            DeployStatus::Success => "\u{2705}",
            DeployStatus::Failed => "\u{274C}",
            DeployStatus::RolledBack => "\u{23EA}",
        }
    }
}

/// Post a lifecycle event to the configured webhook, if any.
///
/// All failures are logged and swallowed.
pub async fn send(config: &NotificationsConfig, status: DeployStatus, detail: &str) {
    let Some(url) = config.webhook_url.as_deref() else {
        return;
    };

    let text = format!("{} Deployment {}: {}", status.emoji(), status.as_str(), detail);
    let payload = json!({
        "status": status.as_str(),
        "text": text,
        "blocks": [{
            "type": "section",
            "text": { "type": "mrkdwn", "text": text },
        }],
    });

    let client = match reqwest::Client::builder().timeout(WEBHOOK_TIMEOUT).build() {
        Ok(client) => client,
        Err(e) => {
            tracing::warn!("Failed to build notification client: {}", e);
            return;
        }
    };

    match client.post(url).json(&payload).send().await {
        Ok(response) if !response.status().is_success() => {
            tracing::warn!("Notification webhook returned {}", response.status());
        }
        Ok(_) => {
            tracing::debug!("Notification sent: {}", status.as_str());
        }
        Err(e) => {
            tracing::warn!("Failed to send notification: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_are_stable() {
        assert_eq!(DeployStatus::Started.as_str(), "started");
        assert_eq!(DeployStatus::Success.as_str(), "success");
        assert_eq!(DeployStatus::Failed.as_str(), "failed");
        assert_eq!(DeployStatus::RolledBack.as_str(), "rolled_back");
    }

    #[tokio::test]
    async fn missing_webhook_is_a_no_op() {
        let config = NotificationsConfig { webhook_url: None };
        send(&config, DeployStatus::Success, "release 20250101").await;
    }

    #[tokio::test]
    async fn unreachable_webhook_is_swallowed() {
        let config = NotificationsConfig {
            webhook_url: Some("http://127.0.0.1:1/hook".to_string()),
        };
        send(&config, DeployStatus::Failed, "release 20250101").await;
    }
}
