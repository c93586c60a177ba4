//! Best-effort notifications to workers

use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// A message for one recipient
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    /// Worker identity
    pub recipient: String,
    /// One-line subject
    pub subject: String,
    /// Message body
    pub body: String,
}

/// Notification transport
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Posts notifications as JSON to a webhook
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Url,
}

impl WebhookNotifier {
    /// Create a notifier posting to `url`
    ///
    /// `timeout` bounds the whole request, connect included.
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent("mq-refinery")
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Notify(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        debug!(recipient = %notification.recipient, url = %self.url, "sending notification");
        self.client
            .post(self.url.clone())
            .json(notification)
            .send()
            .await
            .map_err(|e| Error::Notify(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::Notify(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn notification() -> Notification {
        Notification {
            recipient: "nix".to_string(),
            subject: "Merge request rejected: worker/nix/gt-42".to_string(),
            body: "Reason: superseded".to_string(),
        }
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("content-type", "application/json")
            .match_body(mockito::Matcher::PartialJsonString(
                r#"{"recipient": "nix", "body": "Reason: superseded"}"#.to_string(),
            ))
            .with_status(204)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/hook", server.url())).unwrap();
        WebhookNotifier::new(url, TIMEOUT)
            .unwrap()
            .send(&notification())
            .await
            .unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_webhook_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/hook")
            .with_status(500)
            .create_async()
            .await;

        let url = Url::parse(&format!("{}/hook", server.url())).unwrap();
        let err = WebhookNotifier::new(url, TIMEOUT)
            .unwrap()
            .send(&notification())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "notify");
    }

    #[tokio::test]
    async fn test_stalled_webhook_times_out() {
        // accepts connections but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let url = Url::parse(&format!("http://{}/hook", listener.local_addr().unwrap())).unwrap();

        let started = std::time::Instant::now();
        let err = WebhookNotifier::new(url, Duration::from_millis(200))
            .unwrap()
            .send(&notification())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), "notify");
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }
}
