//! Notification dispatch.
//!
//! Rendered messages leave the process through a [`NotificationDispatcher`].
//! The webhook dispatcher posts them to an HTTP mail relay; the log
//! dispatcher only records them, for dry runs.

use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// A rendered message ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    /// Destination address.
    pub to: String,
    pub subject: String,
    pub body_html: String,
}

/// Errors raised while delivering a notification.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("cannot connect to notification relay at {0}")]
    Connect(String),

    #[error("notification relay error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to send notification: {0}")]
    Request(String),
}

impl DispatchError {
    /// Whether sending again could succeed.
    ///
    /// The relay rejecting the request itself (4xx other than 408 and 429)
    /// is final.
    pub fn is_retryable(&self) -> bool {
        match self {
            DispatchError::Status { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            _ => true,
        }
    }
}

/// Delivery contract for rendered notifications.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError>;
}

/// Configuration for [`WebhookDispatcher`].
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub url: String,
    pub from_address: String,
    pub timeout_seconds: u64,
}

/// Request body posted to the relay.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

/// Posts notifications as JSON to an HTTP mail relay.
pub struct WebhookDispatcher {
    config: WebhookConfig,
    http_client: reqwest::Client,
}

impl WebhookDispatcher {
    /// Create a dispatcher for the given relay.
    pub fn new(config: WebhookConfig) -> Result<Self, DispatchError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| DispatchError::Request(e.to_string()))?;

        info!("Notifications will be posted to {}", config.url);

        Ok(Self {
            config,
            http_client,
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        let payload = WebhookPayload {
            from: &self.config.from_address,
            to: &notification.to,
            subject: &notification.subject,
            html: &notification.body_html,
        };

        debug!("Posting notification '{}' to relay", notification.subject);

        let response = self
            .http_client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::Timeout(self.config.timeout_seconds)
                } else if e.is_connect() {
                    DispatchError::Connect(self.config.url.clone())
                } else {
                    DispatchError::Request(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Status { status, body });
        }

        Ok(())
    }
}

/// Logs notifications instead of sending them.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(&self, notification: &Notification) -> Result<(), DispatchError> {
        info!(
            "[dry-run] would send '{}' to {} ({} bytes)",
            notification.subject,
            notification.to,
            notification.body_html.len()
        );
        debug!("[dry-run] body:\n{}", notification.body_html);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_dispatcher_accepts_everything() {
        let notification = Notification {
            to: "a@example.edu".to_string(),
            subject: "Hi".to_string(),
            body_html: "<p>Hi</p>".to_string(),
        };
        tokio_test::assert_ok!(LogDispatcher.send(&notification).await);
    }

    #[tokio::test]
    async fn test_webhook_connect_failure() {
        // Nothing listens on port 9 (discard) on a test host
        let dispatcher = WebhookDispatcher::new(WebhookConfig {
            url: "http://127.0.0.1:9/send".to_string(),
            from_address: "noreply@example.edu".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();

        let notification = Notification {
            to: "a@example.edu".to_string(),
            subject: "Hi".to_string(),
            body_html: String::new(),
        };

        let result = dispatcher.send(&notification).await;
        assert!(result.is_err());
    }

    /// Serve one canned HTTP response on a local port.
    async fn serve_once(response: &'static str) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];

            // Read headers and body before answering
            loop {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                request.extend_from_slice(&buf[..n]);

                let text = String::from_utf8_lossy(&request).to_string();
                if let Some(end) = text.find("\r\n\r\n") {
                    let length = text[..end]
                        .lines()
                        .find_map(|line| {
                            let (name, value) = line.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if request.len() >= end + 4 + length {
                        break;
                    }
                }
            }

            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.unwrap();
        });

        format!("http://{}/send", addr)
    }

    fn dispatcher_for(url: String) -> WebhookDispatcher {
        WebhookDispatcher::new(WebhookConfig {
            url,
            from_address: "noreply@example.edu".to_string(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    fn sample() -> Notification {
        Notification {
            to: "a@example.edu".to_string(),
            subject: "Reminder".to_string(),
            body_html: "<p>Due soon</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn test_webhook_non_success_status() {
        let url = serve_once(
            "HTTP/1.1 422 Unprocessable Entity\r\ncontent-length: 10\r\nconnection: close\r\n\r\nbad sender",
        )
        .await;

        let result = dispatcher_for(url).send(&sample()).await;

        match result {
            Err(err @ DispatchError::Status { .. }) => {
                assert!(!err.is_retryable());
                if let DispatchError::Status { status, body } = err {
                    assert_eq!(status, 422);
                    assert_eq!(body, "bad sender");
                }
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_webhook_success() {
        let url = serve_once(
            "HTTP/1.1 202 Accepted\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        tokio_test::assert_ok!(dispatcher_for(url).send(&sample()).await);
    }

    #[test]
    fn test_retryable_errors() {
        let status = |status| DispatchError::Status {
            status,
            body: String::new(),
        };

        assert!(!status(400).is_retryable());
        assert!(!status(404).is_retryable());
        assert!(status(429).is_retryable());
        assert!(status(408).is_retryable());
        assert!(status(503).is_retryable());
        assert!(DispatchError::Timeout(5).is_retryable());
        assert!(DispatchError::Connect("http://relay".to_string()).is_retryable());
    }

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            from: "noreply@example.edu",
            to: "a@example.edu",
            subject: "Reminder",
            html: "<p/>",
        };
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["to"], "a@example.edu");
        assert_eq!(json["html"], "<p/>");
    }
}
