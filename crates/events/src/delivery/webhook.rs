//! Fire-and-forget webhook delivery.
//!
//! [`WebhookDelivery`] POSTs a JSON-encoded [`PipelineEvent`] to an external
//! URL exactly once. [`WebhookNotifier`] adapts it to the [`Notifier`] seam:
//! every event is sent from its own background task and failures are only
//! logged (at-most-once, no retry).

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio_util::task::TaskTracker;

use crate::bus::PipelineEvent;
use crate::notifier::Notifier;

/// HTTP request timeout for one delivery.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    /// The underlying HTTP request failed (network, DNS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The remote server returned a non-2xx status code.
    #[error("Webhook returned HTTP {0}")]
    HttpStatus(u16),

    /// No tokio runtime to spawn deliveries on.
    #[error("No async runtime available for webhook delivery")]
    NoRuntime,
}

// ---------------------------------------------------------------------------
// WebhookDelivery
// ---------------------------------------------------------------------------

/// Sends pipeline events to a webhook endpoint.
pub struct WebhookDelivery {
    client: reqwest::Client,
}

impl WebhookDelivery {
    pub fn new() -> Result<Self, WebhookError> {
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self { client })
    }

    /// POST `event` to `url` once.
    pub async fn deliver(&self, url: &str, event: &PipelineEvent) -> Result<(), WebhookError> {
        let response = self.client.post(url).json(event).send().await?;
        if !response.status().is_success() {
            return Err(WebhookError::HttpStatus(response.status().as_u16()));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// WebhookNotifier
// ---------------------------------------------------------------------------

/// [`Notifier`] that delivers each event to a webhook in the background.
pub struct WebhookNotifier {
    delivery: Arc<WebhookDelivery>,
    url: Arc<str>,
    handle: Handle,
    tracker: TaskTracker,
}

impl WebhookNotifier {
    /// Deliver to `url`, spawning on `handle`.
    pub fn new(url: impl Into<String>, handle: Handle) -> Result<Self, WebhookError> {
        Ok(Self {
            delivery: Arc::new(WebhookDelivery::new()?),
            url: Arc::from(url.into()),
            handle,
            tracker: TaskTracker::new(),
        })
    }

    /// Deliver to `url` on the runtime of the calling context.
    pub fn from_current(url: impl Into<String>) -> Result<Self, WebhookError> {
        let handle = Handle::try_current().map_err(|_| WebhookError::NoRuntime)?;
        Self::new(url, handle)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Wait up to `timeout` for in-flight deliveries. Returns `true` when
    /// all of them finished.
    ///
    /// Short-lived processes call this before exiting so queued events are
    /// not dropped with the runtime.
    pub async fn flush(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let finished = tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok();
        self.tracker.reopen();
        if !finished {
            tracing::warn!(
                pending = self.tracker.len(),
                "Webhook deliveries still pending at flush"
            );
        }
        finished
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: PipelineEvent) {
        let delivery = Arc::clone(&self.delivery);
        let url = Arc::clone(&self.url);
        self.tracker.spawn_on(
            async move {
                match delivery.deliver(&url, &event).await {
                    Ok(()) => tracing::debug!(url = %url, kind = %event.kind, "Webhook delivered"),
                    Err(e) => tracing::warn!(
                        url = %url,
                        kind = %event.kind,
                        error = %e,
                        "Webhook delivery failed, event dropped"
                    ),
                }
            },
            &self.handle,
        );
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    use super::*;
    use crate::bus::EventKind;

    /// Accept one HTTP request, answer with `status`, and hand back its body.
    async fn one_shot_server(status: u16) -> (String, oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        let (tx, rx) = oneshot::channel();

        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(idx) = text.find("\r\n\r\n") {
                    let len = text[..idx]
                        .lines()
                        .find_map(|l| {
                            let (name, value) = l.split_once(':')?;
                            name.eq_ignore_ascii_case("content-length")
                                .then(|| value.trim().parse::<usize>().ok())
                                .flatten()
                        })
                        .unwrap_or(0);
                    if buf.len() >= idx + 4 + len {
                        break text[idx + 4..idx + 4 + len].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            let reply = format!(
                "HTTP/1.1 {status} X\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
            );
            socket.write_all(reply.as_bytes()).await.unwrap();
            let _ = tx.send(body);
        });

        (url, rx)
    }

    fn locked_event() -> PipelineEvent {
        PipelineEvent::new(EventKind::FileLocked)
            .with_file("/proj/a.blend")
            .with_user("alice")
    }

    #[tokio::test]
    async fn deliver_posts_event_json() {
        let (url, body) = one_shot_server(200).await;
        WebhookDelivery::new().unwrap().deliver(&url, &locked_event()).await.unwrap();

        let json: serde_json::Value = serde_json::from_str(&body.await.unwrap()).unwrap();
        assert_eq!(json["kind"], "file.locked");
        assert_eq!(json["user"], "alice");
    }

    #[tokio::test]
    async fn deliver_reports_http_status() {
        let (url, _body) = one_shot_server(502).await;
        let err = WebhookDelivery::new().unwrap().deliver(&url, &locked_event()).await.unwrap_err();
        assert!(matches!(err, WebhookError::HttpStatus(502)));
    }

    #[tokio::test]
    async fn notifier_delivers_in_background() {
        let (url, body) = one_shot_server(200).await;
        let notifier = WebhookNotifier::from_current(url).unwrap();
        notifier.notify(locked_event());

        assert!(notifier.flush(Duration::from_secs(5)).await);
        assert!(body.await.unwrap().contains("file.locked"));
    }

    #[tokio::test]
    async fn notifier_swallows_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/hook", listener.local_addr().unwrap());
        drop(listener);

        let notifier = WebhookNotifier::from_current(url).unwrap();
        notifier.notify(locked_event());
        assert!(notifier.flush(Duration::from_secs(15)).await);
    }

    #[test]
    fn from_current_without_runtime_fails() {
        assert!(matches!(
            WebhookNotifier::from_current("http://localhost/hook"),
            Err(WebhookError::NoRuntime)
        ));
    }

    #[test]
    fn webhook_error_display_http_status() {
        assert_eq!(WebhookError::HttpStatus(502).to_string(), "Webhook returned HTTP 502");
    }
}
