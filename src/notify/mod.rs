//! Notification dispatch boundary. Delivery (push tokens, email fan-out)
//! lives in an external pipeline; this side only posts the payload and the
//! recipient list, best effort.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize)]
pub struct NotificationPayload {
    pub title: String,
    pub body: String,
    pub data: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("dispatch request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("dispatch rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        user_ids: &[String],
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}

pub struct HttpNotifier {
    http: reqwest::Client,
    dispatch_url: String,
}

impl HttpNotifier {
    pub fn new(dispatch_url: String) -> Self {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { http, dispatch_url }
    }
}

#[derive(Serialize)]
struct DispatchRequest<'a> {
    user_ids: &'a [String],
    title: &'a str,
    body: &'a str,
    data: &'a Value,
}

#[async_trait]
impl Notifier for HttpNotifier {
    async fn notify(
        &self,
        user_ids: &[String],
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError> {
        self.http
            .post(&self.dispatch_url)
            .json(&DispatchRequest {
                user_ids,
                title: &payload.title,
                body: &payload.body,
                data: &payload.data,
            })
            .send()
            .await?
            .error_for_status()?;

        tracing::debug!(recipients = user_ids.len(), "notification dispatched");
        Ok(())
    }
}
