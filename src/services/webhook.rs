//! Webhook notifier.

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;

use super::Notifier;
use crate::error::{AppError, Result};
use crate::models::NotifyConfig;
use crate::utils::http::create_notify_client;

/// Longest response body quoted in a dispatch error.
const MAX_ERROR_BODY: usize = 200;

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    content: &'a str,
}

/// Posts each message as `{"content": ...}` JSON.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
}

impl WebhookNotifier {
    pub fn new(config: &NotifyConfig) -> Result<Self> {
        Ok(Self::with_client(create_notify_client(config)?))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn payload(text: &str) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&WebhookPayload { content: text })?)
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, destination: &str, text: &str) -> Result<()> {
        let response = self
            .client
            .post(destination)
            .header(CONTENT_TYPE, "application/json")
            .body(payload(text)?)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let body: String = body.chars().take(MAX_ERROR_BODY).collect();
        Err(AppError::dispatch(format!(
            "webhook returned {status}: {body}"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_escapes_message() {
        let body = payload("**New pages (1):**\n\"quoted\"").unwrap();
        assert_eq!(
            String::from_utf8(body).unwrap(),
            r#"{"content":"**New pages (1):**\n\"quoted\""}"#
        );
    }
}
