//! Publication reports delivered to a webhook.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tc_hash_chain::{ChainError, ChainResult, Notifier, PublicationReport};

#[derive(Debug, Serialize)]
struct WebhookMessage<'a> {
    to: Option<&'a str>,
    subject: String,
    text: String,
    report: &'a PublicationReport,
}

/// POSTs each report as JSON: subject, rendered text and the structured report.
pub struct WebhookNotifier {
    client: Client,
    url: String,
    to: Option<String>,
    short_digests: bool,
}

impl WebhookNotifier {
    pub fn new(
        url: impl Into<String>,
        to: Option<String>,
        short_digests: bool,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            url: url.into(),
            to,
            short_digests,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, report: &PublicationReport) -> ChainResult<()> {
        let message = WebhookMessage {
            to: self.to.as_deref(),
            subject: report.subject(),
            text: report.render(self.short_digests),
            report,
        };

        let unavailable = |reason: String| ChainError::UpstreamUnavailable {
            service: "notifier".to_string(),
            reason,
        };

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(|e| unavailable(e.to_string()))?;
        if !response.status().is_success() {
            return Err(unavailable(format!(
                "webhook returned {}",
                response.status().as_u16()
            )));
        }
        Ok(())
    }
}
