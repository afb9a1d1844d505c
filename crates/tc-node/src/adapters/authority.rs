//! Timestamp authority reached over HTTP.

use crate::config::AuthorityConfig;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tc_hash_chain::{AuthorityReceipt, ChainError, ChainResult, TimestampAuthority};

#[derive(Debug, Serialize)]
struct SubmitRequest<'a> {
    hash: &'a str,
}

/// Fields we read from a success body, when it is JSON at all.
#[derive(Debug, Default, Deserialize)]
struct SubmitResponse {
    #[serde(default)]
    data: Option<SubmitResponseData>,
}

#[derive(Debug, Default, Deserialize)]
struct SubmitResponseData {
    #[serde(default)]
    hash_string: Option<String>,
}

/// POSTs `{"hash": "<digest hex>"}` with the API key in `Authorization`.
///
/// Any non-2xx status or transport failure is `UpstreamUnavailable`.
pub struct HttpTimestampAuthority {
    client: Client,
    config: AuthorityConfig,
}

impl HttpTimestampAuthority {
    pub fn new(config: AuthorityConfig, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout.min(Duration::from_secs(10)))
            .build()?;
        Ok(Self { client, config })
    }

    fn unavailable(&self, reason: impl Into<String>) -> ChainError {
        ChainError::UpstreamUnavailable {
            service: self.config.name.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TimestampAuthority for HttpTimestampAuthority {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn submit(&self, digest_hex: &str) -> ChainResult<AuthorityReceipt> {
        let response = self
            .client
            .post(&self.config.url)
            .header(AUTHORIZATION, &self.config.api_key)
            .header(ACCEPT, "application/json")
            .json(&SubmitRequest { hash: digest_hex })
            .send()
            .await
            .map_err(|e| self.unavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.unavailable(format!("received status code {}", status.as_u16())));
        }

        // The anchor is accepted at this point; an unreadable body only
        // loses the receipt id.
        let body: SubmitResponse = response.json().await.unwrap_or_default();
        Ok(AuthorityReceipt {
            receipt_id: body.data.and_then(|d| d.hash_string),
        })
    }
}
