//! HTTP vision-tagger client
//!
//! Posts an image URL to the configured tagging endpoint and decodes the
//! strict response contract. Every call is bounded twice: the reqwest client
//! carries a transport timeout, and the caller-facing method wraps the whole
//! exchange in `tokio::time::timeout` so a hung connection can never hang
//! the worker loop.

use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tagboard_common::tagger::{Tagger, TaggerResponse};
use tagboard_common::{Error, Result};
use tracing::debug;

pub struct HttpTagger {
    client: reqwest::Client,
    endpoint: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpTagger {
    /// Build a client. `endpoint = None` yields an unconfigured tagger that
    /// the worker's fail-closed gate will idle on.
    pub fn new(
        endpoint: Option<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Tagger(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint,
            api_key,
            timeout,
        })
    }

    async fn call(&self, endpoint: &str, image_url: &str) -> Result<TaggerResponse> {
        let mut request = self
            .client
            .post(endpoint)
            .json(&json!({ "image_url": image_url }));
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Tagger(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tagger(format!(
                "endpoint returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }

        // Strict decode at the boundary; anything off-contract is a job
        // failure, not a best-effort guess.
        let tagged: TaggerResponse = response
            .json()
            .await
            .map_err(|e| Error::Tagger(format!("malformed response: {e}")))?;

        debug!(
            "Tagger returned {} suggestions, caption {} chars",
            tagged.tags.len(),
            tagged.caption.len()
        );
        Ok(tagged.sanitized())
    }
}

#[async_trait]
impl Tagger for HttpTagger {
    async fn tag_image(&self, image_url: &str) -> Result<TaggerResponse> {
        let endpoint = self
            .endpoint
            .clone()
            .ok_or_else(|| Error::Tagger("tagger endpoint not configured".to_string()))?;

        match tokio::time::timeout(self.timeout, self.call(&endpoint, image_url)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Tagger(format!(
                "tagging call exceeded {}s timeout",
                self.timeout.as_secs()
            ))),
        }
    }

    fn is_configured(&self) -> bool {
        self.endpoint.is_some()
    }
}
