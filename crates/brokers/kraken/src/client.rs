use async_trait::async_trait;
use krakenwatch_core::*;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info};

use crate::config::{Credentials, ValidatedOptions};
use crate::{nonce, protocol, signer};

pub const OPEN_ORDERS_PATH: &str = "/0/private/OpenOrders";

/// Authenticated client for Kraken's private REST API.
///
/// One request per call, no retries or timeouts beyond the caller's own.
pub struct KrakenClient {
    http: reqwest::Client,
    base_url: Url,
    credentials: Credentials,
    debug: bool,
}

impl KrakenClient {
    pub fn new(base_url: Url, credentials: Credentials) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("krakenwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SourceError::Transport(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url,
            credentials,
            debug: false,
        })
    }

    pub fn from_options(options: ValidatedOptions) -> Result<Self, SourceError> {
        let debug = options.debug;
        Ok(Self::new(options.base_url, options.credentials)?.with_debug(debug))
    }

    /// Log raw response bodies and parsed payloads.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// POST a signed, form-encoded request to a private endpoint and return the JSON body.
    async fn post_private(&self, path: &str) -> Result<Value, SourceError> {
        let nonce = nonce::next_nonce()?;
        let body = format!("nonce={}", nonce);
        let signature = signer::sign(path, nonce, &body, &self.credentials.private_key)?;

        let url = self
            .base_url
            .join(path)
            .map_err(|e| SourceError::Transport(format!("Invalid endpoint {}: {}", path, e)))?;
        debug!(url = %url, nonce, "POST private endpoint");

        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header("Api-Key", &self.credentials.api_key)
            .header("Api-Sign", signature)
            .body(body)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = response.status();
        info!(status = status.as_u16(), path, "Request status");

        let text = response
            .text()
            .await
            .map_err(|e| SourceError::Transport(format!("Failed to read body: {}", e)))?;
        if self.debug {
            info!(body = %text, "Response body");
        }

        if !status.is_success() {
            return Err(SourceError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| SourceError::ResponseFormat(format!("Body is not JSON: {}", e)))?;
        if self.debug {
            info!(payload = %payload, "Payload");
        }
        Ok(payload)
    }
}

#[async_trait]
impl OrderSource for KrakenClient {
    async fn open_orders(&self) -> Result<OrderSet, SourceError> {
        let payload = self.post_private(OPEN_ORDERS_PATH).await?;
        protocol::parse_open_orders(payload)
    }
}
