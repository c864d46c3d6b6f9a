//! Network capability used by the scraper.
//!
//! The core only needs "send a request, get JSON back"; tests swap in fakes.

use crate::error::TransportError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;

/// JSON-over-HTTP transport
#[async_trait]
pub trait Transport: Send + Sync {
    /// Issue a GET request and decode the body as JSON
    async fn get_json(&self, url: &str) -> Result<Value, TransportError>;

    /// Issue a POST request with a JSON body and decode the response as JSON
    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError>;
}

/// Transport backed by reqwest
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a new transport
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self { client })
    }

    async fn decode(url: &str, response: reqwest::Response) -> Result<Value, TransportError> {
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        // Read the body first so a dropped connection stays retryable and
        // only a bad payload counts as a decode failure
        let body = response.bytes().await.map_err(|e| request_error(url, e))?;

        serde_json::from_slice(&body).map_err(|e| TransportError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn get_json(&self, url: &str) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        Self::decode(url, response).await
    }

    async fn post_json(&self, url: &str, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| request_error(url, e))?;

        Self::decode(url, response).await
    }
}

fn request_error(url: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout {
            url: url.to_string(),
        }
    } else if let Some(status) = error.status() {
        TransportError::Status {
            url: url.to_string(),
            status: status.as_u16(),
        }
    } else {
        TransportError::Connection {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
