//! Delivery through an external WebSocket gateway
//!
//! The gateway owns the sockets; this transport posts each payload to the
//! gateway's per-connection callback URL, `{endpoint}/@connections/{id}`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};

use super::transport::{DeliveryError, DeliveryTransport};

/// Client for a gateway's connection callback API
#[derive(Debug, Clone)]
pub struct GatewayTransport {
    http_client: reqwest::Client,
    endpoint: Url,
}

impl GatewayTransport {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, GatewayError> {
        let endpoint = Url::parse(endpoint).map_err(|e| GatewayError::Endpoint(e.to_string()))?;
        if endpoint.cannot_be_a_base() {
            return Err(GatewayError::Endpoint(format!("{} cannot carry a path", endpoint)));
        }
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http_client,
            endpoint,
        })
    }

    /// Callback URL for one connection; the id is percent-encoded as a
    /// single path segment
    fn connection_url(&self, connection_id: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("@connections").push(connection_id);
        }
        url
    }
}

/// Gateway setup errors
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("Invalid gateway endpoint: {0}")]
    Endpoint(String),

    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

#[async_trait]
impl DeliveryTransport for GatewayTransport {
    async fn deliver(&self, connection_id: &str, payload: &str) -> Result<(), DeliveryError> {
        let response = self
            .http_client
            .post(self.connection_url(connection_id))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload.to_string())
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DeliveryError::Transient("gateway timeout".to_string())
                } else {
                    DeliveryError::Transient(e.to_string())
                }
            })?;

        classify_status(response.status())
    }
}

fn classify_status(status: StatusCode) -> Result<(), DeliveryError> {
    if status.is_success() {
        return Ok(());
    }
    match status {
        StatusCode::GONE | StatusCode::NOT_FOUND => Err(DeliveryError::Gone),
        other => Err(DeliveryError::Transient(format!("gateway returned {}", other))),
    }
}
