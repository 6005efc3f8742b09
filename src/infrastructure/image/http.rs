//! `reqwest` implementation of the HTTP transport port.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::trace;

use crate::domain::errors::{CacheError, CacheResult};
use crate::domain::ports::{ConditionalRequest, HttpTransport, TransportResponse};

/// HTTP transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given request timeout and user agent.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(timeout: Duration, user_agent: &str) -> CacheResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| CacheError::network(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(
        &self,
        url: &str,
        conditional: &ConditionalRequest,
    ) -> Result<TransportResponse, CacheError> {
        let mut request = self.client.get(url);
        if let Some(date) = conditional.if_modified_since_header() {
            trace!(url = %url, since = %date, "Conditional request");
            request = request.header(reqwest::header::IF_MODIFIED_SINCE, date);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CacheError::network(format!("Request failed: {e}")))?;

        let status = response.status();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = if status == reqwest::StatusCode::NOT_MODIFIED {
            Bytes::new()
        } else {
            response
                .bytes()
                .await
                .map_err(|e| CacheError::network(format!("Failed to read body: {e}")))?
        };

        Ok(TransportResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}
