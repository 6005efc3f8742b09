//! Port definition for the HTTP transport used by the fetcher.

use std::collections::HashMap;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::domain::errors::CacheError;

/// HTTP status for a successful conditional revalidation.
pub const STATUS_NOT_MODIFIED: u16 = 304;

/// Preconditions attached to a fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionalRequest {
    /// Last-known modification time of the cached copy.
    pub if_modified_since: Option<SystemTime>,
}

impl ConditionalRequest {
    /// A request without preconditions.
    #[must_use]
    pub const fn unconditional() -> Self {
        Self {
            if_modified_since: None,
        }
    }

    /// A request that the server may answer with `304 Not Modified`.
    #[must_use]
    pub const fn modified_since(time: SystemTime) -> Self {
        Self {
            if_modified_since: Some(time),
        }
    }

    /// Formats `if_modified_since` as an RFC 1123 HTTP date.
    #[must_use]
    pub fn if_modified_since_header(&self) -> Option<String> {
        self.if_modified_since.map(|time| {
            DateTime::<Utc>::from(time)
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string()
        })
    }
}

/// A fully buffered HTTP response.
#[derive(Debug, Clone, Default)]
pub struct TransportResponse {
    /// Status code.
    pub status: u16,
    /// Response headers, lower-cased names.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
}

impl TransportResponse {
    /// Creates a response with the given status and body.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: body.into(),
        }
    }

    /// Response for an unchanged resource.
    #[must_use]
    pub fn not_modified() -> Self {
        Self::new(STATUS_NOT_MODIFIED, Bytes::new())
    }

    /// Returns true for `304 Not Modified`.
    #[must_use]
    pub const fn is_not_modified(&self) -> bool {
        self.status == STATUS_NOT_MODIFIED
    }

    /// Returns true for any 2xx status.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }
}

/// Port for issuing HTTP GET requests.
/// Timeouts are the transport's responsibility.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Fetches `url`, honouring the given preconditions.
    async fn fetch(
        &self,
        url: &str,
        conditional: &ConditionalRequest,
    ) -> Result<TransportResponse, CacheError>;
}
