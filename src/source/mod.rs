//! Remote launch catalog.
//!
//! The source is the only component that talks to the network. It hands back
//! raw JSON payloads without interpreting them; mapping happens in
//! [`crate::sync::reconcile`].

mod http;
pub mod payload;

pub use http::HttpSource;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Largest page the remote API serves.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Parameters for one page request.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchParams {
    pub limit: u32,
    pub offset: u64,
    pub ordering: &'static str,
    pub changed_since: Option<DateTime<Utc>>,
    pub net_from: Option<DateTime<Utc>>,
    pub net_to: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl FetchParams {
    pub fn new(limit: u32, offset: u64, ordering: &'static str) -> Self {
        Self {
            limit: limit.clamp(1, MAX_PAGE_SIZE),
            offset,
            ordering,
            changed_since: None,
            net_from: None,
            net_to: None,
            search: None,
        }
    }

    pub fn with_changed_since(mut self, since: Option<DateTime<Utc>>) -> Self {
        self.changed_since = since;
        self
    }

    /// Narrows the request to launches whose NET falls in the window.
    ///
    /// Part of the remote filter contract. Sync runs leave the NET window
    /// and search unset so every page covers the whole catalog.
    pub fn with_net_window(
        mut self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Self {
        self.net_from = from;
        self.net_to = to;
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Parameters for the page after this one.
    pub fn next(&self) -> Self {
        Self {
            offset: self.offset + u64::from(self.limit),
            ..self.clone()
        }
    }
}

/// One page of raw payloads.
#[derive(Debug, Clone, Default)]
pub struct Page {
    /// Total matching records on the remote side.
    pub count: u64,
    pub has_more: bool,
    pub results: Vec<serde_json::Value>,
}

/// Failures talking to the remote catalog.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceError {
    /// Rate limited; the server may say how long to back off.
    Throttled { retry_after: Option<Duration> },
    /// Timeouts, connection failures and 5xx responses.
    Transient(String),
    /// The response did not have the expected envelope.
    Malformed(String),
    /// Any other non-success response.
    Rejected { status: u16, message: String },
}

impl SourceError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SourceError::Throttled { .. } | SourceError::Transient(_))
    }
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Throttled {
                retry_after: Some(d),
            } => write!(f, "Throttled by remote API (retry after {}s)", d.as_secs()),
            SourceError::Throttled { retry_after: None } => write!(f, "Throttled by remote API"),
            SourceError::Transient(e) => write!(f, "Transient source error: {}", e),
            SourceError::Malformed(e) => write!(f, "Malformed response: {}", e),
            SourceError::Rejected { status, message } => {
                write!(f, "Request rejected ({}): {}", status, message)
            }
        }
    }
}

impl std::error::Error for SourceError {}

#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Fetches one page of launches.
    async fn fetch_page(&self, params: &FetchParams) -> Result<Page, SourceError>;

    /// Fetches a single launch, or `None` if the remote has no such id.
    async fn fetch_by_id(&self, id: &str) -> Result<Option<serde_json::Value>, SourceError>;
}

#[async_trait]
impl<T: RemoteSource + ?Sized> RemoteSource for Arc<T> {
    async fn fetch_page(&self, params: &FetchParams) -> Result<Page, SourceError> {
        (**self).fetch_page(params).await
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<serde_json::Value>, SourceError> {
        (**self).fetch_by_id(id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_params_clamp_and_advance() {
        let params = FetchParams::new(500, 0, "id");
        assert_eq!(params.limit, MAX_PAGE_SIZE);

        let next = params.next().next();
        assert_eq!(next.offset, 200);
        assert_eq!(next.ordering, "id");

        let narrowed = FetchParams::new(10, 0, "net").with_search("Ariane");
        assert_eq!(narrowed.next().search.as_deref(), Some("Ariane"));
        assert_eq!(narrowed.next().net_from, None);
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SourceError::Throttled { retry_after: None }.is_retryable());
        assert!(SourceError::Transient("timeout".to_string()).is_retryable());
        assert!(!SourceError::Malformed("bad".to_string()).is_retryable());
        assert!(!SourceError::Rejected {
            status: 400,
            message: "bad request".to_string()
        }
        .is_retryable());
    }
}
