use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, AUTHORIZATION, RETRY_AFTER};
use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

use super::payload::RawPage;
use super::{FetchParams, Page, RemoteSource, SourceError};

/// Remote catalog reached over HTTP.
///
/// An API token, when configured, is sent as `Authorization: Token <key>`
/// and raises the daily request allowance.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: String,
    api_token: Option<String>,
}

impl HttpSource {
    /// Creates a source with a per-request timeout.
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("launchsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
        })
    }

    fn list_url(&self) -> String {
        format!("{}/launch/", self.base_url)
    }

    fn detail_url(&self, id: &str) -> String {
        format!("{}/launch/{}/", self.base_url, id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.header(AUTHORIZATION, format!("Token {}", token)),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, SourceError> {
        self.authorized(request)
            .send()
            .await
            .map_err(map_request_error)
    }
}

#[async_trait]
impl RemoteSource for HttpSource {
    async fn fetch_page(&self, params: &FetchParams) -> Result<Page, SourceError> {
        let request = self.client.get(self.list_url()).query(&query_pairs(params));
        let response = check_status(self.send(request).await?).await?;

        let page: RawPage = response.json().await.map_err(map_body_error)?;
        Ok(Page {
            count: page.count,
            has_more: page.next.is_some(),
            results: page.results,
        })
    }

    async fn fetch_by_id(&self, id: &str) -> Result<Option<serde_json::Value>, SourceError> {
        let response = self.send(self.client.get(self.detail_url(id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(response).await?;
        let value = response.json().await.map_err(map_body_error)?;
        Ok(Some(value))
    }
}

fn query_pairs(params: &FetchParams) -> Vec<(&'static str, String)> {
    let mut pairs = vec![
        ("limit", params.limit.to_string()),
        ("offset", params.offset.to_string()),
        ("ordering", params.ordering.to_string()),
    ];
    if let Some(since) = &params.changed_since {
        pairs.push(("last_updated__gte", api_timestamp(since)));
    }
    if let Some(from) = &params.net_from {
        pairs.push(("net__gte", api_timestamp(from)));
    }
    if let Some(to) = &params.net_to {
        pairs.push(("net__lte", api_timestamp(to)));
    }
    if let Some(search) = &params.search {
        pairs.push(("search", search.clone()));
    }
    pairs
}

fn api_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn map_request_error(e: reqwest::Error) -> SourceError {
    if e.is_timeout() {
        SourceError::Transient(format!("request timed out: {}", e))
    } else {
        SourceError::Transient(e.to_string())
    }
}

fn map_body_error(e: reqwest::Error) -> SourceError {
    if e.is_decode() {
        SourceError::Malformed(e.to_string())
    } else {
        map_request_error(e)
    }
}

async fn check_status(response: Response) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let header_hint = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        return Err(SourceError::Throttled {
            retry_after: header_hint.or_else(|| throttle_detail(&body)),
        });
    }

    if status.is_server_error() {
        return Err(SourceError::Transient(format!("server returned {}", status)));
    }

    let body = response.text().await.unwrap_or_default();
    let message: String = body.chars().take(200).collect();
    Err(SourceError::Rejected {
        status: status.as_u16(),
        message,
    })
}

/// Reads a `Retry-After` header given in seconds.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Reads the cool-down from a throttle body such as
/// `{"detail": "Request was throttled. Expected available in 1234 seconds."}`.
fn throttle_detail(body: &str) -> Option<Duration> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    let detail = value.get("detail")?.as_str()?;
    let rest = detail.split("available in ").nth(1)?;
    let seconds = rest.split_whitespace().next()?.parse::<u64>().ok()?;
    Some(Duration::from_secs(seconds))
}
