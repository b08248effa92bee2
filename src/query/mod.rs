//! Read side over the launch store.
//!
//! The engine never touches the sync path. It takes a validated
//! [`FilterSpec`], runs it against the store in one snapshot, and wraps the
//! page with the pagination block consumers expect.

pub mod compile;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::db::LaunchRepository;
use crate::models::{FilterError, FilterParams, FilterSpec, Launch};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub total: u64,
    pub limit: u32,
    pub offset: u64,
    #[serde(rename = "hasMore")]
    pub has_more: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub records: Vec<Launch>,
    pub pagination: Pagination,
}

/// Errors from running a query built from raw parameters.
#[derive(Debug)]
pub enum QueryError {
    InvalidFilter(FilterError),
    Store(sqlx::Error),
}

impl std::fmt::Display for QueryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryError::InvalidFilter(e) => write!(f, "{}", e),
            QueryError::Store(e) => write!(f, "Database error: {}", e),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::InvalidFilter(e) => Some(e),
            QueryError::Store(e) => Some(e),
        }
    }
}

impl From<FilterError> for QueryError {
    fn from(e: FilterError) -> Self {
        QueryError::InvalidFilter(e)
    }
}

impl From<sqlx::Error> for QueryError {
    fn from(e: sqlx::Error) -> Self {
        QueryError::Store(e)
    }
}

pub struct QueryEngine {
    repo: LaunchRepository,
}

impl QueryEngine {
    pub fn new(repo: LaunchRepository) -> Self {
        Self { repo }
    }

    /// Runs a validated filter.
    pub async fn search(&self, spec: &FilterSpec) -> Result<SearchResult, sqlx::Error> {
        let (records, total) = self.repo.query(spec).await?;
        let has_more = spec.offset() + (records.len() as u64) < total;

        Ok(SearchResult {
            pagination: Pagination {
                total,
                limit: spec.limit(),
                offset: spec.offset(),
                has_more,
            },
            records,
        })
    }

    /// Validates raw key/value parameters, then runs them.
    pub async fn search_params(
        &self,
        params: &FilterParams,
        now: DateTime<Utc>,
    ) -> Result<SearchResult, QueryError> {
        let spec = FilterSpec::from_params(params, now)?;
        Ok(self.search(&spec).await?)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Launch>, sqlx::Error> {
        self.repo.get_by_id(id).await
    }
}
