//! Typed query description for the launch store.
//!
//! A [`FilterSpec`] is built either programmatically through the `with_*`
//! builders or from the plain key/value parameters an outer surface receives
//! ([`FilterSpec::from_params`]). Either way, limits are clamped, sort fields
//! are restricted to [`SortField`], and empty values mean "no constraint".

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::parse_timestamp;

/// Largest page a single query may return.
pub const MAX_LIMIT: u32 = 100;
/// Page size used when none is requested.
pub const DEFAULT_LIMIT: u32 = 20;

/// Raw inbound query parameters.
pub type FilterParams = HashMap<String, String>;

/// Columns a query may be ordered by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    Net,
    Name,
    Provider,
    Status,
    WindowStart,
    LastUpdated,
}

impl SortField {
    /// Store column backing this sort field.
    pub fn column(&self) -> &'static str {
        match self {
            SortField::Net => "net",
            SortField::Name => "name",
            SortField::Provider => "provider",
            SortField::Status => "status",
            SortField::WindowStart => "window_start",
            SortField::LastUpdated => "change_timestamp",
        }
    }

    /// Parses a sort field, falling back to the default for anything unknown.
    pub fn parse_or_default(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "net" => Ok(SortField::Net),
            "name" => Ok(SortField::Name),
            "provider" => Ok(SortField::Provider),
            "status" => Ok(SortField::Status),
            "window_start" => Ok(SortField::WindowStart),
            "last_updated" => Ok(SortField::LastUpdated),
            _ => Err(format!("Unsupported sort field '{}'", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }

    /// Parses a direction; anything other than `desc` is ascending.
    pub fn parse_or_default(s: &str) -> Self {
        if s.eq_ignore_ascii_case("desc") {
            SortDirection::Desc
        } else {
            SortDirection::Asc
        }
    }
}

impl fmt::Display for SortDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SortDirection::Asc => write!(f, "asc"),
            SortDirection::Desc => write!(f, "desc"),
        }
    }
}

/// Validated query over stored launches.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FilterSpec {
    pub(crate) net_from: Option<DateTime<Utc>>,
    pub(crate) net_to: Option<DateTime<Utc>>,

    pub(crate) name: Option<String>,
    pub(crate) provider: Option<String>,
    pub(crate) rocket: Option<String>,
    pub(crate) mission: Option<String>,
    pub(crate) pad: Option<String>,
    pub(crate) location: Option<String>,

    pub(crate) status: Option<String>,
    pub(crate) country: Option<String>,
    pub(crate) orbit: Option<String>,
    pub(crate) mission_type: Option<String>,
    pub(crate) provider_type: Option<String>,

    pub(crate) search: Option<String>,

    limit: u32,
    offset: u64,
    sort: SortField,
    direction: SortDirection,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            net_from: None,
            net_to: None,
            name: None,
            provider: None,
            rocket: None,
            mission: None,
            pad: None,
            location: None,
            status: None,
            country: None,
            orbit: None,
            mission_type: None,
            provider_type: None,
            search: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
            sort: SortField::default(),
            direction: SortDirection::default(),
        }
    }
}

/// Fields matched case-insensitively by substring.
pub(crate) const TEXT_COLUMNS: [&str; 6] =
    ["name", "provider", "rocket", "mission", "pad", "location"];
/// Fields the free-text search looks through.
pub(crate) const SEARCH_COLUMNS: [&str; 5] =
    ["name", "provider", "rocket", "mission", "location"];

impl FilterSpec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a filter from inbound key/value parameters.
    ///
    /// `now` anchors the `upcoming` shorthand. Unknown keys are ignored.
    pub fn from_params(params: &FilterParams, now: DateTime<Utc>) -> Result<Self, FilterError> {
        let get = |key: &str| {
            params
                .get(key)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let text = |key: &str| get(key).map(str::to_string);

        let mut spec = Self {
            net_from: get("net_from")
                .map(|v| parse_bound("net_from", v, Bound::Lower))
                .transpose()?,
            net_to: get("net_to")
                .map(|v| parse_bound("net_to", v, Bound::Upper))
                .transpose()?,
            name: text("name"),
            provider: text("provider"),
            rocket: text("rocket"),
            mission: text("mission"),
            pad: text("pad"),
            location: text("location"),
            status: text("status"),
            country: text("country"),
            orbit: text("orbit"),
            mission_type: text("mission_type"),
            provider_type: text("provider_type"),
            search: text("search"),
            ..Self::default()
        };

        if let Some(upcoming) = get("upcoming") {
            if parse_bool("upcoming", upcoming)? && spec.net_from.is_none() {
                spec.net_from = Some(now);
            }
        }
        if let Some(limit) = get("limit") {
            let limit: i64 = limit.parse().map_err(|_| FilterError::InvalidNumber {
                key: "limit".to_string(),
                value: limit.to_string(),
            })?;
            spec = spec.with_limit(limit);
        }
        if let Some(offset) = get("offset") {
            let offset: i64 = offset.parse().map_err(|_| FilterError::InvalidNumber {
                key: "offset".to_string(),
                value: offset.to_string(),
            })?;
            spec = spec.with_offset(offset);
        }
        if let Some(sort) = get("sort") {
            spec.sort = SortField::parse_or_default(sort);
        }
        if let Some(direction) = get("direction") {
            spec.direction = SortDirection::parse_or_default(direction);
        }

        Ok(spec)
    }

    pub fn with_net_from(mut self, from: DateTime<Utc>) -> Self {
        self.net_from = Some(from);
        self
    }

    pub fn with_net_to(mut self, to: DateTime<Utc>) -> Self {
        self.net_to = Some(to);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Sets the page size, clamped to `1..=MAX_LIMIT`.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.clamp(1, i64::from(MAX_LIMIT)) as u32;
        self
    }

    /// Sets the page offset; negative values become zero.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset.max(0) as u64;
        self
    }

    pub fn with_sort(mut self, sort: SortField, direction: SortDirection) -> Self {
        self.sort = sort;
        self.direction = direction;
        self
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn sort(&self) -> SortField {
        self.sort
    }

    pub fn direction(&self) -> SortDirection {
        self.direction
    }

    /// Active substring filters as `(column, value)` pairs.
    pub(crate) fn text_filters(&self) -> Vec<(&'static str, &str)> {
        let values = [
            &self.name,
            &self.provider,
            &self.rocket,
            &self.mission,
            &self.pad,
            &self.location,
        ];
        TEXT_COLUMNS
            .iter()
            .zip(values)
            .filter_map(|(column, value)| value.as_deref().map(|v| (*column, v)))
            .collect()
    }

    /// Active exact-match filters as `(column, value)` pairs.
    pub(crate) fn exact_filters(&self) -> Vec<(&'static str, &str)> {
        [
            ("status", &self.status),
            ("country", &self.country),
            ("orbit", &self.orbit),
            ("mission_type", &self.mission_type),
            ("provider_type", &self.provider_type),
        ]
        .into_iter()
        .filter_map(|(column, value)| value.as_deref().map(|v| (column, v)))
        .collect()
    }
}

enum Bound {
    Lower,
    Upper,
}

/// Accepts RFC 3339 or a bare date. A bare upper bound covers the whole day.
fn parse_bound(key: &str, value: &str, bound: Bound) -> Result<DateTime<Utc>, FilterError> {
    if let Some(ts) = parse_timestamp(value) {
        return Ok(ts);
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| FilterError::InvalidDate {
        key: key.to_string(),
        value: value.to_string(),
    })?;
    let time = match bound {
        Bound::Lower => NaiveTime::default(),
        Bound::Upper => NaiveTime::from_hms_micro_opt(23, 59, 59, 999_999).unwrap_or_default(),
    };
    Ok(date.and_time(time).and_utc())
}

fn parse_bool(key: &str, value: &str) -> Result<bool, FilterError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(FilterError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

/// A query parameter that could not be interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterError {
    InvalidNumber { key: String, value: String },
    InvalidDate { key: String, value: String },
    InvalidBool { key: String, value: String },
}

impl fmt::Display for FilterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterError::InvalidNumber { key, value } => {
                write!(f, "Invalid number for '{}': '{}'", key, value)
            }
            FilterError::InvalidDate { key, value } => write!(
                f,
                "Invalid date for '{}': '{}'. Use YYYY-MM-DD or RFC 3339.",
                key, value
            ),
            FilterError::InvalidBool { key, value } => {
                write!(f, "Invalid boolean for '{}': '{}'", key, value)
            }
        }
    }
}

impl std::error::Error for FilterError {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn params(pairs: &[(&str, &str)]) -> FilterParams {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_empty_params_use_defaults() {
        let spec = FilterSpec::from_params(&FilterParams::new(), now()).unwrap();
        assert_eq!(spec, FilterSpec::default());
        assert_eq!(spec.limit(), DEFAULT_LIMIT);
        assert_eq!(spec.sort(), SortField::Net);
        assert_eq!(spec.direction(), SortDirection::Asc);
        assert!(spec.text_filters().is_empty());
        assert!(spec.exact_filters().is_empty());
    }

    #[test]
    fn test_limit_and_offset_are_clamped() {
        let spec =
            FilterSpec::from_params(&params(&[("limit", "5000"), ("offset", "-3")]), now()).unwrap();
        assert_eq!(spec.limit(), MAX_LIMIT);
        assert_eq!(spec.offset(), 0);

        let spec = FilterSpec::from_params(&params(&[("limit", "0")]), now()).unwrap();
        assert_eq!(spec.limit(), 1);
    }

    #[test]
    fn test_non_numeric_limit_is_rejected() {
        let err = FilterSpec::from_params(&params(&[("limit", "ten")]), now()).unwrap_err();
        assert_eq!(
            err,
            FilterError::InvalidNumber {
                key: "limit".to_string(),
                value: "ten".to_string()
            }
        );
    }

    #[test]
    fn test_unknown_sort_falls_back() {
        let spec = FilterSpec::from_params(
            &params(&[("sort", "id; DROP TABLE launches"), ("direction", "sideways")]),
            now(),
        )
        .unwrap();
        assert_eq!(spec.sort(), SortField::Net);
        assert_eq!(spec.direction(), SortDirection::Asc);

        let spec =
            FilterSpec::from_params(&params(&[("sort", "Provider"), ("direction", "DESC")]), now())
                .unwrap();
        assert_eq!(spec.sort(), SortField::Provider);
        assert_eq!(spec.direction(), SortDirection::Desc);
    }

    #[test]
    fn test_bare_dates_cover_whole_days() {
        let spec = FilterSpec::from_params(
            &params(&[("net_from", "2024-07-01"), ("net_to", "2024-07-31")]),
            now(),
        )
        .unwrap();
        assert_eq!(
            spec.net_from,
            Some(Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap())
        );
        let to = spec.net_to.unwrap();
        assert!(to > Utc.with_ymd_and_hms(2024, 7, 31, 23, 59, 59).unwrap());
        assert!(to < Utc.with_ymd_and_hms(2024, 8, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_invalid_date_is_rejected() {
        let err = FilterSpec::from_params(&params(&[("net_to", "next tuesday")]), now()).unwrap_err();
        assert!(err.to_string().contains("net_to"));
    }

    #[test]
    fn test_upcoming_sets_lower_bound_to_now() {
        let spec = FilterSpec::from_params(&params(&[("upcoming", "true")]), now()).unwrap();
        assert_eq!(spec.net_from, Some(now()));

        let explicit = FilterSpec::from_params(
            &params(&[("upcoming", "yes"), ("net_from", "2030-01-01")]),
            now(),
        )
        .unwrap();
        assert_eq!(
            explicit.net_from,
            Some(Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap())
        );

        assert!(FilterSpec::from_params(&params(&[("upcoming", "maybe")]), now()).is_err());
    }

    #[test]
    fn test_blank_values_are_unset() {
        let spec = FilterSpec::from_params(
            &params(&[("provider", "  "), ("country", ""), ("name", "Starlink")]),
            now(),
        )
        .unwrap();
        assert_eq!(spec.text_filters(), vec![("name", "Starlink")]);
        assert!(spec.exact_filters().is_empty());
    }

    #[test]
    fn test_filters_map_to_columns() {
        let spec = FilterSpec::new()
            .with_provider("Acme")
            .with_location("Kourou")
            .with_country("FRA")
            .with_status("Go");
        assert_eq!(
            spec.text_filters(),
            vec![("provider", "Acme"), ("location", "Kourou")]
        );
        assert_eq!(spec.exact_filters(), vec![("status", "Go"), ("country", "FRA")]);
    }
}
