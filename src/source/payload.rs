//! Shape of a launch as the remote API serves it.
//!
//! Only the fields the mirror keeps are declared. Every field is optional so
//! absence deserializes to `None`; a field with the wrong JSON type fails
//! deserialization for that one payload.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct RawLaunch {
    pub id: Option<String>,
    pub name: Option<String>,
    pub last_updated: Option<String>,
    pub net: Option<String>,
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub status: Option<RawStatus>,
    pub launch_service_provider: Option<RawProvider>,
    pub rocket: Option<RawRocket>,
    pub mission: Option<RawMission>,
    pub pad: Option<RawPad>,
    pub probability: Option<i64>,
    pub webcast_live: Option<bool>,
    pub image: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawStatus {
    pub name: Option<String>,
    pub abbrev: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawProvider {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRocket {
    pub configuration: Option<RawRocketConfiguration>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawRocketConfiguration {
    pub name: Option<String>,
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMission {
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub description: Option<String>,
    pub orbit: Option<RawOrbit>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawOrbit {
    pub name: Option<String>,
    pub abbrev: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawPad {
    pub name: Option<String>,
    pub location: Option<RawLocation>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawLocation {
    pub name: Option<String>,
    pub country_code: Option<String>,
}

/// Envelope of a paginated list response.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPage {
    pub count: u64,
    pub next: Option<String>,
    pub results: Vec<serde_json::Value>,
}
