use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One launch mirrored from the remote catalog.
///
/// Every attribute except `id` and `change_timestamp` is nullable; an update
/// replaces the whole row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Launch {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    pub net: Option<DateTime<Utc>>,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
    pub provider: Option<String>,
    pub provider_type: Option<String>,
    pub rocket: Option<String>,
    pub mission: Option<String>,
    pub mission_type: Option<String>,
    pub mission_description: Option<String>,
    pub orbit: Option<String>,
    pub pad: Option<String>,
    pub location: Option<String>,
    pub country: Option<String>,
    pub probability: Option<i64>,
    pub webcast_live: Option<bool>,
    pub image_url: Option<String>,
    /// Version marker supplied by the source (`last_updated`).
    pub change_timestamp: DateTime<Utc>,
}

impl Launch {
    /// Creates a launch with only the required fields set.
    pub fn new(id: impl Into<String>, change_timestamp: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            name: None,
            status: None,
            net: None,
            window_start: None,
            window_end: None,
            provider: None,
            provider_type: None,
            rocket: None,
            mission: None,
            mission_type: None,
            mission_description: None,
            orbit: None,
            pad: None,
            location: None,
            country: None,
            probability: None,
            webcast_live: None,
            image_url: None,
            change_timestamp,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_net(mut self, net: DateTime<Utc>) -> Self {
        self.net = Some(net);
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}

impl fmt::Display for Launch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = self.name.as_deref().unwrap_or("(unnamed launch)");
        writeln!(f, "{}", title)?;
        writeln!(f, "{}", "=".repeat(title.len()))?;
        writeln!(f, "ID:       {}", self.id)?;
        if let Some(net) = &self.net {
            writeln!(f, "NET:      {}", net.format("%Y-%m-%d %H:%M UTC"))?;
        }
        if let Some(status) = &self.status {
            writeln!(f, "Status:   {}", status)?;
        }
        if let Some(provider) = &self.provider {
            writeln!(f, "Provider: {}", provider)?;
        }
        if let Some(rocket) = &self.rocket {
            writeln!(f, "Rocket:   {}", rocket)?;
        }
        if let Some(mission) = &self.mission {
            writeln!(f, "Mission:  {}", mission)?;
        }
        match (&self.pad, &self.location) {
            (Some(pad), Some(location)) => writeln!(f, "Pad:      {}, {}", pad, location)?,
            (Some(pad), None) => writeln!(f, "Pad:      {}", pad)?,
            (None, Some(location)) => writeln!(f, "Location: {}", location)?,
            (None, None) => {}
        }
        if let Some(country) = &self.country {
            writeln!(f, "Country:  {}", country)?;
        }
        if let Some(description) = &self.mission_description {
            writeln!(f, "\n{}", description)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_launch_new_has_only_required_fields() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let launch = Launch::new("abc", ts);

        assert_eq!(launch.id, "abc");
        assert_eq!(launch.change_timestamp, ts);
        assert!(launch.name.is_none());
        assert!(launch.net.is_none());
    }

    #[test]
    fn test_launch_display() {
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        let launch = Launch::new("abc", ts)
            .with_name("Falcon 9 | Starlink 6-1")
            .with_net(Utc.with_ymd_and_hms(2024, 6, 2, 14, 30, 0).unwrap())
            .with_provider("SpaceX");

        let output = format!("{}", launch);
        assert!(output.contains("Falcon 9 | Starlink 6-1"));
        assert!(output.contains("2024-06-02 14:30 UTC"));
        assert!(output.contains("SpaceX"));
    }
}
