//! Tracked subject and its in-memory track.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LivetrackError;
use crate::point::Point;

/// Tracker source a pilot reports through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TrackerKind {
    Spot,
    Garmin,
    /// A source with no registered normalizer; kept so the roster still loads.
    Other(String),
}

impl TrackerKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Spot => "spot",
            Self::Garmin => "garmin",
            Self::Other(s) => s,
        }
    }
}

impl FromStr for TrackerKind {
    type Err = LivetrackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(LivetrackError::UnknownTracker(s.to_string()));
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "spot" => Self::Spot,
            "garmin" => Self::Garmin,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for TrackerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TrackerKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TrackerKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pilot {
    /// Tracker feed identifier.
    pub id: String,
    pub name: String,
    /// Home location, used as destination for itinerary lookups.
    pub home: String,
    pub orgs: Vec<String>,
    pub tracker_type: TrackerKind,
    /// Points merged during the current day.
    #[serde(default)]
    pub points: Vec<Point>,
}

impl Pilot {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        home: impl Into<String>,
        tracker_type: TrackerKind,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            home: home.into(),
            orgs: Vec::new(),
            tracker_type,
            points: Vec::new(),
        }
    }

    pub fn last_point(&self) -> Option<&Point> {
        self.points.last()
    }

    /// Sum of every leg of the track, in km.
    pub fn cumulative_distance(&self) -> f64 {
        self.points
            .windows(2)
            .map(|w| w[0].distance_to(&w[1]))
            .sum()
    }

    /// Seconds between the first and last point.
    pub fn flight_time(&self) -> i64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => (last.date_time - first.date_time).num_seconds(),
            _ => 0,
        }
    }

    /// Straight-line distance from the first to the last point, in km.
    pub fn take_off_distance(&self) -> f64 {
        match (self.points.first(), self.points.last()) {
            (Some(first), Some(last)) => first.distance_to(last),
            _ => 0.0,
        }
    }

    /// Markdown link to this pilot on the live dashboard.
    pub fn livetrack_link(&self, endpoint: &str) -> String {
        format!("[Livetrack]({}?pilot={})", endpoint, self.name)
    }
}
