//! Normalized tracker report and its derived statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::distance_km;

/// Classification of a tracker message type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Regular check-in ("OK").
    Ok,
    Help,
    Move,
    Custom,
    SessionStart,
    SessionStop,
    /// Periodic position fix sent without user interaction.
    Track,
    Unrecognized,
}

impl MessageKind {
    /// Map a source message type (Spot `messageType` or Garmin `Event`) to a kind.
    pub fn from_source(msg_type: &str) -> Self {
        match msg_type.trim() {
            "OK" => Self::Ok,
            "HELP" | "SOS" => Self::Help,
            "MOVE" | "NEWMOVEMENT" => Self::Move,
            "CUSTOM" | "Msg from device" | "Quick Text to MapShare received" => Self::Custom,
            "START" | "Tracking turned on from device." => Self::SessionStart,
            "OFF" | "STOP" | "POWER-OFF" | "Tracking turned off from device." => Self::SessionStop,
            "UNLIMITED-TRACK" | "EXTREME-TRACK" | "TRACK" | "Tracking interval received." => {
                Self::Track
            }
            _ => Self::Unrecognized,
        }
    }
}

/// Statistics computed on read by [`compute_statistics`]. Never part of point identity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PointStats {
    /// Seconds since the first point of the track.
    pub flight_time: i64,
    pub take_off_dist: f64,
    pub cum_dist: f64,
    /// km/h over the whole track so far.
    pub avg_speed: f64,
    /// km/h over the last leg.
    pub leg_speed: f64,
    pub leg_dist: f64,
}

/// One position or status report from a tracker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Point {
    pub date_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: i32,
    /// Raw message type as reported by the source.
    pub msg_type: String,
    pub msg_content: String,
    #[serde(flatten)]
    pub stats: PointStats,
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        self.date_time == other.date_time
            && self.latitude == other.latitude
            && self.longitude == other.longitude
            && self.altitude == other.altitude
            && self.msg_type == other.msg_type
            && self.msg_content == other.msg_content
    }
}

impl Point {
    pub fn new(
        date_time: DateTime<Utc>,
        latitude: f64,
        longitude: f64,
        altitude: i32,
        msg_type: impl Into<String>,
        msg_content: impl Into<String>,
    ) -> Self {
        Self {
            date_time,
            latitude,
            longitude,
            altitude,
            msg_type: msg_type.into(),
            msg_content: msg_content.into(),
            stats: PointStats::default(),
        }
    }

    pub fn kind(&self) -> MessageKind {
        MessageKind::from_source(&self.msg_type)
    }

    /// Kilometres between this point and `other`.
    pub fn distance_to(&self, other: &Point) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Markdown link opening driving directions to this point.
    pub fn map_link(&self) -> String {
        format!(
            "[Pick Me](https://www.google.com/maps/dir/?api=1&destination={:.6},{:.6}&travelmode=driving)",
            self.latitude, self.longitude
        )
    }
}

/// Return a copy of `points` with derived statistics filled in.
///
/// The first point carries zeroed statistics; every later point is measured
/// against the first (flight time, take-off distance) and its predecessor
/// (leg distance, leg speed).
pub fn compute_statistics(points: &[Point]) -> Vec<Point> {
    let Some(first) = points.first() else {
        return Vec::new();
    };

    let mut out: Vec<Point> = Vec::with_capacity(points.len());
    for (i, point) in points.iter().enumerate() {
        let mut p = point.clone();
        if i == 0 {
            p.stats = PointStats::default();
            out.push(p);
            continue;
        }

        let previous = &out[i - 1];
        let flight_time = (p.date_time - first.date_time).num_seconds();
        let leg_secs = (p.date_time - previous.date_time).num_seconds();
        let leg_dist = p.distance_to(previous);
        let cum_dist = previous.stats.cum_dist + leg_dist;

        p.stats = PointStats {
            flight_time,
            take_off_dist: p.distance_to(first),
            cum_dist,
            avg_speed: speed_kmh(cum_dist, flight_time),
            leg_speed: speed_kmh(leg_dist, leg_secs),
            leg_dist,
        };
        out.push(p);
    }
    out
}

fn speed_kmh(km: f64, secs: i64) -> f64 {
    if secs <= 0 {
        0.0
    } else {
        km / (secs as f64 / 3_600.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, lat: f64, lon: f64, kind: &str) -> Point {
        Point::new(
            Utc.with_ymd_and_hms(2023, 8, 23, h, m, 0).unwrap(),
            lat,
            lon,
            1000,
            kind,
            "",
        )
    }

    #[test]
    fn equality_ignores_statistics() {
        let a = at(10, 0, 46.0, 7.0, "OK");
        let mut b = a.clone();
        b.stats.cum_dist = 42.0;
        assert_eq!(a, b);

        let mut c = a.clone();
        c.msg_content = "different".into();
        assert_ne!(a, c);
    }

    #[test]
    fn kind_mapping_covers_both_sources() {
        assert_eq!(MessageKind::from_source("OK"), MessageKind::Ok);
        assert_eq!(MessageKind::from_source("HELP"), MessageKind::Help);
        assert_eq!(MessageKind::from_source("CUSTOM"), MessageKind::Custom);
        assert_eq!(MessageKind::from_source("MOVE"), MessageKind::Move);
        assert_eq!(MessageKind::from_source("START"), MessageKind::SessionStart);
        assert_eq!(MessageKind::from_source("OFF"), MessageKind::SessionStop);
        assert_eq!(MessageKind::from_source("UNLIMITED-TRACK"), MessageKind::Track);
        assert_eq!(
            MessageKind::from_source("Tracking turned on from device."),
            MessageKind::SessionStart
        );
        assert_eq!(
            MessageKind::from_source("Tracking interval received."),
            MessageKind::Track
        );
        assert_eq!(MessageKind::from_source("what"), MessageKind::Unrecognized);
        assert_eq!(MessageKind::from_source(""), MessageKind::Unrecognized);
    }

    #[test]
    fn map_link_uses_six_decimals() {
        let p = at(10, 0, 46.45669, 6.88411, "OK");
        assert_eq!(
            p.map_link(),
            "[Pick Me](https://www.google.com/maps/dir/?api=1&destination=46.456690,6.884110&travelmode=driving)"
        );
    }

    #[test]
    fn statistics_on_empty_and_single() {
        assert!(compute_statistics(&[]).is_empty());
        let one = compute_statistics(&[at(10, 0, 46.0, 7.0, "OK")]);
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].stats, PointStats::default());
    }

    #[test]
    fn statistics_accumulate_over_legs() {
        let points = vec![
            at(10, 0, 46.0, 7.0, "UNLIMITED-TRACK"),
            at(11, 0, 47.0, 7.0, "UNLIMITED-TRACK"),
            at(12, 0, 46.0, 7.0, "OK"),
        ];
        let stats = compute_statistics(&points);
        let leg = points[0].distance_to(&points[1]);

        assert_eq!(stats[1].stats.flight_time, 3_600);
        assert!((stats[1].stats.leg_dist - leg).abs() < 1e-9);
        assert!((stats[1].stats.leg_speed - leg).abs() < 1e-9);

        assert_eq!(stats[2].stats.flight_time, 7_200);
        assert!((stats[2].stats.cum_dist - 2.0 * leg).abs() < 1e-9);
        assert!(stats[2].stats.take_off_dist.abs() < 1e-9);
        assert!((stats[2].stats.avg_speed - leg).abs() < 1e-9);
    }

    #[test]
    fn zero_elapsed_time_gives_zero_speed() {
        let points = vec![at(10, 0, 46.0, 7.0, "OK"), at(10, 0, 46.1, 7.0, "OK")];
        let stats = compute_statistics(&points);
        assert_eq!(stats[1].stats.avg_speed, 0.0);
        assert_eq!(stats[1].stats.leg_speed, 0.0);
    }

    #[test]
    fn serializes_camel_case_with_flattened_stats() {
        let p = at(10, 0, 46.0, 7.0, "OK");
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["msgType"], "OK");
        assert_eq!(json["flightTime"], 0);
        assert!(json.get("dateTime").is_some());
        assert!(json.get("stats").is_none());
    }
}
