//! Garmin MapShare KML feed.
//!
//! Each position is a `Placemark` carrying its fields as
//! `ExtendedData/Data[@name]/value`. The trailing placemark of a folder is
//! the track polyline and has no data; it is skipped.

use chrono::NaiveDateTime;
use serde::Deserialize;

use livetrack_core::Point;

use crate::error::ParseError;
use crate::normalizer::Normalizer;

const TIME_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";

#[derive(Debug, Default, Clone, Copy)]
pub struct GarminNormalizer;

impl Normalizer for GarminNormalizer {
    fn source(&self) -> &'static str {
        "garmin"
    }

    fn parse(&self, raw: &[u8]) -> Result<Vec<Point>, ParseError> {
        let text = std::str::from_utf8(raw).map_err(|e| ParseError::Xml(e.to_string()))?;
        let kml: Kml = quick_xml::de::from_str(text).map_err(|e| ParseError::Xml(e.to_string()))?;

        kml.document
            .into_iter()
            .flat_map(|d| d.folders)
            .flat_map(|f| f.placemarks)
            .filter_map(|p| p.extended_data)
            .filter(|data| !data.fields.is_empty())
            .map(|data| data.into_point())
            .collect()
    }
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Deserialize)]
struct Kml {
    #[serde(rename = "Document", default)]
    document: Option<KmlDocument>,
}

#[derive(Deserialize)]
struct KmlDocument {
    #[serde(rename = "Folder", default)]
    folders: Vec<Folder>,
}

#[derive(Deserialize)]
struct Folder {
    #[serde(rename = "Placemark", default)]
    placemarks: Vec<Placemark>,
}

#[derive(Deserialize)]
struct Placemark {
    #[serde(rename = "ExtendedData", default)]
    extended_data: Option<ExtendedData>,
}

#[derive(Deserialize)]
struct ExtendedData {
    #[serde(rename = "Data", default)]
    fields: Vec<Data>,
}

#[derive(Deserialize)]
struct Data {
    #[serde(rename = "@name")]
    name: String,
    #[serde(default)]
    value: Option<String>,
}

impl ExtendedData {
    fn field(&self, name: &str) -> &str {
        self.fields
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.value.as_deref())
            .map(str::trim)
            .unwrap_or("")
    }

    fn into_point(self) -> Result<Point, ParseError> {
        let raw_time = self.field("Time UTC");
        let date_time = NaiveDateTime::parse_from_str(raw_time, TIME_FORMAT)
            .map_err(|e| ParseError::invalid("Time UTC", raw_time, e))?
            .and_utc();

        let latitude = parse_coordinate("Latitude", self.field("Latitude"))?;
        let longitude = parse_coordinate("Longitude", self.field("Longitude"))?;
        let altitude = parse_elevation(self.field("Elevation"))?;

        Ok(Point::new(
            date_time,
            latitude,
            longitude,
            altitude,
            self.field("Event"),
            self.field("Text"),
        ))
    }
}

fn parse_coordinate(field: &'static str, raw: &str) -> Result<f64, ParseError> {
    raw.parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| ParseError::invalid(field, raw, "not a number"))
}

/// `"1412.37 m from MSL"` keeps the integer metres.
fn parse_elevation(raw: &str) -> Result<i32, ParseError> {
    let integer_part = raw
        .split(|c: char| c == '.' || c.is_whitespace())
        .next()
        .unwrap_or("");
    integer_part
        .parse()
        .map_err(|e| ParseError::invalid("Elevation", raw, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const FEED: &[u8] = include_bytes!("../testdata/garmin_feed.kml");
    const EMPTY: &[u8] = include_bytes!("../testdata/garmin_empty.kml");

    #[test]
    fn parses_feed_and_skips_track_line() {
        // Five placemarks, the last one is the polyline.
        let points = GarminNormalizer.parse(FEED).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[0].msg_type, "Tracking turned on from device.");
        assert!((points[1].latitude - 46.625150).abs() < 1e-9);
        assert!((points[1].longitude - 7.206108).abs() < 1e-9);
        assert_eq!(points[1].altitude, 1873);
        assert_eq!(
            points[1].date_time,
            Utc.with_ymd_and_hms(2023, 8, 23, 10, 26, 45).unwrap()
        );
        assert_eq!(
            points[2].date_time,
            Utc.with_ymd_and_hms(2023, 8, 23, 10, 36, 45).unwrap()
        );
    }

    #[test]
    fn afternoon_time_and_text() {
        let points = GarminNormalizer.parse(FEED).unwrap();
        assert_eq!(
            points[3].date_time,
            Utc.with_ymd_and_hms(2023, 8, 23, 12, 2, 11).unwrap()
        );
        assert_eq!(points[3].msg_type, "Msg from device");
        assert_eq!(points[3].msg_content, "Landed safe in Spiez");
        assert_eq!(points[3].altitude, 612);
    }

    #[test]
    fn empty_document_has_no_points() {
        assert!(GarminNormalizer.parse(EMPTY).unwrap().is_empty());
    }

    #[test]
    fn rejects_bad_latitude() {
        let raw = br#"<kml><Document><Folder><Placemark><ExtendedData>
            <Data name="Time UTC"><value>8/23/2023 10:26:45 AM</value></Data>
            <Data name="Latitude"><value>north</value></Data>
            <Data name="Longitude"><value>7.2</value></Data>
            <Data name="Elevation"><value>100.0 m from MSL</value></Data>
            </ExtendedData></Placemark></Folder></Document></kml>"#;
        match GarminNormalizer.parse(raw) {
            Err(ParseError::InvalidField { field, value, .. }) => {
                assert_eq!(field, "Latitude");
                assert_eq!(value, "north");
            }
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_time() {
        let raw = br#"<kml><Document><Folder><Placemark><ExtendedData>
            <Data name="Time UTC"><value>2023-08-23 10:26</value></Data>
            <Data name="Latitude"><value>46.6</value></Data>
            <Data name="Longitude"><value>7.2</value></Data>
            <Data name="Elevation"><value>100.0 m from MSL</value></Data>
            </ExtendedData></Placemark></Folder></Document></kml>"#;
        match GarminNormalizer.parse(raw) {
            Err(ParseError::InvalidField { field, .. }) => assert_eq!(field, "Time UTC"),
            other => panic!("expected InvalidField, got {other:?}"),
        }
    }

    #[test]
    fn elevation_integer_part() {
        assert_eq!(parse_elevation("1412.37 m from MSL").unwrap(), 1412);
        assert_eq!(parse_elevation("-3.5 m from MSL").unwrap(), -3);
        assert_eq!(parse_elevation("850 m from MSL").unwrap(), 850);
        assert!(parse_elevation("").is_err());
    }

    #[test]
    fn rejects_invalid_utf8() {
        assert!(matches!(
            GarminNormalizer.parse(&[0xff, 0xfe, 0x00]),
            Err(ParseError::Xml(_))
        ));
    }
}
