//! Spot shared-page feed (`message.json`).
//!
//! Messages arrive newest first. When a feed holds exactly one message the
//! `message` field is a bare object rather than an array. A feed with no
//! displayable messages answers with an `errors` body instead of
//! `feedMessageResponse`; that yields zero points.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use livetrack_core::Point;

use crate::error::ParseError;
use crate::normalizer::Normalizer;

const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

#[derive(Debug, Default, Clone, Copy)]
pub struct SpotNormalizer;

impl Normalizer for SpotNormalizer {
    fn source(&self) -> &'static str {
        "spot"
    }

    fn parse(&self, raw: &[u8]) -> Result<Vec<Point>, ParseError> {
        let root: Root = serde_json::from_slice(raw)?;
        let Some(feed) = root.response.feed_message_response else {
            tracing::debug!("spot feed has no messages");
            return Ok(Vec::new());
        };

        feed.messages
            .message
            .into_vec()
            .into_iter()
            .map(RawMessage::into_point)
            .collect()
    }
}

// ── Wire format ───────────────────────────────────────────────

#[derive(Deserialize)]
struct Root {
    response: Response,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Response {
    #[serde(default)]
    feed_message_response: Option<FeedMessageResponse>,
}

#[derive(Deserialize)]
struct FeedMessageResponse {
    messages: Messages,
}

#[derive(Deserialize)]
struct Messages {
    message: OneOrMany<RawMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(v) => v,
            Self::One(t) => vec![t],
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMessage {
    #[serde(default)]
    message_type: String,
    #[serde(default)]
    message_content: Option<String>,
    #[serde(default)]
    latitude: Value,
    #[serde(default)]
    longitude: Value,
    #[serde(default)]
    altitude: Value,
    #[serde(default)]
    date_time: Option<String>,
}

impl RawMessage {
    fn into_point(self) -> Result<Point, ParseError> {
        let raw_date = self.date_time.unwrap_or_default();
        let date_time = DateTime::parse_from_str(&raw_date, DATE_FORMAT)
            .map_err(|e| ParseError::invalid("dateTime", raw_date.as_str(), e))?
            .with_timezone(&Utc);

        Ok(Point::new(
            date_time,
            coordinate("latitude", &self.latitude)?,
            coordinate("longitude", &self.longitude)?,
            altitude(&self.altitude)?,
            self.message_type,
            self.message_content.unwrap_or_default(),
        ))
    }
}

/// Accepts a JSON number or a numeric string.
fn coordinate(field: &'static str, v: &Value) -> Result<f64, ParseError> {
    let parsed = match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    parsed
        .filter(|f: &f64| f.is_finite())
        .ok_or_else(|| ParseError::invalid(field, v.to_string(), "not a number"))
}

/// Missing altitude is reported as sea level.
fn altitude(v: &Value) -> Result<i32, ParseError> {
    let parsed = match v {
        Value::Null => Some(0),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .and_then(|i| i32::try_from(i).ok()),
        Value::String(s) => s.trim().parse::<f64>().ok().map(|f| f.trunc() as i32),
        _ => None,
    };
    parsed.ok_or_else(|| ParseError::invalid("altitude", v.to_string(), "not an integer"))
}
