//! Turns merged points into notification text.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::json;

use livetrack_core::duration::format_duration;
use livetrack_core::{compute_statistics, MessageKind, Pilot, Point, PointStats};

use crate::itinerary::{self, ItineraryLookup};
use crate::templating::{self, TemplateRenderer};
use crate::traits::NotifyError;

/// Timestamp layout used in every message, e.g. `14 Jan 23 08:00 UTC`.
const TIME_FORMAT: &str = "%d %b %y %H:%M UTC";

/// Outcome of classifying one point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub text: String,
    pub should_notify: bool,
}

impl Classification {
    fn notify(text: String) -> Self {
        Self {
            text,
            should_notify: true,
        }
    }

    fn silent() -> Self {
        Self {
            text: String::new(),
            should_notify: false,
        }
    }
}

pub struct EventClassifier {
    livetrack_endpoint: String,
    itinerary: Arc<dyn ItineraryLookup>,
    renderer: TemplateRenderer,
}

impl EventClassifier {
    pub fn new(livetrack_endpoint: impl Into<String>, itinerary: Arc<dyn ItineraryLookup>) -> Self {
        Self {
            livetrack_endpoint: livetrack_endpoint.into(),
            itinerary,
            renderer: TemplateRenderer::new(),
        }
    }

    /// Message announcing the first point of a pilot's day.
    pub fn session_start(&self, pilot: &Pilot, at: DateTime<Utc>) -> Result<String, NotifyError> {
        self.renderer.render(
            templating::SESSION_START,
            &json!({
                "name": pilot.name,
                "time": format_time(at),
                "livetrack": pilot.livetrack_link(&self.livetrack_endpoint),
            }),
        )
    }

    /// Decide whether `point` warrants a message and render it.
    ///
    /// `pilot.points` is the track so far; statistics are measured over the
    /// part of it that ends at `point`.
    pub async fn classify(&self, point: &Point, pilot: &Pilot) -> Result<Classification, NotifyError> {
        let time = format_time(point.date_time);
        let text = match point.kind() {
            MessageKind::Ok => {
                let stats = stats_at(point, pilot);
                let itinerary =
                    itinerary::resolve(self.itinerary.as_ref(), point.latitude, point.longitude, &pilot.home)
                        .await;
                self.renderer.render(
                    templating::CHECK_IN,
                    &json!({
                        "name": pilot.name,
                        "time": time,
                        "flight_time": format_duration(stats.flight_time),
                        "cum_dist": stats.cum_dist,
                        "take_off_dist": stats.take_off_dist,
                        "livetrack": pilot.livetrack_link(&self.livetrack_endpoint),
                        "map": point.map_link(),
                        "itinerary": itinerary.markdown(),
                    }),
                )?
            }
            MessageKind::Help | MessageKind::Move | MessageKind::Custom => self.renderer.render(
                templating::URGENT,
                &json!({ "name": pilot.name, "content": urgent_content(point) }),
            )?,
            MessageKind::SessionStart => self
                .renderer
                .render(templating::RESUMED, &json!({ "name": pilot.name, "time": time }))?,
            MessageKind::SessionStop => self
                .renderer
                .render(templating::STOPPED, &json!({ "name": pilot.name, "time": time }))?,
            MessageKind::Track => return Ok(Classification::silent()),
            MessageKind::Unrecognized => {
                tracing::warn!(
                    pilot = %pilot.name,
                    msg_type = %point.msg_type,
                    "unrecognized message type, not notifying"
                );
                return Ok(Classification::silent());
            }
        };
        Ok(Classification::notify(text))
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

/// Free text when the device sent some, the raw type otherwise.
fn urgent_content(point: &Point) -> &str {
    if point.msg_content.trim().is_empty() {
        &point.msg_type
    } else {
        &point.msg_content
    }
}

fn stats_at(point: &Point, pilot: &Pilot) -> PointStats {
    let track = match pilot.points.iter().position(|p| p == point) {
        Some(idx) => compute_statistics(&pilot.points[..=idx]),
        None => {
            let mut points = pilot.points.clone();
            points.push(point.clone());
            compute_statistics(&points)
        }
    };
    track.last().map(|p| p.stats).unwrap_or_default()
}
