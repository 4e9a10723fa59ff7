//! Track merging: which fetched points are genuinely new.

use chrono::{DateTime, Utc};

use livetrack_core::Point;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MergeOutcome {
    /// Points to append, in chronological order.
    pub new_points: Vec<Point>,
    /// Set when the known track was empty: the first new point's timestamp.
    pub session_start: Option<DateTime<Utc>>,
}

/// Timestamp after which points should be requested from the source.
pub fn high_water_mark(known: &[Point], day_start: DateTime<Utc>) -> DateTime<Utc> {
    known.last().map(|p| p.date_time).unwrap_or(day_start)
}

/// Compute the points of `fetched` that extend `known`.
///
/// `fetched` is ordered by timestamp (stable, so equal timestamps keep their
/// source order), then walked until the first point already present in
/// `known`. Everything after that point is dropped, even if new.
pub fn merge(known: &[Point], fetched: Vec<Point>) -> MergeOutcome {
    let mut fetched = fetched;
    fetched.sort_by_key(|p| p.date_time);

    let new_points: Vec<Point> = fetched
        .into_iter()
        .take_while(|p| !known.contains(p))
        .collect();

    let session_start = if known.is_empty() {
        new_points.first().map(|p| p.date_time)
    } else {
        None
    };

    MergeOutcome {
        new_points,
        session_start,
    }
}
