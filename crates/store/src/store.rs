use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use livetrack_core::{Pilot, Point};

use crate::error::StoreError;

/// Number of distinct pilots with track data on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DateCount {
    pub date: NaiveDate,
    pub count: i64,
}

/// Result of an idempotent track write.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteSummary {
    pub inserted: usize,
    /// Points already stored; not an error.
    pub duplicates: usize,
}

#[async_trait]
pub trait TrackStore: Send + Sync {
    async fn ping(&self) -> Result<(), StoreError>;

    async fn get_all_pilots(&self) -> Result<Vec<Pilot>, StoreError>;

    async fn get_pilots_from_org(&self, org: &str) -> Result<Vec<Pilot>, StoreError>;

    /// Points strictly after `since`, oldest first.
    async fn get_track_since(
        &self,
        pilot_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Point>, StoreError>;

    /// Insert each point; a duplicate natural key counts as success.
    async fn write_track(&self, pilot_id: &str, points: &[Point]) -> Result<WriteSummary, StoreError>;

    /// Points of one pilot on a UTC calendar day, oldest first.
    async fn get_track_of_day(&self, pilot_id: &str, day: NaiveDate) -> Result<Vec<Point>, StoreError>;

    /// Display name to points for every pilot with data on `day`.
    async fn get_all_tracks_of_day(
        &self,
        day: NaiveDate,
    ) -> Result<BTreeMap<String, Vec<Point>>, StoreError>;

    /// Most recent `limit` days with track data, newest first.
    async fn get_dates_with_count(&self, limit: u32) -> Result<Vec<DateCount>, StoreError>;
}
