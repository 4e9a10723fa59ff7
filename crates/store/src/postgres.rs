//! PostgreSQL implementation of [`TrackStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use livetrack_core::config::PostgresConfig;
use livetrack_core::{Pilot, Point, TrackerKind};

use crate::error::{is_duplicate_key, StoreError};
use crate::store::{DateCount, TrackStore, WriteSummary};

// ── Rows ─────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct PilotRow {
    id: String,
    name: String,
    home: String,
    orgs: Vec<String>,
    tracker_type: String,
}

impl PilotRow {
    /// Rows with a blank tracker type are skipped with a warning.
    fn into_pilot(self) -> Option<Pilot> {
        let tracker_type: TrackerKind = match self.tracker_type.parse() {
            Ok(kind) => kind,
            Err(e) => {
                warn!(pilot_id = %self.id, error = %e, "skipping pilot row");
                return None;
            }
        };
        Some(Pilot {
            id: self.id,
            name: self.name,
            home: self.home,
            orgs: self.orgs,
            tracker_type,
            points: Vec::new(),
        })
    }
}

#[derive(sqlx::FromRow)]
struct TrackRow {
    unix_time: DateTime<Utc>,
    latitude: f64,
    longitude: f64,
    altitude: i32,
    msg_type: String,
    msg_content: String,
}

impl From<TrackRow> for Point {
    fn from(r: TrackRow) -> Self {
        Point::new(r.unix_time, r.latitude, r.longitude, r.altitude, r.msg_type, r.msg_content)
    }
}

#[derive(sqlx::FromRow)]
struct NamedTrackRow {
    name: String,
    #[sqlx(flatten)]
    point: TrackRow,
}

// ── Store ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and verify the database answers.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.connection_string())
            .await?;
        info!(host = %config.host, database = %config.database, "PostgreSQL connected");
        let store = Self { pool };
        store.ping().await?;
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        info!("Database migrations applied successfully");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const PILOT_COLUMNS: &str = "SELECT id, name, home, orgs, tracker_type FROM pilot";

#[async_trait]
impl TrackStore for PgStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn get_all_pilots(&self) -> Result<Vec<Pilot>, StoreError> {
        let rows = sqlx::query_as::<_, PilotRow>(&format!("{PILOT_COLUMNS} ORDER BY name"))
            .fetch_all(&self.pool)
            .await?;
        let pilots: Vec<Pilot> = rows.into_iter().filter_map(PilotRow::into_pilot).collect();
        debug!(count = pilots.len(), "pilots retrieved");
        Ok(pilots)
    }

    async fn get_pilots_from_org(&self, org: &str) -> Result<Vec<Pilot>, StoreError> {
        let rows = sqlx::query_as::<_, PilotRow>(&format!(
            "{PILOT_COLUMNS} WHERE $1 = ANY(orgs) ORDER BY name"
        ))
        .bind(org)
        .fetch_all(&self.pool)
        .await?;
        let pilots: Vec<Pilot> = rows.into_iter().filter_map(PilotRow::into_pilot).collect();
        debug!(count = pilots.len(), org, "pilots retrieved");
        Ok(pilots)
    }

    async fn get_track_since(
        &self,
        pilot_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Point>, StoreError> {
        let rows = sqlx::query_as::<_, TrackRow>(
            "SELECT unix_time, latitude, longitude, altitude, msg_type, msg_content
             FROM track
             WHERE pilot_id = $1 AND unix_time > $2
             ORDER BY unix_time",
        )
        .bind(pilot_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Point::from).collect())
    }

    async fn write_track(&self, pilot_id: &str, points: &[Point]) -> Result<WriteSummary, StoreError> {
        let mut summary = WriteSummary::default();
        for point in points {
            let result = sqlx::query(
                "INSERT INTO track (pilot_id, unix_time, latitude, longitude, altitude, msg_type, msg_content)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(pilot_id)
            .bind(point.date_time)
            .bind(point.latitude)
            .bind(point.longitude)
            .bind(point.altitude)
            .bind(&point.msg_type)
            .bind(&point.msg_content)
            .execute(&self.pool)
            .await;

            match result {
                Ok(_) => summary.inserted += 1,
                Err(e) if is_duplicate_key(&e) => {
                    debug!(pilot_id, date_time = %point.date_time, "point already stored");
                    summary.duplicates += 1;
                }
                Err(e) => {
                    error!(pilot_id, error = %e, "track write failed");
                    return Err(e.into());
                }
            }
        }
        debug!(pilot_id, inserted = summary.inserted, duplicates = summary.duplicates, "track written");
        Ok(summary)
    }

    async fn get_track_of_day(&self, pilot_id: &str, day: NaiveDate) -> Result<Vec<Point>, StoreError> {
        let rows = sqlx::query_as::<_, TrackRow>(
            "SELECT unix_time, latitude, longitude, altitude, msg_type, msg_content
             FROM track
             WHERE pilot_id = $1 AND (unix_time AT TIME ZONE 'UTC')::date = $2
             ORDER BY unix_time",
        )
        .bind(pilot_id)
        .bind(day)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Point::from).collect())
    }

    async fn get_all_tracks_of_day(
        &self,
        day: NaiveDate,
    ) -> Result<BTreeMap<String, Vec<Point>>, StoreError> {
        let rows = sqlx::query_as::<_, NamedTrackRow>(
            "SELECT p.name, t.unix_time, t.latitude, t.longitude, t.altitude, t.msg_type, t.msg_content
             FROM track t
             JOIN pilot p ON p.id = t.pilot_id
             WHERE (t.unix_time AT TIME ZONE 'UTC')::date = $1
             ORDER BY p.name, t.unix_time",
        )
        .bind(day)
        .fetch_all(&self.pool)
        .await?;

        let mut tracks: BTreeMap<String, Vec<Point>> = BTreeMap::new();
        for row in rows {
            tracks.entry(row.name).or_default().push(row.point.into());
        }
        Ok(tracks)
    }

    async fn get_dates_with_count(&self, limit: u32) -> Result<Vec<DateCount>, StoreError> {
        let rows: Vec<(NaiveDate, i64)> = sqlx::query_as(
            "SELECT (unix_time AT TIME ZONE 'UTC')::date AS day, COUNT(DISTINCT pilot_id) AS pilots
             FROM track
             GROUP BY day
             ORDER BY day DESC
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(date, count)| DateCount { date, count })
            .collect())
    }
}
