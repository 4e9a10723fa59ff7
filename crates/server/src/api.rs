use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use chrono::NaiveDate;
use futures::{Stream, StreamExt};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use livetrack_core::{compute_statistics, Pilot, Point};

use crate::sse::{serve_subscriber, Frame};
use crate::state::AppState;

/// Frames buffered between a serving loop and the HTTP body.
const SSE_OUTPUT_BUFFER: usize = 8;

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, msg: impl ToString) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
}

fn store_error(e: impl std::fmt::Display) -> ApiError {
    error!(error = %e, "store query failed");
    api_error(StatusCode::INTERNAL_SERVER_ERROR, "store unavailable")
}

// ── Health ────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub subscribers: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        subscribers: state.hub.subscriber_count(),
    })
}

pub async fn ping() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "pong" }))
}

// ── Pilots & tracks ───────────────────────────────────────────────

pub async fn pilots(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Pilot>>, ApiError> {
    let pilots = state.store.get_all_pilots().await.map_err(store_error)?;
    Ok(Json(pilots))
}

#[derive(Debug, Serialize)]
pub struct DatesResponse {
    pub dates: Vec<NaiveDate>,
    pub counts: Vec<i64>,
}

pub async fn dates(State(state): State<Arc<AppState>>) -> Result<Json<DatesResponse>, ApiError> {
    let rows = state
        .store
        .get_dates_with_count(state.dates_limit)
        .await
        .map_err(store_error)?;
    let (dates, counts) = rows.into_iter().map(|r| (r.date, r.count)).unzip();
    Ok(Json(DatesResponse { dates, counts }))
}

/// Every pilot's track on `date` (`YYYY-MM-DD`, UTC), with statistics.
pub async fn tracks_of_day(
    State(state): State<Arc<AppState>>,
    Path(date): Path<String>,
) -> Result<Json<BTreeMap<String, Vec<Point>>>, ApiError> {
    let day = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|e| {
        api_error(StatusCode::BAD_REQUEST, format!("invalid date '{date}': {e}"))
    })?;
    let tracks = state
        .store
        .get_all_tracks_of_day(day)
        .await
        .map_err(store_error)?;
    let tracks = tracks
        .into_iter()
        .filter(|(_, points)| !points.is_empty())
        .map(|(name, points)| (name, compute_statistics(&points)))
        .collect();
    Ok(Json(tracks))
}

// ── Live events ───────────────────────────────────────────────────

/// Subscribe to store change events as a server-sent event stream.
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    let subscription = state
        .hub
        .subscribe()
        .await
        .map_err(|e| api_error(StatusCode::SERVICE_UNAVAILABLE, e))?;
    info!(subscriber = %subscription.id, "dashboard connected");

    let (tx, rx) = mpsc::channel(SSE_OUTPUT_BUFFER);
    tokio::spawn(serve_subscriber(
        subscription,
        tx,
        state.heartbeat,
        state.cancel.clone(),
    ));

    let stream = ReceiverStream::new(rx).map(Frame::into_event);
    Ok(Sse::new(stream))
}
