//! Fetcher trait and the HTTP implementation used for both tracker sources.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use livetrack_core::{Point, TrackerKind};

use crate::error::FetchError;
use crate::garmin::GarminNormalizer;
use crate::normalizer::Normalizer;
use crate::spot::SpotNormalizer;

/// Some tracker endpoints reject unknown clients.
const USER_AGENT: &str = "Wget/1.13.4 (linux-gnu)";

/// Source of points for one tracker feed.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch today's points for `feed_id`, in source order.
    async fn fetch(&self, feed_id: &str) -> Result<Vec<Point>, FetchError>;

    /// Fetch only points strictly after `since`.
    async fn fetch_since(
        &self,
        feed_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Point>, FetchError> {
        let points = self.fetch(feed_id).await?;
        Ok(points.into_iter().filter(|p| p.date_time > since).collect())
    }
}

type UrlBuilder = fn(base: &str, feed_id: &str, day: NaiveDate) -> String;

/// `GET`s a feed URL and hands the body to a [`Normalizer`].
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    build_url: UrlBuilder,
    normalizer: Box<dyn Normalizer>,
}

impl HttpFetcher {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        build_url: UrlBuilder,
        normalizer: Box<dyn Normalizer>,
    ) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
            build_url,
            normalizer,
        })
    }

    pub fn spot(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Self::new(base_url, timeout, spot_url, Box::new(SpotNormalizer))
    }

    pub fn garmin(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FetchError> {
        Self::new(base_url, timeout, garmin_url, Box::new(GarminNormalizer))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, feed_id: &str) -> Result<Vec<Point>, FetchError> {
        let url = (self.build_url)(&self.base_url, feed_id, Utc::now().date_naive());
        tracing::debug!(source = self.normalizer.source(), %url, "fetching feed");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let body = response.bytes().await?;
        let points = self.normalizer.parse(&body)?;
        tracing::debug!(
            source = self.normalizer.source(),
            feed_id,
            points = points.len(),
            "feed parsed"
        );
        Ok(points)
    }
}

/// `{base}/{id}/message.json?startDate=YYYY-MM-DDT00:00:00-0000`
pub fn spot_url(base: &str, feed_id: &str, day: NaiveDate) -> String {
    format!(
        "{}/{}/message.json?startDate={}T00:00:00-0000",
        base.trim_end_matches('/'),
        feed_id,
        day.format("%Y-%m-%d")
    )
}

/// `{base}/{id}?d1=YYYY-MM-DDT00:00&d2=YYYY-MM-DDT23:59`
pub fn garmin_url(base: &str, feed_id: &str, day: NaiveDate) -> String {
    let day = day.format("%Y-%m-%d");
    format!(
        "{}/{}?d1={day}T00:00&d2={day}T23:59",
        base.trim_end_matches('/'),
        feed_id
    )
}

// ── Registry ──────────────────────────────────────────────────

/// Fetchers keyed by tracker kind. Adding a source is one `register` call.
#[derive(Default, Clone)]
pub struct FetcherRegistry {
    fetchers: HashMap<TrackerKind, Arc<dyn Fetcher>>,
}

impl FetcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Spot and Garmin over HTTP.
    pub fn http(
        spot_base_url: &str,
        garmin_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let mut registry = Self::new();
        registry.register(TrackerKind::Spot, Arc::new(HttpFetcher::spot(spot_base_url, timeout)?));
        registry.register(
            TrackerKind::Garmin,
            Arc::new(HttpFetcher::garmin(garmin_base_url, timeout)?),
        );
        Ok(registry)
    }

    pub fn register(&mut self, kind: TrackerKind, fetcher: Arc<dyn Fetcher>) {
        self.fetchers.insert(kind, fetcher);
    }

    pub fn get(&self, kind: &TrackerKind) -> Result<&Arc<dyn Fetcher>, FetchError> {
        self.fetchers
            .get(kind)
            .ok_or_else(|| FetchError::UnsupportedTracker(kind.to_string()))
    }
}
