//! Public-transport itinerary lookup used to enrich check-in messages.

use std::time::Duration;

use serde::Deserialize;

use crate::traits::NotifyError;

/// Enrichment result for a check-in message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Itinerary {
    Link(String),
    /// Lookup failed or was not possible.
    Unavailable,
}

impl Itinerary {
    pub fn markdown(&self) -> String {
        match self {
            Self::Link(url) => format!("[Back with SBB]({url})"),
            Self::Unavailable => "No SBB itinerary".to_string(),
        }
    }
}

#[async_trait::async_trait]
pub trait ItineraryLookup: Send + Sync {
    /// URL of a route from the given coordinates to `home`.
    async fn lookup(&self, latitude: f64, longitude: f64, home: &str) -> Result<String, NotifyError>;
}

/// Run `lookup`, falling back to [`Itinerary::Unavailable`] on any failure.
pub async fn resolve(
    lookup: &dyn ItineraryLookup,
    latitude: f64,
    longitude: f64,
    home: &str,
) -> Itinerary {
    if home.trim().is_empty() {
        return Itinerary::Unavailable;
    }
    match lookup.lookup(latitude, longitude, home).await {
        Ok(url) => Itinerary::Link(url),
        Err(e) => {
            tracing::warn!(home, error = %e, "itinerary lookup failed");
            Itinerary::Unavailable
        }
    }
}

/// search.ch timetable API (`route.json`).
pub struct SbbItinerary {
    api_url: String,
    client: reqwest::Client,
}

#[derive(Deserialize)]
struct RouteResponse {
    url: String,
}

impl SbbItinerary {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            api_url: api_url.into(),
            client: reqwest::Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait::async_trait]
impl ItineraryLookup for SbbItinerary {
    async fn lookup(&self, latitude: f64, longitude: f64, home: &str) -> Result<String, NotifyError> {
        let from = format!("{latitude:.6},{longitude:.6}");
        let response = self
            .client
            .get(&self.api_url)
            .query(&[("from", from.as_str()), ("to", home)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(NotifyError::Api(format!("itinerary lookup returned {status}")));
        }
        let route: RouteResponse = response.json().await?;
        Ok(route.url)
    }
}
