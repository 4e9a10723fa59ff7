//! Tracker feeds: turning third-party payloads into merged tracks.
//!
//! - [`Normalizer`] implementations for Spot (JSON) and Garmin (KML)
//! - [`Fetcher`] trait and the HTTP fetcher used in production
//! - [`merge`] for appending only genuinely new points to a track

pub mod error;
pub mod fetcher;
pub mod garmin;
pub mod merge;
pub mod normalizer;
pub mod spot;

pub use error::{FetchError, ParseError};
pub use fetcher::{Fetcher, FetcherRegistry, HttpFetcher};
pub use garmin::GarminNormalizer;
pub use merge::{high_water_mark, merge, MergeOutcome};
pub use normalizer::Normalizer;
pub use spot::SpotNormalizer;
