//! Persistent store for pilots and their tracks.
//!
//! [`TrackStore`] is the seam the scheduler and the HTTP API depend on;
//! [`PgStore`] implements it on PostgreSQL. [`ChangeFeedConnector`] exposes
//! the store's `LISTEN/NOTIFY` channel for the broadcast server.

pub mod error;
pub mod feed;
pub mod postgres;
pub mod store;

pub use error::StoreError;
pub use feed::{ChangeFeed, ChangeFeedConnector, PgChangeFeedConnector};
pub use postgres::PgStore;
pub use store::{DateCount, TrackStore, WriteSummary};
