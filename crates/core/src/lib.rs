//! Shared data model and configuration for the livetrack pipeline.
//!
//! - [`Point`] / [`MessageKind`]: one normalized tracker report
//! - [`Pilot`] / [`TrackerKind`]: a tracked subject and its in-memory track
//! - [`geo`]: great-circle distance
//! - [`config`]: environment-driven configuration with profile support

pub mod config;
pub mod duration;
pub mod error;
pub mod geo;
pub mod pilot;
pub mod point;

pub use config::Config;
pub use error::*;
pub use pilot::{Pilot, TrackerKind};
pub use point::{compute_statistics, MessageKind, Point, PointStats};
