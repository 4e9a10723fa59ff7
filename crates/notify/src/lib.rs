//! Chat notifications for tracking events.
//!
//! This crate provides:
//! - `ChatChannel` trait for the outbound chat service
//! - Telegram Bot API implementation
//! - `EventClassifier` turning merged points into message text
//! - Itinerary lookup used to enrich check-in messages
//! - Minijinja templates for every message kind
//! - `Dispatcher` remembering sent messages for bulk retraction

pub mod classifier;
pub mod dispatcher;
pub mod itinerary;
pub mod telegram;
pub mod templating;
pub mod traits;

pub use classifier::{Classification, EventClassifier};
pub use dispatcher::{Dispatcher, NotificationRecord, RetractError};
pub use itinerary::{Itinerary, ItineraryLookup, SbbItinerary};
pub use telegram::TelegramChannel;
pub use traits::{ChatChannel, MessageId, NotifyError};
