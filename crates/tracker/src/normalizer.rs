use livetrack_core::Point;

use crate::error::ParseError;

/// Converts one tracker source's raw payload into points.
///
/// Output follows the source's own ordering. Implementations perform no I/O.
pub trait Normalizer: Send + Sync {
    /// Short source name used in logs (e.g. `"spot"`).
    fn source(&self) -> &'static str;

    fn parse(&self, raw: &[u8]) -> Result<Vec<Point>, ParseError>;
}
