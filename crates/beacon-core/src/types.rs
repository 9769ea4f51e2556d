use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity label used when the backend reports a face without a name.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Origin of a detection: batch image upload, batch video upload, or a
/// live-capture frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Image,
    Video,
    Live,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Image => write!(f, "image"),
            Source::Video => write!(f, "video"),
            Source::Live => write!(f, "live"),
        }
    }
}

/// One raw recognition result from any source.
///
/// Always canonical: `name` is never empty (falls back to
/// [`UNKNOWN_IDENTITY`]) and `timestamp` is always populated (falls back to
/// capture time). Backend payloads reach this shape through
/// [`RawDetection::normalize`](crate::normalize::RawDetection::normalize).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionEvent {
    pub name: String,
    /// Source-reported score on a 0–100 scale; not normalized further.
    pub confidence: f64,
    /// Ordinal marker for the frame that produced the event, when known.
    pub frame: Option<i64>,
    /// Opaque image reference (data URI or URL) for display.
    pub thumbnail: Option<String>,
    pub source: Option<Source>,
    pub timestamp: DateTime<Utc>,
}

/// Aggregated per-identity rollup of every [`DetectionEvent`] sharing a name.
///
/// Created the first time a name is observed and widened in place by each
/// later event; never deleted within a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchRecord {
    pub name: String,
    /// Maximum confidence observed across contributing events.
    pub confidence: f64,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Frame-ordinal bounds, tracked independently of the timestamps;
    /// frame numbering and wall-clock time are not required to correlate.
    pub first_frame: Option<i64>,
    pub last_frame: Option<i64>,
    /// First non-empty thumbnail encountered; never overwritten once set.
    pub thumbnail: Option<String>,
    /// Number of contributing events.
    pub count: u64,
    /// Distinct origin tags in first-appearance order.
    pub sources: Vec<Source>,
}

/// Geographic fix attached to frame and upload submissions when location
/// capture is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub lat: f64,
    pub lon: f64,
    pub accuracy: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Source::Live).unwrap(), "\"live\"");
        assert_eq!(serde_json::to_string(&Source::Image).unwrap(), "\"image\"");
    }

    #[test]
    fn test_source_display_matches_wire_form() {
        for source in [Source::Image, Source::Video, Source::Live] {
            let wire = serde_json::to_string(&source).unwrap();
            assert_eq!(wire, format!("\"{source}\""));
        }
    }
}
