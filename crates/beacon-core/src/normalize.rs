//! Tolerant decoding of backend detection payloads.
//!
//! The backend emits detections in slightly different shapes depending on the
//! endpoint (`personName` vs `name`, `captureTime` vs `timestamp`). Those two
//! aliases are the only tolerated variants; everything funnels through
//! [`RawDetection::normalize`] into a canonical [`DetectionEvent`] before the
//! aggregator ever sees it.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{DetectionEvent, Source, UNKNOWN_IDENTITY};

/// A backend detection payload in any accepted shape. Every field is
/// optional; normalization supplies the documented defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawDetection {
    #[serde(default, alias = "personName")]
    pub name: Option<String>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub frame: Option<i64>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub source: Option<Source>,
    #[serde(default, alias = "captureTime")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl RawDetection {
    /// Convert into a canonical [`DetectionEvent`].
    ///
    /// Missing or empty `name` becomes [`UNKNOWN_IDENTITY`], missing
    /// `confidence` becomes `0`, a missing `timestamp` falls back to
    /// `captured_at`, and a missing `source` falls back to
    /// `fallback_source` (the endpoint the payload came from).
    pub fn normalize(
        self,
        fallback_source: Option<Source>,
        captured_at: DateTime<Utc>,
    ) -> DetectionEvent {
        DetectionEvent {
            name: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| UNKNOWN_IDENTITY.to_string()),
            confidence: self.confidence.unwrap_or(0.0),
            frame: self.frame,
            thumbnail: self.thumbnail.filter(|t| !t.is_empty()),
            source: self.source.or(fallback_source),
            timestamp: self.timestamp.unwrap_or(captured_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, secs).unwrap()
    }

    #[test]
    fn test_missing_name_becomes_unknown() {
        let event = RawDetection::default().normalize(None, at(0));
        assert_eq!(event.name, "Unknown");
        assert_eq!(event.confidence, 0.0);
    }

    #[test]
    fn test_empty_name_becomes_unknown() {
        let raw = RawDetection {
            name: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(raw.normalize(None, at(0)).name, "Unknown");
    }

    #[test]
    fn test_person_name_alias_accepted() {
        let raw: RawDetection =
            serde_json::from_str(r#"{"personName": "Alice", "confidence": 88.5}"#).unwrap();
        let event = raw.normalize(None, at(0));
        assert_eq!(event.name, "Alice");
        assert_eq!(event.confidence, 88.5);
    }

    #[test]
    fn test_capture_time_alias_accepted() {
        let raw: RawDetection =
            serde_json::from_str(r#"{"name": "Bob", "captureTime": "2024-01-01T10:00:05Z"}"#)
                .unwrap();
        assert_eq!(raw.normalize(None, at(0)).timestamp, at(5));
    }

    #[test]
    fn test_missing_timestamp_uses_capture_time() {
        let raw: RawDetection = serde_json::from_str(r#"{"name": "Bob"}"#).unwrap();
        assert_eq!(raw.normalize(None, at(7)).timestamp, at(7));
    }

    #[test]
    fn test_fallback_source_applies_only_when_absent() {
        let tagged = RawDetection {
            source: Some(Source::Video),
            ..Default::default()
        };
        assert_eq!(
            tagged.normalize(Some(Source::Live), at(0)).source,
            Some(Source::Video)
        );

        let untagged = RawDetection::default();
        assert_eq!(
            untagged.normalize(Some(Source::Live), at(0)).source,
            Some(Source::Live)
        );
    }

    #[test]
    fn test_empty_thumbnail_dropped() {
        let raw = RawDetection {
            thumbnail: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(raw.normalize(None, at(0)).thumbnail, None);
    }
}
