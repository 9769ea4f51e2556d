//! Wire shapes for the recognition backend.

use beacon_core::RawDetection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One captured frame submitted for live matching.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FrameSubmission {
    /// Encoded still as a `data:image/jpeg;base64,...` URI.
    pub frame: String,
    /// Monotonic frame identifier (wall-clock epoch millis at capture).
    pub frame_number: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

/// Backend verdict for a single submitted frame.
#[derive(Debug, Clone, Deserialize)]
pub struct FrameResponse {
    pub matched: bool,
    #[serde(default)]
    pub face_data: Option<RawDetection>,
}

/// Backend response for image/video batch uploads. Zero matches means
/// "no match", not an error.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub matches: Vec<RawDetection>,
}
