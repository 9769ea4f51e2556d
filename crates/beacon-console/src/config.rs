use std::time::Duration;

use beacon_core::GeoFix;

use crate::live::{DEFAULT_INFLIGHT_LIMIT, TICK_INTERVAL};

/// Console configuration, loaded from environment variables.
pub struct Config {
    /// Base URL of the recognition backend.
    pub api_url: String,
    /// V4L2 device path (default: /dev/video0).
    pub camera_device: String,
    /// Capture loop cadence.
    pub tick: Duration,
    /// Cap on concurrent in-flight frame submissions.
    pub inflight_limit: usize,
    /// Coordinates attached to submissions; location attachment is enabled
    /// iff both BEACON_LAT and BEACON_LON are set.
    pub location: Option<GeoFix>,
}

impl Config {
    /// Load configuration from `BEACON_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let location = match (env_f64("BEACON_LAT"), env_f64("BEACON_LON")) {
            (Some(lat), Some(lon)) => Some(GeoFix {
                lat,
                lon,
                accuracy: env_f64("BEACON_ACCURACY"),
            }),
            _ => None,
        };

        Self {
            api_url: std::env::var("BEACON_API_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:5000".to_string()),
            camera_device: std::env::var("BEACON_CAMERA_DEVICE")
                .unwrap_or_else(|_| "/dev/video0".to_string()),
            tick: Duration::from_millis(
                env_u64("BEACON_TICK_MS", TICK_INTERVAL.as_millis() as u64).max(1),
            ),
            inflight_limit: env_usize("BEACON_INFLIGHT_LIMIT", DEFAULT_INFLIGHT_LIMIT),
            location,
        }
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_f64(key: &str) -> Option<f64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
