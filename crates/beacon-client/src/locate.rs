//! Geolocation provider seam.
//!
//! The console attaches coordinates to submissions when a provider is
//! configured. Resolution happens once per session start, is bounded by the
//! caller, and is strictly best-effort: a failing provider never blocks
//! streaming.

use std::future::Future;
use std::pin::Pin;

use beacon_core::GeoFix;
use thiserror::Error;

pub type LocateFuture<'a> = Pin<Box<dyn Future<Output = Result<GeoFix, LocateError>> + Send + 'a>>;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("location provider unavailable")]
    Unavailable,
    #[error("location lookup failed: {0}")]
    Failed(String),
}

/// Resolves the current position, or fails.
pub trait Locator: Send + Sync {
    fn resolve(&self) -> LocateFuture<'_>;
}

/// Fixed coordinates from configuration, standing in for a GPS or IP-based
/// lookup on deployments where the console location is known.
pub struct StaticLocator {
    fix: GeoFix,
}

impl StaticLocator {
    pub fn new(fix: GeoFix) -> Self {
        Self { fix }
    }
}

impl Locator for StaticLocator {
    fn resolve(&self) -> LocateFuture<'_> {
        let fix = self.fix;
        Box::pin(async move { Ok(fix) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_locator_returns_configured_fix() {
        let locator = StaticLocator::new(GeoFix {
            lat: 52.37,
            lon: 4.89,
            accuracy: Some(25.0),
        });
        let fix = locator.resolve().await.unwrap();
        assert_eq!(fix.lat, 52.37);
        assert_eq!(fix.lon, 4.89);
        assert_eq!(fix.accuracy, Some(25.0));
    }
}
