//! beacon-core — Detection data model and match aggregation.
//!
//! Canonical detection/match types, tolerant normalization of backend
//! payload shapes, and the pure per-identity merge the console's view
//! state is built from.

pub mod aggregate;
pub mod normalize;
pub mod types;

pub use aggregate::merge;
pub use normalize::RawDetection;
pub use types::{DetectionEvent, GeoFix, MatchRecord, Source, UNKNOWN_IDENTITY};
