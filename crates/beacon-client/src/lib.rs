//! beacon-client — Async REST client for the recognition backend.
//!
//! Frame submission, image/video batch upload, detection history, and the
//! geolocation provider seam.

pub mod api;
pub mod client;
pub mod locate;

pub use api::{BatchResponse, FrameResponse, FrameSubmission};
pub use client::{ApiClient, ClientError};
pub use locate::{LocateError, LocateFuture, Locator, StaticLocator};
