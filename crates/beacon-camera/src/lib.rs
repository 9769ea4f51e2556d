//! beacon-camera — Hardware abstraction for live frame capture.
//!
//! Provides the [`FrameSource`] seam the capture loop polls, a V4L2 UVC
//! webcam implementation, and encoding helpers for submitted stills.

pub mod camera;
pub mod frame;

pub use camera::{CameraError, UvcCamera, CAPTURE_HEIGHT, CAPTURE_WIDTH};
pub use frame::EncodedFrame;

/// A live frame source the capture loop can poll.
pub trait FrameSource: Send + 'static {
    /// Acquire the underlying stream. Called once per session start.
    fn open(&mut self) -> Result<(), CameraError>;

    /// Grab one encoded still. `None` means no frame is available yet;
    /// the caller skips the tick rather than treating it as an error.
    fn grab(&mut self) -> Option<EncodedFrame>;

    /// Release the stream. Must be idempotent.
    fn close(&mut self);
}
