//! V4L2 webcam capture via the `v4l` crate.

use std::path::Path;

use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

use crate::frame::{self, EncodedFrame};
use crate::FrameSource;

/// Capture resolution submitted to the recognition backend.
pub const CAPTURE_WIDTH: u32 = 640;
pub const CAPTURE_HEIGHT: u32 = 480;

const BUFFER_COUNT: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera not found: {0}")]
    DeviceNotFound(String),
    #[error("camera access denied: {0}")]
    AccessDenied(String),
    #[error("camera busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("device does not support video capture")]
    StreamingNotSupported,
}

/// A UVC webcam opened on demand and polled for encoded stills.
///
/// The device handle is held only between `open()` and `close()`; a fresh
/// mmap stream is created per grab, matching the low cadence of the
/// submission loop.
pub struct UvcCamera {
    device_path: String,
    device: Option<Device>,
    width: u32,
    height: u32,
}

impl UvcCamera {
    pub fn new(device_path: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            device: None,
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
        }
    }
}

impl FrameSource for UvcCamera {
    /// Open the device and negotiate YUYV at the capture resolution.
    fn open(&mut self) -> Result<(), CameraError> {
        if self.device.is_some() {
            return Ok(());
        }
        if !Path::new(&self.device_path).exists() {
            return Err(CameraError::DeviceNotFound(self.device_path.clone()));
        }

        let device = Device::with_path(&self.device_path).map_err(|e| {
            let msg = e.to_string();
            if msg.contains("busy") || msg.contains("EBUSY") {
                CameraError::DeviceBusy
            } else if msg.contains("denied") || msg.contains("EACCES") {
                CameraError::AccessDenied(format!("{}: {e}", self.device_path))
            } else {
                CameraError::DeviceNotFound(format!("{}: {e}", self.device_path))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to query capabilities: {e}"))
        })?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;
        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = CAPTURE_WIDTH;
        fmt.height = CAPTURE_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;
        if negotiated.fourcc != FourCC::new(b"YUYV") {
            return Err(CameraError::FormatNegotiationFailed(format!(
                "device offered {:?}, need YUYV",
                negotiated.fourcc
            )));
        }

        tracing::info!(
            device = %self.device_path,
            driver = %caps.driver,
            card = %caps.card,
            width = negotiated.width,
            height = negotiated.height,
            "camera opened"
        );

        self.width = negotiated.width;
        self.height = negotiated.height;
        self.device = Some(device);
        Ok(())
    }

    /// Grab one encoded still. Returns `None` while the stream is not
    /// ready (closed device, dequeue hiccup, blank warm-up frame) so the
    /// caller can skip the tick.
    fn grab(&mut self) -> Option<EncodedFrame> {
        let device = self.device.as_ref()?;

        let mut stream = match MmapStream::with_buffers(device, BufType::VideoCapture, BUFFER_COUNT)
        {
            Ok(s) => s,
            Err(e) => {
                tracing::trace!(error = %e, "mmap stream unavailable; skipping");
                return None;
            }
        };

        let (buf, meta) = match stream.next() {
            Ok(pair) => pair,
            Err(e) => {
                tracing::trace!(error = %e, "buffer dequeue failed; skipping");
                return None;
            }
        };

        let rgb = match frame::yuyv_to_rgb(buf, self.width, self.height) {
            Ok(rgb) => rgb,
            Err(e) => {
                tracing::warn!(error = %e, seq = meta.sequence, "frame conversion failed");
                return None;
            }
        };

        if frame::is_blank_frame(&rgb) {
            tracing::trace!(seq = meta.sequence, "blank frame; stream warming up");
            return None;
        }

        match frame::encode_jpeg_data_uri(&rgb, self.width, self.height) {
            Ok(data_uri) => Some(EncodedFrame {
                data_uri,
                width: self.width,
                height: self.height,
                sequence: meta.sequence,
            }),
            Err(e) => {
                tracing::warn!(error = %e, seq = meta.sequence, "frame encode failed");
                None
            }
        }
    }

    /// Release the device. Idempotent.
    fn close(&mut self) {
        if self.device.take().is_some() {
            tracing::debug!(device = %self.device_path, "camera released");
        }
    }
}
