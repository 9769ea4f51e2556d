//! Encoded frame type and image helpers — YUYV conversion, blank-frame
//! detection, JPEG data-URI encoding.

use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder};

/// JPEG quality for submitted stills. The backend re-decodes frames for
/// detection, so moderate compression is enough.
const JPEG_QUALITY: u8 = 80;

/// Variance floor below which a frame counts as blank (sensor still
/// warming up, shutter closed, or no signal yet).
const BLANK_VARIANCE_FLOOR: f32 = 4.0;

/// A captured still, encoded and ready to submit.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// `data:image/jpeg;base64,...` payload.
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
    /// Driver-reported buffer sequence number.
    pub sequence: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("jpeg encode failed: {0}")]
    Encode(#[from] image::ImageError),
}

/// Convert packed YUYV (4:2:2) to RGB24 using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; each pair shares
/// one chroma sample.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for group in yuyv[..expected].chunks_exact(4) {
        let u = group[1] as f32 - 128.0;
        let v = group[3] as f32 - 128.0;
        for &y in [group[0], group[2]].iter() {
            let c = 1.164 * (y as f32 - 16.0);
            rgb.push((c + 1.596 * v).clamp(0.0, 255.0) as u8);
            rgb.push((c - 0.392 * u - 0.813 * v).clamp(0.0, 255.0) as u8);
            rgb.push((c + 2.017 * u).clamp(0.0, 255.0) as u8);
        }
    }
    Ok(rgb)
}

/// Check whether an RGB frame is blank (near-zero spread across pixels).
///
/// Samples the green channel only; a warming-up sensor emits uniform
/// output on all channels.
pub fn is_blank_frame(rgb: &[u8]) -> bool {
    let greens: Vec<f32> = rgb.iter().skip(1).step_by(3).map(|&g| g as f32).collect();
    if greens.is_empty() {
        return true;
    }
    let n = greens.len() as f32;
    let mean = greens.iter().sum::<f32>() / n;
    let variance = greens.iter().map(|g| (g - mean).powi(2)).sum::<f32>() / n;
    variance < BLANK_VARIANCE_FLOOR
}

/// Encode an RGB24 buffer as a JPEG `data:` URI.
pub fn encode_jpeg_data_uri(rgb: &[u8], width: u32, height: u32) -> Result<String, FrameError> {
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, JPEG_QUALITY).write_image(
        rgb,
        width,
        height,
        ExtendedColorType::Rgb8,
    )?;
    Ok(format!(
        "data:image/jpeg;base64,{}",
        BASE64_STANDARD.encode(&jpeg)
    ))
}
