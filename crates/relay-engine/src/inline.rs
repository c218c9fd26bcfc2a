//! Inline JPEG replies.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use relay_render::RawFrame;

use crate::EngineResult;

/// Encode a frame as a base64 JPEG. Channels are reordered to RGB first.
pub fn encode_jpeg_b64(frame: &RawFrame, quality: u8) -> EngineResult<String> {
    let rgb = frame.to_rgb();
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, quality.clamp(1, 100)).encode(
        &rgb,
        frame.width(),
        frame.height(),
        ExtendedColorType::Rgb8,
    )?;
    Ok(STANDARD.encode(jpeg))
}
