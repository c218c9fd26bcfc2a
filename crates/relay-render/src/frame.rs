//! Raw frame types.

use bytes::Bytes;

use crate::error::RenderError;
use crate::RenderResult;

/// Pixel layout of a [`RawFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Packed 8-bit blue, green, red.
    Bgr8,
}

impl PixelFormat {
    /// Bytes per pixel.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr8 => 3,
        }
    }

    /// Name understood by the encoder (`-pix_fmt`).
    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Bgr8 => "bgr24",
        }
    }
}

/// An uncompressed BGR8 frame.
///
/// The buffer length always equals `width * height * 3`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    data: Bytes,
    width: u32,
    height: u32,
}

impl RawFrame {
    /// Calculate the BGR8 buffer size for given dimensions.
    pub fn buffer_size(width: u32, height: u32) -> usize {
        width as usize * height as usize * PixelFormat::Bgr8.bytes_per_pixel()
    }

    /// Wrap a BGR8 buffer.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the dimensions; producing
    /// such a buffer is a bug in the caller.
    pub fn from_bgr(width: u32, height: u32, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        assert_eq!(
            data.len(),
            Self::buffer_size(width, height),
            "BGR8 buffer length does not match {width}x{height}"
        );
        Self {
            data,
            width,
            height,
        }
    }

    /// Wrap a BGR8 buffer coming from a backend, reporting a size mismatch
    /// as malformed output.
    pub fn try_from_bgr(width: u32, height: u32, data: impl Into<Bytes>) -> RenderResult<Self> {
        let data = data.into();
        let expected = Self::buffer_size(width, height);
        if data.len() != expected {
            return Err(RenderError::MalformedOutput(format!(
                "expected {expected} bytes ({width}x{height} BGR8), got {}",
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// `(width, height)`.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Pixel layout (always BGR8).
    pub fn pixel_format(&self) -> PixelFormat {
        PixelFormat::Bgr8
    }

    /// Pixel bytes.
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// Copy the pixels out in RGB order, for display encoders.
    pub fn to_rgb(&self) -> Vec<u8> {
        let mut rgb = self.data.to_vec();
        for px in rgb.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        rgb
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_size() {
        assert_eq!(RawFrame::buffer_size(640, 480), 640 * 480 * 3);
        assert_eq!(RawFrame::buffer_size(1, 1), 3);
    }

    #[test]
    fn test_try_from_bgr_rejects_wrong_length() {
        assert!(RawFrame::try_from_bgr(2, 2, vec![0u8; 12]).is_ok());
        assert!(matches!(
            RawFrame::try_from_bgr(2, 2, vec![0u8; 11]),
            Err(RenderError::MalformedOutput(_))
        ));
    }

    #[test]
    #[should_panic(expected = "does not match")]
    fn test_from_bgr_panics_on_wrong_length() {
        let _ = RawFrame::from_bgr(2, 2, vec![0u8; 5]);
    }

    #[test]
    fn test_to_rgb_swaps_channels() {
        let frame = RawFrame::from_bgr(2, 1, vec![1u8, 2, 3, 4, 5, 6]);
        assert_eq!(frame.to_rgb(), vec![3, 2, 1, 6, 5, 4]);
        assert_eq!(frame.dimensions(), (2, 1));
        assert_eq!(frame.pixel_format(), PixelFormat::Bgr8);
    }
}
