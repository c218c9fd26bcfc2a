//! Conversion of backend pixel arrays into BGR8 frames.

use crate::error::RenderError;
use crate::frame::RawFrame;
use crate::RenderResult;

/// Channel order of a backend's output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

/// Backend sample storage.
#[derive(Debug, Clone, PartialEq)]
pub enum Samples {
    /// 8-bit samples.
    U8(Vec<u8>),

    /// Float samples, nominally in `[0, 1]`.
    F32(Vec<f32>),
}

impl Samples {
    fn len(&self) -> usize {
        match self {
            Self::U8(v) => v.len(),
            Self::F32(v) => v.len(),
        }
    }
}

/// A height x width x channels array returned by a backend.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub order: ChannelOrder,
    pub samples: Samples,
}

/// Normalize a backend array to a BGR8 [`RawFrame`].
///
/// Float samples are scaled by 255 and clipped to `[0, 255]` before
/// truncation; RGB data is channel-swapped.
pub fn normalize(output: ModelOutput) -> RenderResult<RawFrame> {
    if output.channels != 3 {
        return Err(RenderError::MalformedOutput(format!(
            "expected 3 channels, got {}",
            output.channels
        )));
    }

    let expected = RawFrame::buffer_size(output.width, output.height);
    if output.samples.len() != expected {
        return Err(RenderError::MalformedOutput(format!(
            "expected {} samples for {}x{}x3, got {}",
            expected,
            output.width,
            output.height,
            output.samples.len()
        )));
    }

    let mut data = match output.samples {
        Samples::U8(v) => v,
        Samples::F32(v) => v
            .into_iter()
            .map(|s| (s * 255.0).clamp(0.0, 255.0) as u8)
            .collect(),
    };

    if output.order == ChannelOrder::Rgb {
        for px in data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
    }

    RawFrame::try_from_bgr(output.width, output.height, data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(samples: Samples, order: ChannelOrder) -> ModelOutput {
        ModelOutput {
            width: 2,
            height: 1,
            channels: 3,
            order,
            samples,
        }
    }

    #[test]
    fn test_rgb_u8_is_swapped() {
        let frame = normalize(output(
            Samples::U8(vec![10, 20, 30, 40, 50, 60]),
            ChannelOrder::Rgb,
        ))
        .unwrap();
        assert_eq!(frame.data().as_ref(), &[30, 20, 10, 60, 50, 40]);
    }

    #[test]
    fn test_bgr_u8_passes_through() {
        let frame = normalize(output(
            Samples::U8(vec![10, 20, 30, 40, 50, 60]),
            ChannelOrder::Bgr,
        ))
        .unwrap();
        assert_eq!(frame.data().as_ref(), &[10, 20, 30, 40, 50, 60]);
    }

    #[test]
    fn test_float_is_scaled_and_clipped() {
        let frame = normalize(output(
            Samples::F32(vec![0.0, 0.5, 1.0, -0.2, 1.7, f32::NAN]),
            ChannelOrder::Bgr,
        ))
        .unwrap();
        assert_eq!(frame.data().as_ref(), &[0, 127, 255, 0, 255, 0]);
    }

    #[test]
    fn test_malformed_shapes_are_rejected() {
        let mut bad_channels = output(Samples::U8(vec![0; 8]), ChannelOrder::Rgb);
        bad_channels.channels = 4;
        assert!(matches!(
            normalize(bad_channels),
            Err(RenderError::MalformedOutput(_))
        ));

        let short = output(Samples::U8(vec![0; 5]), ChannelOrder::Rgb);
        assert!(matches!(
            normalize(short),
            Err(RenderError::MalformedOutput(_))
        ));
    }
}
