//! Deterministic procedural frames.

use crate::frame::RawFrame;

/// Gradient generator used when no backend produces a frame.
///
/// Blue ramps left to right, green ramps top to bottom, and red is their sum
/// modulo 256. Output depends only on the dimensions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyntheticRenderer;

impl SyntheticRenderer {
    /// Backend name reported for synthetic frames.
    pub const NAME: &'static str = "synthetic";

    /// Generate a `width` x `height` BGR8 gradient.
    pub fn generate(width: u32, height: u32) -> RawFrame {
        let columns: Vec<u8> = (0..width).map(|x| ramp(x, width)).collect();
        let mut data = Vec::with_capacity(RawFrame::buffer_size(width, height));

        for y in 0..height {
            let g = ramp(y, height);
            for &b in &columns {
                data.extend_from_slice(&[b, g, b.wrapping_add(g)]);
            }
        }

        RawFrame::from_bgr(width, height, data)
    }
}

/// Evenly spaced values from 0 to 255 over `n` samples, truncated.
fn ramp(i: u32, n: u32) -> u8 {
    if n <= 1 {
        return 0;
    }
    (u64::from(i) * 255 / u64::from(n - 1)) as u8
}
