//! Render backends with ordered fallback.
//!
//! A [`RenderDispatcher`] owns an ordered list of [`RenderBackend`]s and asks
//! each in turn for a frame, falling back to the [`SyntheticRenderer`] so a
//! frame is always produced.

mod checkpoint;
mod cli;
mod dispatcher;
mod error;
mod frame;
mod normalize;
mod synthetic;

pub use checkpoint::{CheckpointBackend, CheckpointModel};
pub use cli::RenderCliBackend;
pub use dispatcher::{FrameSource, RenderDispatcher, RenderedFrame};
pub use error::RenderError;
pub use frame::{PixelFormat, RawFrame};
pub use normalize::{normalize, ChannelOrder, ModelOutput, Samples};
pub use synthetic::SyntheticRenderer;

use std::time::Duration;

use async_trait::async_trait;
use relay_ipc::FrameRequest;

/// Result type for render operations.
pub type RenderResult<T> = Result<T, RenderError>;

/// Trait for frame-producing backends.
#[async_trait]
pub trait RenderBackend: Send + Sync {
    /// Backend name for logs and metrics.
    fn name(&self) -> &'static str;

    /// Time budget for a single render.
    fn timeout(&self) -> Duration;

    /// Render one frame. The result must already be BGR8 at the requested
    /// size.
    async fn render(&self, request: &FrameRequest) -> RenderResult<RawFrame>;
}
