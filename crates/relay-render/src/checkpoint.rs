//! In-process checkpoint renderer.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_ipc::{CameraParams, FrameRequest, Pose};
use tracing::{debug, instrument};

use crate::error::RenderError;
use crate::frame::RawFrame;
use crate::normalize::{normalize, ModelOutput};
use crate::{RenderBackend, RenderResult};

/// A model that renders a view from a trained checkpoint.
///
/// Implementations run on the blocking thread pool and may hold arbitrary
/// internal state (loaded weights, device handles).
pub trait CheckpointModel: Send + Sync + 'static {
    /// Render a `height` x `width` view for `pose`.
    fn render(
        &self,
        checkpoint: &Path,
        pose: &Pose,
        camera: &CameraParams,
        height: u32,
        width: u32,
    ) -> RenderResult<ModelOutput>;
}

/// Backend wrapping a [`CheckpointModel`].
pub struct CheckpointBackend {
    model: Arc<dyn CheckpointModel>,
    checkpoint: Arc<PathBuf>,
    timeout: Duration,
}

impl CheckpointBackend {
    /// Backend name in logs and metrics.
    pub const NAME: &'static str = "checkpoint";

    /// Create a backend for `checkpoint` using `model`.
    pub fn new(model: Arc<dyn CheckpointModel>, checkpoint: PathBuf, timeout: Duration) -> Self {
        Self {
            model,
            checkpoint: Arc::new(checkpoint),
            timeout,
        }
    }
}

#[async_trait]
impl RenderBackend for CheckpointBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    /// If the dispatcher's budget expires first, the blocking call keeps
    /// running to completion and its result is dropped.
    #[instrument(
        name = "checkpoint_render",
        skip_all,
        fields(width = request.width, height = request.height)
    )]
    async fn render(&self, request: &FrameRequest) -> RenderResult<RawFrame> {
        let model = Arc::clone(&self.model);
        let checkpoint = Arc::clone(&self.checkpoint);
        let request = request.clone();

        let output = tokio::task::spawn_blocking(move || {
            model.render(
                &checkpoint,
                &request.pose,
                &request.camera,
                request.height,
                request.width,
            )
        })
        .await
        .map_err(|e| RenderError::Backend(format!("checkpoint render task failed: {e}")))??;

        debug!(
            width = output.width,
            height = output.height,
            order = ?output.order,
            "Checkpoint model returned frame"
        );
        normalize(output)
    }
}
