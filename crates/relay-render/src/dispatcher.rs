//! Ordered backend dispatch with synthetic fallback.

use std::sync::Arc;

use relay_ipc::{FrameRequest, RenderConfig};
use tracing::{debug, info, instrument, warn};

use crate::checkpoint::{CheckpointBackend, CheckpointModel};
use crate::cli::RenderCliBackend;
use crate::error::RenderError;
use crate::frame::RawFrame;
use crate::synthetic::SyntheticRenderer;
use crate::RenderBackend;

/// Where a frame came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameSource {
    /// Named backend.
    Backend(&'static str),

    /// Synthetic fallback.
    Synthetic,
}

impl FrameSource {
    /// Source name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Backend(name) => name,
            Self::Synthetic => SyntheticRenderer::NAME,
        }
    }
}

/// A frame plus its source.
#[derive(Debug, Clone)]
pub struct RenderedFrame {
    pub frame: RawFrame,
    pub source: FrameSource,
}

/// Tries backends in priority order; the first success wins.
pub struct RenderDispatcher {
    backends: Vec<Arc<dyn RenderBackend>>,
}

impl RenderDispatcher {
    /// Create a dispatcher over `backends`, highest priority first.
    pub fn new(backends: Vec<Arc<dyn RenderBackend>>) -> Self {
        Self { backends }
    }

    /// Dispatcher that always produces synthetic frames.
    pub fn synthetic_only() -> Self {
        Self::new(Vec::new())
    }

    /// Build the backend chain from configuration.
    ///
    /// Availability is probed once here: the checkpoint backend needs a linked
    /// model and an existing checkpoint file, the render CLI needs its model
    /// directory. Unavailable backends are left out of the chain.
    pub fn from_config(
        config: &RenderConfig,
        checkpoint_model: Option<Arc<dyn CheckpointModel>>,
    ) -> Self {
        let mut backends: Vec<Arc<dyn RenderBackend>> = Vec::new();

        if config.use_checkpoint {
            match checkpoint_model {
                Some(model) if config.checkpoint_path.exists() => {
                    info!(
                        checkpoint = %config.checkpoint_path.display(),
                        "Checkpoint renderer enabled"
                    );
                    backends.push(Arc::new(CheckpointBackend::new(
                        model,
                        config.checkpoint_path.clone(),
                        config.checkpoint_timeout(),
                    )));
                }
                Some(_) => warn!(
                    checkpoint = %config.checkpoint_path.display(),
                    "Checkpoint file not found; checkpoint renderer disabled"
                ),
                None => {
                    warn!("No in-process checkpoint model available; checkpoint renderer disabled")
                }
            }
        }

        if config.use_render_cli {
            if config.model_dir.is_dir() {
                info!(
                    program = %config.render_cli_program,
                    model_dir = %config.model_dir.display(),
                    "Render CLI enabled"
                );
                backends.push(Arc::new(RenderCliBackend::new(
                    config.render_cli_program.clone(),
                    config.model_dir.clone(),
                    config.render_tmp_dir.clone(),
                    config.render_cli_timeout(),
                )));
            } else {
                warn!(
                    model_dir = %config.model_dir.display(),
                    "Model directory not found; render CLI disabled"
                );
            }
        }

        if backends.is_empty() {
            info!("No render backends enabled; serving synthetic frames");
        }

        Self::new(backends)
    }

    /// Names of the enabled backends, in priority order.
    pub fn backend_names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    /// Produce a frame for `request`. Never fails.
    ///
    /// Each backend runs under its own timeout; errors, timeouts and frames
    /// of the wrong size are logged and the next backend is tried.
    #[instrument(
        name = "produce_frame",
        skip_all,
        fields(width = request.width, height = request.height)
    )]
    pub async fn produce_frame(&self, request: &FrameRequest) -> RenderedFrame {
        for backend in &self.backends {
            let name = backend.name();
            let budget = backend.timeout();

            let result = match tokio::time::timeout(budget, backend.render(request)).await {
                Ok(result) => result,
                Err(_) => Err(RenderError::Timeout(budget)),
            };

            match result {
                Ok(frame) if frame.dimensions() == (request.width, request.height) => {
                    debug!(backend = name, "Frame rendered");
                    return RenderedFrame {
                        frame,
                        source: FrameSource::Backend(name),
                    };
                }
                Ok(frame) => warn!(
                    backend = name,
                    got_width = frame.width(),
                    got_height = frame.height(),
                    "Backend returned wrong frame size; falling back"
                ),
                Err(e) => warn!(backend = name, error = %e, "Render failed; falling back"),
            }
        }

        RenderedFrame {
            frame: SyntheticRenderer::generate(request.width, request.height),
            source: FrameSource::Synthetic,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use relay_ipc::{CameraParams, Pose};

    use super::*;
    use crate::normalize::{ChannelOrder, ModelOutput, Samples};
    use crate::RenderResult;

    enum Behavior {
        Fail,
        Hang,
        WrongSize,
        Solid(u8),
    }

    struct FakeBackend {
        name: &'static str,
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeBackend {
        fn new(name: &'static str, behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                name,
                behavior,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl RenderBackend for FakeBackend {
        fn name(&self) -> &'static str {
            self.name
        }

        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }

        async fn render(&self, request: &FrameRequest) -> RenderResult<RawFrame> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Fail => Err(RenderError::Backend("boom".into())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Err(RenderError::Backend("unreachable".into()))
                }
                Behavior::WrongSize => Ok(SyntheticRenderer::generate(1, 1)),
                Behavior::Solid(v) => Ok(RawFrame::from_bgr(
                    request.width,
                    request.height,
                    vec![v; request.frame_len()],
                )),
            }
        }
    }

    fn request() -> FrameRequest {
        FrameRequest::new(Pose::default(), CameraParams::default(), 8, 6).unwrap()
    }

    #[tokio::test]
    async fn test_no_backends_yields_synthetic() {
        let dispatcher = RenderDispatcher::synthetic_only();
        let rendered = dispatcher.produce_frame(&request()).await;
        assert_eq!(rendered.source, FrameSource::Synthetic);
        assert_eq!(rendered.frame, SyntheticRenderer::generate(8, 6));
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let first = FakeBackend::new("first", Behavior::Solid(1));
        let second = FakeBackend::new("second", Behavior::Solid(2));
        let dispatcher = RenderDispatcher::new(vec![first.clone(), second.clone()]);

        let rendered = dispatcher.produce_frame(&request()).await;
        assert_eq!(rendered.source, FrameSource::Backend("first"));
        assert!(rendered.frame.data().iter().all(|&b| b == 1));
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failures_fall_through_in_order() {
        let failing = FakeBackend::new("failing", Behavior::Fail);
        let hanging = FakeBackend::new("hanging", Behavior::Hang);
        let wrong = FakeBackend::new("wrong", Behavior::WrongSize);
        let good = FakeBackend::new("good", Behavior::Solid(9));
        let dispatcher = RenderDispatcher::new(vec![
            failing.clone(),
            hanging.clone(),
            wrong.clone(),
            good.clone(),
        ]);

        let rendered = dispatcher.produce_frame(&request()).await;
        assert_eq!(rendered.source, FrameSource::Backend("good"));
        for backend in [&failing, &hanging, &wrong, &good] {
            assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test]
    async fn test_all_failing_still_returns_valid_frame() {
        let dispatcher = RenderDispatcher::new(vec![
            FakeBackend::new("a", Behavior::Fail),
            FakeBackend::new("b", Behavior::Hang),
            FakeBackend::new("c", Behavior::WrongSize),
        ]);

        for (w, h) in [(1, 1), (5, 3), (64, 48)] {
            let req = FrameRequest::new(Pose::default(), CameraParams::default(), w, h).unwrap();
            let rendered = dispatcher.produce_frame(&req).await;
            assert_eq!(rendered.source.name(), "synthetic");
            assert_eq!(rendered.frame.dimensions(), (w, h));
            assert_eq!(rendered.frame.data().len(), req.frame_len());
        }
    }

    struct BlueModel;

    impl CheckpointModel for BlueModel {
        fn render(
            &self,
            _checkpoint: &Path,
            _pose: &Pose,
            _camera: &CameraParams,
            height: u32,
            width: u32,
        ) -> RenderResult<ModelOutput> {
            let mut samples = Vec::new();
            for _ in 0..width * height {
                samples.extend_from_slice(&[0, 0, 255]);
            }
            Ok(ModelOutput {
                width,
                height,
                channels: 3,
                order: ChannelOrder::Rgb,
                samples: Samples::U8(samples),
            })
        }
    }

    #[tokio::test]
    async fn test_from_config_probes_availability() {
        let tmp = tempfile::tempdir().unwrap();
        let checkpoint = tmp.path().join("model.ckpt");
        std::fs::write(&checkpoint, b"weights").unwrap();

        let mut config = RenderConfig {
            use_checkpoint: true,
            checkpoint_path: checkpoint,
            use_render_cli: true,
            model_dir: tmp.path().join("missing"),
            ..Default::default()
        };

        // No linked model, missing model dir: nothing enabled.
        let dispatcher = RenderDispatcher::from_config(&config, None);
        assert!(dispatcher.backend_names().is_empty());

        config.model_dir = tmp.path().to_path_buf();
        let dispatcher = RenderDispatcher::from_config(&config, Some(Arc::new(BlueModel)));
        assert_eq!(
            dispatcher.backend_names(),
            vec![CheckpointBackend::NAME, RenderCliBackend::NAME]
        );

        let rendered = dispatcher.produce_frame(&request()).await;
        assert_eq!(rendered.source, FrameSource::Backend(CheckpointBackend::NAME));
        // RGB blue normalized to BGR.
        assert_eq!(&rendered.frame.data()[0..3], &[255, 0, 0]);
    }
}
