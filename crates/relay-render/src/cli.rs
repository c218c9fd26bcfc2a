//! External render CLI backend (`ns-render` style).
//!
//! Each request writes the pose/camera to a JSON file, runs the tool with an
//! output image path, then reads the image back as BGR8. File names carry the
//! process id and a per-backend sequence number so concurrent requests never
//! share a path.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use relay_ipc::FrameRequest;
use tokio::process::Command;
use tracing::{debug, instrument};

use crate::error::RenderError;
use crate::frame::RawFrame;
use crate::normalize::{normalize, ChannelOrder, ModelOutput, Samples};
use crate::{RenderBackend, RenderResult};

/// Backend that shells out to a render CLI.
pub struct RenderCliBackend {
    program: String,
    model_dir: PathBuf,
    tmp_dir: PathBuf,
    timeout: Duration,
    sequence: AtomicU64,
}

impl RenderCliBackend {
    /// Backend name in logs and metrics.
    pub const NAME: &'static str = "render-cli";

    /// Create a backend invoking `program` against `model_dir`.
    pub fn new(
        program: impl Into<String>,
        model_dir: impl Into<PathBuf>,
        tmp_dir: impl Into<PathBuf>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            model_dir: model_dir.into(),
            tmp_dir: tmp_dir.into(),
            timeout,
            sequence: AtomicU64::new(0),
        }
    }

    fn scratch_paths(&self) -> ScratchFiles {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        let stem = format!("pose-relay-{}-{}", std::process::id(), seq);
        ScratchFiles {
            image: self.tmp_dir.join(format!("{stem}.png")),
            camera: self.tmp_dir.join(format!("{stem}.json")),
        }
    }
}

/// Per-request scratch files, removed when dropped (including on timeout).
struct ScratchFiles {
    image: PathBuf,
    camera: PathBuf,
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.image);
        let _ = std::fs::remove_file(&self.camera);
    }
}

#[async_trait]
impl RenderBackend for RenderCliBackend {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    #[instrument(
        name = "render_cli",
        skip_all,
        fields(width = request.width, height = request.height)
    )]
    async fn render(&self, request: &FrameRequest) -> RenderResult<RawFrame> {
        if !self.model_dir.is_dir() {
            return Err(RenderError::Unavailable(format!(
                "model directory '{}' does not exist",
                self.model_dir.display()
            )));
        }

        let scratch = self.scratch_paths();
        let camera_json = serde_json::json!({
            "pose": request.pose,
            "camera": request.camera,
            "width": request.width,
            "height": request.height,
        });
        tokio::fs::write(&scratch.camera, camera_json.to_string()).await?;

        let width = request.width.to_string();
        let height = request.height.to_string();
        let mut cmd = Command::new(&self.program);
        cmd.arg("--load-config")
            .arg(&self.model_dir)
            .arg("--outfile")
            .arg(&scratch.image)
            .arg("--camera-path")
            .arg(&scratch.camera)
            .args(["--width", &width, "--height", &height])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program = %self.program, outfile = %scratch.image.display(), "Invoking render CLI");

        let output = cmd.output().await.map_err(|e| {
            RenderError::Backend(format!("failed to run '{}': {e}", self.program))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(RenderError::Backend(format!(
                "'{}' exited with status {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let image_path = scratch.image.clone();
        let output = tokio::task::spawn_blocking(move || read_rgb_image(&image_path))
            .await
            .map_err(|e| RenderError::Backend(format!("image read task failed: {e}")))??;

        if (output.width, output.height) != (request.width, request.height) {
            return Err(RenderError::MalformedOutput(format!(
                "render CLI produced {}x{}, expected {}x{}",
                output.width, output.height, request.width, request.height
            )));
        }

        normalize(output)
    }
}

fn read_rgb_image(path: &Path) -> RenderResult<ModelOutput> {
    let image = image::open(path)?.to_rgb8();
    let (width, height) = image.dimensions();
    Ok(ModelOutput {
        width,
        height,
        channels: 3,
        order: ChannelOrder::Rgb,
        samples: Samples::U8(image.into_raw()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_ipc::{CameraParams, Pose};

    fn request(width: u32, height: u32) -> FrameRequest {
        FrameRequest::new(Pose::default(), CameraParams::default(), width, height).unwrap()
    }

    #[tokio::test]
    async fn test_missing_model_dir_is_unavailable() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = RenderCliBackend::new(
            "ns-render",
            tmp.path().join("no-such-model"),
            tmp.path(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            backend.render(&request(4, 4)).await,
            Err(RenderError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_program_is_backend_error() {
        let tmp = tempfile::tempdir().unwrap();
        let backend = RenderCliBackend::new(
            "pose-relay-no-such-renderer",
            tmp.path(),
            tmp.path(),
            Duration::from_secs(1),
        );
        assert!(matches!(
            backend.render(&request(4, 4)).await,
            Err(RenderError::Backend(_))
        ));
        // Scratch files are cleaned up.
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().starts_with("pose-relay-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_scratch_paths_are_unique() {
        let backend = RenderCliBackend::new("ns-render", "/m", "/tmp", Duration::from_secs(1));
        let a = backend.scratch_paths();
        let b = backend.scratch_paths();
        assert_ne!(a.image, b.image);
        assert_ne!(a.camera, b.camera);
        assert_eq!(a.image.extension().unwrap(), "png");
    }

    #[test]
    fn test_read_rgb_image_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("frame.png");
        let img = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        img.save(&path).unwrap();

        let output = read_rgb_image(&path).unwrap();
        assert_eq!((output.width, output.height), (3, 2));

        let frame = normalize(output).unwrap();
        assert_eq!(&frame.data()[0..3], &[30, 20, 10]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_script_renderer_end_to_end() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let fixture = tmp.path().join("fixture.png");
        image::RgbImage::from_pixel(4, 2, image::Rgb([200, 100, 50]))
            .save(&fixture)
            .unwrap();

        // Fake renderer: copies the fixture to the --outfile argument.
        let script = tmp.path().join("fake-render.sh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\nwhile [ $# -gt 0 ]; do\n  if [ \"$1\" = \"--outfile\" ]; then cp '{}' \"$2\"; fi\n  shift\ndone\n",
                fixture.display()
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let backend = RenderCliBackend::new(
            script.to_string_lossy(),
            tmp.path(),
            tmp.path(),
            Duration::from_secs(5),
        );

        let frame = backend.render(&request(4, 2)).await.unwrap();
        assert_eq!(frame.dimensions(), (4, 2));
        assert_eq!(&frame.data()[0..3], &[50, 100, 200]);

        // Wrong size is malformed output.
        assert!(matches!(
            backend.render(&request(8, 8)).await,
            Err(RenderError::MalformedOutput(_))
        ));
    }
}
