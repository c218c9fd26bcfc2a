//! Relay configuration, resolved once at startup.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{CameraParams, Pose};
use crate::MAX_FRAME_DIMENSION;

/// Top-level relay configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    pub bind_host: String,

    /// Port the WebSocket listener binds to (0 = auto-assign).
    pub bind_port: u16,

    /// Reply to `pose` with an inline JPEG of the frame.
    pub send_jpeg: bool,

    /// JPEG quality for inline replies (1-100).
    pub jpeg_quality: u8,

    /// Values used when a `pose` command omits fields.
    pub defaults: SessionDefaults,

    /// RTP/UDP streaming (None = streaming disabled).
    pub stream: Option<StreamConfig>,

    /// Render backend selection.
    pub render: RenderConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            bind_port: 9001,
            send_jpeg: false,
            jpeg_quality: 78,
            defaults: SessionDefaults::default(),
            stream: Some(StreamConfig::default()),
            render: RenderConfig::default(),
        }
    }
}

impl RelayConfig {
    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let (width, height) = (self.defaults.width, self.defaults.height);
        if width == 0 || height == 0 || width > MAX_FRAME_DIMENSION || height > MAX_FRAME_DIMENSION
        {
            return Err(ConfigError::FrameSize { width, height });
        }

        if !(1..=100).contains(&self.jpeg_quality) {
            return Err(ConfigError::JpegQuality(self.jpeg_quality));
        }

        if let Some(ref stream) = self.stream {
            stream.validate()?;
        }

        self.render.validate()
    }

    /// `host:port` the listener binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.bind_host, self.bind_port)
    }
}

/// Per-session defaults for `pose` commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionDefaults {
    /// Default frame width.
    pub width: u32,

    /// Default frame height.
    pub height: u32,

    /// Default pose (null).
    pub pose: Pose,

    /// Default camera parameters (empty object).
    pub camera: CameraParams,
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            pose: Pose::default(),
            camera: CameraParams::default(),
        }
    }
}

/// Configuration of the RTP/UDP stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// UDP sink host.
    pub udp_host: String,

    /// UDP sink port.
    pub udp_port: u16,

    /// Stream width in pixels.
    pub width: u32,

    /// Stream height in pixels.
    pub height: u32,

    /// Stream frame rate.
    pub fps: u32,

    /// Video bitrate in kbps (default: 3000).
    pub bitrate_kbps: u32,

    /// Frames buffered between callers and the encoder.
    pub queue_capacity: usize,

    /// How long a push may wait for queue space, in milliseconds.
    pub push_timeout_ms: u64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            udp_host: "127.0.0.1".to_string(),
            udp_port: 5000,
            width: 640,
            height: 480,
            fps: 24,
            bitrate_kbps: 3000,
            queue_capacity: 8,
            push_timeout_ms: 2000,
        }
    }
}

impl StreamConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::FrameSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.fps == 0 {
            return Err(ConfigError::ZeroFps);
        }
        if self.udp_host.trim().is_empty() {
            return Err(ConfigError::EmptySinkHost);
        }
        if self.push_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("stream push"));
        }
        Ok(())
    }

    /// Push timeout as a duration.
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

/// Render backend selection and backend-specific settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderConfig {
    /// Try the in-process checkpoint renderer first.
    pub use_checkpoint: bool,

    /// Checkpoint file for the in-process renderer.
    pub checkpoint_path: PathBuf,

    /// Time budget for one in-process render, in milliseconds.
    pub checkpoint_timeout_ms: u64,

    /// Try the external render CLI.
    pub use_render_cli: bool,

    /// Render CLI executable.
    pub render_cli_program: String,

    /// Model/config directory passed to the render CLI.
    pub model_dir: PathBuf,

    /// Directory for render CLI output files.
    pub render_tmp_dir: PathBuf,

    /// Time budget for one render CLI invocation, in milliseconds.
    pub render_cli_timeout_ms: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            use_checkpoint: false,
            checkpoint_path: PathBuf::from("/workspace/zip_ckpt.pth"),
            checkpoint_timeout_ms: 10_000,
            use_render_cli: false,
            render_cli_program: "ns-render".to_string(),
            model_dir: PathBuf::from("/workspace/model"),
            render_tmp_dir: std::env::temp_dir(),
            render_cli_timeout_ms: 30_000,
        }
    }
}

impl RenderConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.checkpoint_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("checkpoint render"));
        }
        if self.render_cli_timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout("render CLI"));
        }
        Ok(())
    }

    /// Checkpoint render budget.
    pub fn checkpoint_timeout(&self) -> Duration {
        Duration::from_millis(self.checkpoint_timeout_ms)
    }

    /// Render CLI budget.
    pub fn render_cli_timeout(&self) -> Duration {
        Duration::from_millis(self.render_cli_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.bind_addr(), "0.0.0.0:9001");
        assert_eq!(config.jpeg_quality, 78);
    }

    #[test]
    fn test_validation_catches_bad_values() {
        let mut config = RelayConfig::default();
        config.defaults.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::FrameSize { .. })
        ));

        let mut config = RelayConfig::default();
        if let Some(ref mut stream) = config.stream {
            stream.fps = 0;
        }
        assert_eq!(config.validate(), Err(ConfigError::ZeroFps));

        let mut config = RelayConfig::default();
        config.render.render_cli_timeout_ms = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("render CLI"))
        );

        let mut config = RelayConfig::default();
        config.jpeg_quality = 0;
        assert_eq!(config.validate(), Err(ConfigError::JpegQuality(0)));
    }

    #[test]
    fn test_streaming_can_be_disabled() {
        let config = RelayConfig {
            stream: None,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }
}
