//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;
use relay_ipc::{RelayConfig, RenderConfig, SessionDefaults, StreamConfig};

#[derive(Parser, Debug)]
#[command(name = "pose-relay")]
#[command(
    about = "Render frames for camera poses received over WebSocket and stream them over RTP"
)]
pub struct Args {
    /// Address to bind the WebSocket server to
    #[arg(long, env = "WS_BIND_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// WebSocket port
    #[arg(long, env = "WS_PORT", default_value_t = 9001)]
    pub port: u16,

    /// Destination host for the RTP/UDP stream
    #[arg(long, env = "RELAY_UDP_HOST", default_value = "127.0.0.1")]
    pub udp_host: String,

    /// Destination port for the RTP/UDP stream
    #[arg(long, env = "RELAY_UDP_PORT", default_value_t = 5000)]
    pub udp_port: u16,

    /// Disable RTP streaming
    #[arg(long, env = "RELAY_NO_STREAM")]
    pub no_stream: bool,

    /// Frame width (session default and stream size)
    #[arg(long, default_value_t = 640)]
    pub width: u32,

    /// Frame height (session default and stream size)
    #[arg(long, default_value_t = 480)]
    pub height: u32,

    /// Stream frame rate
    #[arg(long, default_value_t = 24)]
    pub fps: u32,

    /// H.264 bitrate in kbit/s
    #[arg(long, default_value_t = 3000)]
    pub bitrate_kbps: u32,

    /// Reply to pose commands with a base64 JPEG of the frame
    #[arg(long, env = "RELAY_SEND_JPEG")]
    pub send_jpeg_ws: bool,

    /// JPEG quality for inline replies
    #[arg(long, default_value_t = 78, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub jpeg_quality: u8,

    /// Render frames with the external render CLI
    #[arg(long)]
    pub use_render_cli: bool,

    /// Render CLI program
    #[arg(long, default_value = "ns-render")]
    pub render_cli: String,

    /// Model directory passed to the render CLI
    #[arg(long, default_value = "/workspace/model")]
    pub model_dir: PathBuf,

    /// Scratch directory for render CLI output (defaults to the OS temp dir)
    #[arg(long)]
    pub render_tmp_dir: Option<PathBuf>,

    /// Render CLI time budget in seconds
    #[arg(long, default_value_t = 30)]
    pub render_timeout_secs: u64,

    /// Render frames with the in-process checkpoint model
    #[arg(long)]
    pub use_checkpoint: bool,

    /// Checkpoint file for the in-process model
    #[arg(long, default_value = "/workspace/zip_ckpt.pth")]
    pub checkpoint: PathBuf,

    /// Checkpoint render time budget in seconds
    #[arg(long, default_value_t = 10)]
    pub checkpoint_timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

impl Args {
    /// Resolve the relay configuration.
    pub fn to_config(&self) -> RelayConfig {
        let stream = (!self.no_stream).then(|| StreamConfig {
            udp_host: self.udp_host.clone(),
            udp_port: self.udp_port,
            width: self.width,
            height: self.height,
            fps: self.fps,
            bitrate_kbps: self.bitrate_kbps,
            ..Default::default()
        });

        RelayConfig {
            bind_host: self.host.clone(),
            bind_port: self.port,
            send_jpeg: self.send_jpeg_ws,
            jpeg_quality: self.jpeg_quality,
            defaults: SessionDefaults {
                width: self.width,
                height: self.height,
                ..Default::default()
            },
            stream,
            render: RenderConfig {
                use_checkpoint: self.use_checkpoint,
                checkpoint_path: self.checkpoint.clone(),
                checkpoint_timeout_ms: self.checkpoint_timeout_secs.saturating_mul(1000),
                use_render_cli: self.use_render_cli,
                render_cli_program: self.render_cli.clone(),
                model_dir: self.model_dir.clone(),
                render_tmp_dir: self
                    .render_tmp_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                render_cli_timeout_ms: self.render_timeout_secs.saturating_mul(1000),
            },
        }
    }
}
