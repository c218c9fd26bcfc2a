//! Pose relay server.
//!
//! Accepts camera-pose commands over WebSocket, renders a frame per command
//! and streams it as H.264 over RTP/UDP, optionally replying with the frame
//! as an inline JPEG.

mod cli;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use relay_engine::SessionServer;
use relay_render::RenderDispatcher;
use relay_stream::FramePipe;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::Args;

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "pose_relay={level},relay_engine={level},relay_render={level},relay_stream={level}"
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.debug);

    let config = args.to_config();
    config.validate().context("invalid configuration")?;
    debug!(?config, "Configuration resolved");

    info!("Pose relay starting");

    // Streaming is optional: without a pipe, inline replies still work.
    let pipe = match config.stream.clone() {
        Some(stream) => match FramePipe::start(stream) {
            Ok(pipe) => Some(Arc::new(pipe)),
            Err(e) => {
                warn!(error = %e, "RTP streaming disabled");
                None
            }
        },
        None => {
            info!("RTP streaming disabled by configuration");
            None
        }
    };

    // No in-process checkpoint model is linked into this binary.
    let dispatcher = Arc::new(RenderDispatcher::from_config(&config.render, None));

    let server = SessionServer::bind(config, dispatcher, pipe)
        .await
        .context("failed to start WebSocket server")?;

    let stats = server
        .run(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("Interrupt received"),
                Err(e) => {
                    warn!(error = %e, "Failed to listen for interrupt; running until killed");
                    std::future::pending::<()>().await;
                }
            }
        })
        .await?;

    info!(
        sessions = stats.sessions_opened,
        frames = stats.frames_rendered(),
        "Pose relay stopped"
    );
    Ok(())
}
