//! WebSocket accept loop.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use relay_ipc::{RelayConfig, RelayStats, SessionEnd};
use relay_render::RenderDispatcher;
use relay_stream::FramePipe;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::error::EngineError;
use crate::metrics::RelayMetrics;
use crate::session::{run_session, RelayContext};
use crate::EngineResult;

/// How long open sessions get to wind down after shutdown is signalled.
const SESSION_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Accepts WebSocket clients and runs one session task per connection.
pub struct SessionServer {
    listener: TcpListener,
    context: Arc<RelayContext>,
}

impl SessionServer {
    /// Bind the listening socket.
    #[instrument(name = "server_bind", skip_all, fields(addr = %config.bind_addr()))]
    pub async fn bind(
        config: RelayConfig,
        dispatcher: Arc<RenderDispatcher>,
        pipe: Option<Arc<FramePipe>>,
    ) -> EngineResult<Self> {
        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| EngineError::Bind {
                addr: addr.clone(),
                source,
            })?;

        info!(
            addr = %listener.local_addr()?,
            streaming = pipe.is_some(),
            inline_jpeg = config.send_jpeg,
            backends = ?dispatcher.backend_names(),
            "Relay listening"
        );

        Ok(Self {
            listener,
            context: Arc::new(RelayContext {
                config,
                dispatcher,
                pipe,
                metrics: Arc::new(RelayMetrics::new()),
            }),
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> EngineResult<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Shared relay counters.
    pub fn metrics(&self) -> Arc<RelayMetrics> {
        Arc::clone(&self.context.metrics)
    }

    /// Serve clients until `shutdown` completes.
    ///
    /// On shutdown the frame pipe is stopped first, then the listening socket
    /// is closed and open sessions are told to end.
    pub async fn run<F>(self, shutdown: F) -> EngineResult<RelayStats>
    where
        F: Future<Output = ()>,
    {
        let Self { listener, context } = self;
        let (session_shutdown_tx, session_shutdown_rx) = watch::channel(false);
        let mut sessions = JoinSet::new();

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested");
                    break;
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    session_finished(&context.metrics, joined);
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        context.metrics.record_session_opened();
                        let session = run_session(
                            stream,
                            peer,
                            Arc::clone(&context),
                            session_shutdown_rx.clone(),
                        );
                        sessions.spawn(async move { (peer, session.await) });
                    }
                    Err(e) => warn!(error = %e, "Accept failed"),
                },
            }
        }

        if let Some(pipe) = context.pipe.clone() {
            if let Err(e) = tokio::task::spawn_blocking(move || pipe.stop()).await {
                error!(error = %e, "Frame pipe stop task failed");
            }
        }

        drop(listener);
        let _ = session_shutdown_tx.send(true);

        let drained = tokio::time::timeout(SESSION_DRAIN_TIMEOUT, async {
            while let Some(joined) = sessions.join_next().await {
                session_finished(&context.metrics, joined);
            }
        })
        .await;
        if drained.is_err() {
            warn!(remaining = sessions.len(), "Sessions did not close in time; aborting");
            sessions.abort_all();
            while let Some(joined) = sessions.join_next().await {
                session_finished(&context.metrics, joined);
            }
        }

        let stats = context.metrics.snapshot();
        info!(
            uptime_secs = context.metrics.uptime().as_secs(),
            sessions = stats.sessions_opened,
            commands = stats.commands,
            protocol_errors = stats.protocol_errors,
            frames_rendered = stats.frames_rendered(),
            synthetic_frames = stats.synthetic_frames,
            frames_streamed = stats.frames_streamed,
            stream_failures = stats.stream_failures,
            inline_replies = stats.inline_replies,
            "Relay stopped"
        );

        Ok(stats)
    }
}

/// Account for a finished session task. Panics and aborts count as closed
/// sessions too.
fn session_finished(
    metrics: &RelayMetrics,
    joined: Result<(SocketAddr, EngineResult<SessionEnd>), JoinError>,
) -> SessionEnd {
    let (peer, end) = match joined {
        Ok((peer, Ok(end))) => (Some(peer), end),
        Ok((peer, Err(e))) => (
            Some(peer),
            SessionEnd::Fault {
                message: e.to_string(),
            },
        ),
        Err(e) if e.is_panic() => (
            None,
            SessionEnd::Fault {
                message: panic_message(e.into_panic()),
            },
        ),
        Err(_) => (None, SessionEnd::ServerShutdown),
    };

    metrics.record_session_closed();

    let peer = peer.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string());
    if end.is_fault() {
        error!(%peer, reason = %end.message(), "Session ended");
    } else {
        info!(%peer, reason = %end.message(), "Session ended");
    }
    debug!(stats = ?metrics.snapshot(), "Relay counters");

    end
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
