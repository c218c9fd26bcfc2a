//! Per-client command loop.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use relay_ipc::{
    decode_command, Command, PoseCommand, ProtocolError, RelayConfig, Reply, SessionEnd,
};
use relay_render::RenderDispatcher;
use relay_stream::FramePipe;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::error::ProtocolError as WsProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, instrument, warn};

use crate::inline::encode_jpeg_b64;
use crate::metrics::RelayMetrics;
use crate::EngineResult;

/// State shared by every session.
pub(crate) struct RelayContext {
    pub config: RelayConfig,
    pub dispatcher: Arc<RenderDispatcher>,
    pub pipe: Option<Arc<FramePipe>>,
    pub metrics: Arc<RelayMetrics>,
}

/// What the loop does after replying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    Continue,
    Stop,
}

impl RelayContext {
    /// Handle one text message and produce the reply.
    pub(crate) async fn handle_text(&self, text: &str) -> (Reply, Flow) {
        self.metrics.record_command();

        let command = match decode_command(text) {
            Ok(command) => command,
            Err(e) => {
                self.metrics.record_protocol_error();
                debug!(error = %e, "Rejected message");
                return (Reply::from(&e), Flow::Continue);
            }
        };

        debug!(command = command.name(), "Handling command");

        match command {
            Command::Pose(pose) => (self.handle_pose(pose).await, Flow::Continue),
            Command::Stop => (Reply::stopping(), Flow::Stop),
            Command::Ping => (Reply::pong(), Flow::Continue),
            Command::Unknown(name) => {
                self.metrics.record_protocol_error();
                (
                    Reply::from(&ProtocolError::UnknownCommand(name)),
                    Flow::Continue,
                )
            }
        }
    }

    async fn handle_pose(&self, pose: PoseCommand) -> Reply {
        let request = match pose.into_request(&self.config.defaults) {
            Ok(request) => request,
            Err(e) => {
                self.metrics.record_protocol_error();
                debug!(error = %e, "Rejected pose");
                return Reply::from(&e);
            }
        };

        let rendered = self.dispatcher.produce_frame(&request).await;
        self.metrics.record_frame(rendered.source);

        if let Some(pipe) = self.pipe.clone() {
            let frame = rendered.frame.clone();
            match tokio::task::spawn_blocking(move || pipe.push_frame(frame)).await {
                Ok(Ok(timing)) => {
                    self.metrics.record_frame_streamed();
                    debug!(pts_ms = timing.pts_ms(), sequence = timing.sequence, "Frame streamed");
                }
                Ok(Err(e)) => {
                    self.metrics.record_stream_failure();
                    warn!(error = %e, "Frame push failed");
                }
                Err(e) => {
                    self.metrics.record_stream_failure();
                    warn!(error = %e, "Frame push task failed");
                }
            }
        }

        if !self.config.send_jpeg {
            return Reply::ok();
        }

        let frame = rendered.frame;
        let quality = self.config.jpeg_quality;
        match tokio::task::spawn_blocking(move || encode_jpeg_b64(&frame, quality)).await {
            Ok(Ok(jpeg_b64)) => {
                self.metrics.record_inline_reply(jpeg_b64.len());
                Reply::ok_with_jpeg(jpeg_b64)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Inline JPEG encoding failed");
                Reply::ok()
            }
            Err(e) => {
                warn!(error = %e, "Inline JPEG task failed");
                Reply::ok()
            }
        }
    }
}

/// Run the WebSocket session for one accepted connection.
#[instrument(name = "session", skip_all, fields(%peer))]
pub(crate) async fn run_session(
    stream: TcpStream,
    peer: SocketAddr,
    context: Arc<RelayContext>,
    mut shutdown: watch::Receiver<bool>,
) -> EngineResult<SessionEnd> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let (mut sink, mut source) = ws.split();

    debug!("Session opened");

    loop {
        let message = tokio::select! {
            message = source.next() => message,
            _ = shutdown.changed() => {
                let _ = sink.send(Message::Close(None)).await;
                return Ok(SessionEnd::ServerShutdown);
            }
        };

        let text = match message {
            None | Some(Ok(Message::Close(_))) => return Ok(SessionEnd::PeerClosed),
            Some(Err(e)) => return end_on_error(e),
            Some(Ok(Message::Text(text))) => text,
            Some(Ok(Message::Binary(data))) => match std::str::from_utf8(&data) {
                Ok(text) => text.to_string(),
                Err(_) => {
                    context.metrics.record_protocol_error();
                    let reply = Reply::from(&ProtocolError::InvalidJson);
                    if let Err(e) = sink.send(Message::text(reply.to_text())).await {
                        return end_on_error(e);
                    }
                    continue;
                }
            },
            // Ping/pong are answered by the transport.
            Some(Ok(_)) => continue,
        };

        let (reply, flow) = context.handle_text(&text).await;
        // The peer may hang up while its frame renders.
        if let Err(e) = sink.send(Message::text(reply.to_text())).await {
            return end_on_error(e);
        }

        if flow == Flow::Stop {
            let _ = sink.send(Message::Close(None)).await;
            return Ok(SessionEnd::StopCommand);
        }
    }
}

/// A transport error on read or send: a hang-up ends the session quietly,
/// anything else is a fault.
fn end_on_error(err: WsError) -> EngineResult<SessionEnd> {
    if is_disconnect(&err) {
        debug!(error = %err, "Peer disconnected");
        Ok(SessionEnd::PeerClosed)
    } else {
        Err(err.into())
    }
}

fn is_disconnect(err: &WsError) -> bool {
    match err {
        WsError::ConnectionClosed | WsError::AlreadyClosed => true,
        WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake) => true,
        WsError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_ipc::{RelayStats, StreamConfig};
    use relay_stream::{FrameSink, StreamResult, TimedFrame};

    fn context(send_jpeg: bool, pipe: Option<Arc<FramePipe>>) -> RelayContext {
        let mut config = RelayConfig::default();
        config.send_jpeg = send_jpeg;
        config.defaults.width = 16;
        config.defaults.height = 8;
        RelayContext {
            config,
            dispatcher: Arc::new(RenderDispatcher::synthetic_only()),
            pipe,
            metrics: Arc::new(RelayMetrics::new()),
        }
    }

    fn stats(ctx: &RelayContext) -> RelayStats {
        ctx.metrics.snapshot()
    }

    #[tokio::test]
    async fn test_pose_replies_ok() {
        let ctx = context(false, None);
        let (reply, flow) = ctx.handle_text(r#"{"cmd":"pose","pose":{}}"#).await;
        assert_eq!(reply, Reply::ok());
        assert_eq!(flow, Flow::Continue);
        assert_eq!(stats(&ctx).synthetic_frames, 1);
    }

    #[tokio::test]
    async fn test_pose_inline_jpeg() {
        let ctx = context(true, None);
        let (reply, _) = ctx
            .handle_text(r#"{"action":"pose","params":{"frame_w":32,"frame_h":24}}"#)
            .await;
        match reply {
            Reply::Status { status, jpeg_b64 } => {
                assert_eq!(status, "ok");
                assert!(!jpeg_b64.unwrap().is_empty());
            }
            other => panic!("unexpected reply {other:?}"),
        }
        assert_eq!(stats(&ctx).inline_replies, 1);
    }

    #[tokio::test]
    async fn test_control_commands() {
        let ctx = context(false, None);
        assert_eq!(
            ctx.handle_text(r#"{"cmd":"stop"}"#).await,
            (Reply::stopping(), Flow::Stop)
        );
        assert_eq!(
            ctx.handle_text(r#"{"action":"ping"}"#).await,
            (Reply::pong(), Flow::Continue)
        );
    }

    #[tokio::test]
    async fn test_errors_keep_session_open() {
        let ctx = context(false, None);
        let cases = [
            ("not json", "invalid json"),
            ("[1,2]", "invalid json"),
            (r#"{"cmd":"unknown_x"}"#, "unknown command"),
            (r#"{"cmd":"pose","frame_w":0}"#, "invalid frame size"),
            (r#"{"cmd":"pose","frame_h":"tall"}"#, "invalid frame size"),
        ];
        for (text, message) in cases {
            let (reply, flow) = ctx.handle_text(text).await;
            assert_eq!(reply, Reply::error(message), "for {text}");
            assert_eq!(flow, Flow::Continue);
        }
        assert_eq!(stats(&ctx).protocol_errors, cases.len() as u64);
        assert_eq!(stats(&ctx).frames_rendered(), 0);
    }

    #[test]
    fn test_hang_ups_end_the_session_quietly() {
        use std::io;

        let hang_ups = [
            WsError::ConnectionClosed,
            WsError::AlreadyClosed,
            WsError::Protocol(WsProtocolError::ResetWithoutClosingHandshake),
            WsError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe")),
            WsError::Io(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
        ];
        for err in hang_ups {
            assert!(matches!(end_on_error(err), Ok(SessionEnd::PeerClosed)));
        }

        let fault = WsError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied"));
        assert!(matches!(
            end_on_error(fault),
            Err(crate::EngineError::WebSocket(_))
        ));
    }

    struct NullSink;

    impl FrameSink for NullSink {
        fn write_frame(&mut self, _frame: &TimedFrame) -> StreamResult<()> {
            Ok(())
        }

        fn finish(&mut self) -> StreamResult<()> {
            Ok(())
        }

        fn name(&self) -> &'static str {
            "null"
        }
    }

    #[tokio::test]
    async fn test_push_failures_do_not_change_reply() {
        let pipe = FramePipe::with_sink(
            StreamConfig {
                width: 16,
                height: 8,
                ..Default::default()
            },
            Box::new(NullSink),
        )
        .unwrap();
        let ctx = context(false, Some(Arc::new(pipe)));

        let (reply, _) = ctx.handle_text(r#"{"cmd":"pose"}"#).await;
        assert_eq!(reply, Reply::ok());

        // Wrong size for the pipe: still ok for the client.
        let (reply, _) = ctx
            .handle_text(r#"{"cmd":"pose","frame_w":8,"frame_h":8}"#)
            .await;
        assert_eq!(reply, Reply::ok());

        let stats = stats(&ctx);
        assert_eq!(stats.frames_streamed, 1);
        assert_eq!(stats.stream_failures, 1);
    }
}
