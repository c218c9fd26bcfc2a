//! Replies sent from the relay to a client.

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// A reply envelope.
///
/// Serializes to `{"status": ...}` (optionally with `jpeg_b64`) or to
/// `{"error": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Reply {
    /// Command succeeded.
    Status {
        status: String,

        /// Base64-encoded JPEG of the rendered frame, in inline mode.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        jpeg_b64: Option<String>,
    },

    /// Command failed.
    Error { error: String },
}

impl Reply {
    /// Bare acknowledgement.
    pub fn ok() -> Self {
        Self::status("ok")
    }

    /// Acknowledgement carrying an inline still image.
    pub fn ok_with_jpeg(jpeg_b64: String) -> Self {
        Self::Status {
            status: "ok".to_string(),
            jpeg_b64: Some(jpeg_b64),
        }
    }

    /// Reply to `stop`.
    pub fn stopping() -> Self {
        Self::status("stopping")
    }

    /// Reply to `ping`.
    pub fn pong() -> Self {
        Self::status("pong")
    }

    /// Error reply.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            error: message.into(),
        }
    }

    fn status(status: &str) -> Self {
        Self::Status {
            status: status.to_string(),
            jpeg_b64: None,
        }
    }

    /// Encode as a JSON text message.
    pub fn to_text(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"error":"internal error"}"#.to_string())
    }
}

impl From<&ProtocolError> for Reply {
    fn from(err: &ProtocolError) -> Self {
        Self::error(err.reply_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_wire_format() {
        assert_eq!(Reply::ok().to_text(), r#"{"status":"ok"}"#);
        assert_eq!(Reply::stopping().to_text(), r#"{"status":"stopping"}"#);
        assert_eq!(
            Reply::ok_with_jpeg("AAAA".to_string()).to_text(),
            r#"{"status":"ok","jpeg_b64":"AAAA"}"#
        );
        assert_eq!(
            Reply::from(&ProtocolError::UnknownCommand("x".into())).to_text(),
            r#"{"error":"unknown command"}"#
        );
        assert_eq!(
            Reply::from(&ProtocolError::InvalidJson).to_text(),
            r#"{"error":"invalid json"}"#
        );
    }

    #[test]
    fn test_reply_parses_back() {
        let reply: Reply = serde_json::from_str(r#"{"status":"ok","jpeg_b64":"QQ=="}"#).unwrap();
        assert_eq!(reply, Reply::ok_with_jpeg("QQ==".to_string()));

        let reply: Reply = serde_json::from_str(r#"{"error":"invalid json"}"#).unwrap();
        assert_eq!(reply, Reply::error("invalid json"));
    }
}
