//! Error types for the render module.

use std::time::Duration;

use thiserror::Error;

/// Errors a single render attempt can produce.
///
/// The dispatcher absorbs all of these; they are never shown to clients.
#[derive(Debug, Error)]
pub enum RenderError {
    /// Backend is not usable (missing model directory, no model linked).
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend reported a failure.
    #[error("backend error: {0}")]
    Backend(String),

    /// Backend output has the wrong shape or size.
    #[error("malformed backend output: {0}")]
    MalformedOutput(String),

    /// Backend exceeded its time budget.
    #[error("render timed out after {0:?}")]
    Timeout(Duration),

    /// Rendered image could not be decoded.
    #[error("image decode error: {0}")]
    Image(#[from] image::ImageError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
