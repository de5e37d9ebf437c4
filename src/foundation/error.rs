use std::time::Duration;

/// Convenience result type used across splatgen.
pub type SplatgenResult<T> = Result<T, SplatgenError>;

/// Top-level error taxonomy used by pipeline APIs.
///
/// Every variant is local to one request. Gate rejection is not an error; see
/// [`crate::generate::orchestrator::Outcome`].
#[derive(thiserror::Error, Debug)]
pub enum SplatgenError {
    /// Scene bytes could not be decoded (bad header, truncated data, missing fields).
    #[error("malformed scene: {0}")]
    MalformedScene(String),

    /// Scene decoded but contains zero points.
    #[error("empty scene: vertex element has no points")]
    EmptyScene,

    /// Rasterizer produced a tensor whose layout is not one of the accepted shapes.
    #[error("unsupported raster layout: {0}")]
    UnsupportedLayout(String),

    /// The generation backend did not answer within the request timeout.
    #[error("generation backend timed out after {0:?}")]
    BackendTimeout(Duration),

    /// The generation backend failed or produced unusable output.
    #[error("generation backend failed: {0}")]
    BackendFailure(String),

    /// Writing the encoded video stream failed.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// Invalid configuration or request data.
    #[error("validation error: {0}")]
    Validation(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SplatgenError {
    /// Build a [`SplatgenError::MalformedScene`] value.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedScene(msg.into())
    }

    /// Build a [`SplatgenError::UnsupportedLayout`] value.
    pub fn layout(msg: impl Into<String>) -> Self {
        Self::UnsupportedLayout(msg.into())
    }

    /// Build a [`SplatgenError::BackendFailure`] value.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendFailure(msg.into())
    }

    /// Build a [`SplatgenError::Encoding`] value.
    pub fn encoding(msg: impl Into<String>) -> Self {
        Self::Encoding(msg.into())
    }

    /// Build a [`SplatgenError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Return `true` for failures of the external generation backend.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(self, Self::BackendTimeout(_) | Self::BackendFailure(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
