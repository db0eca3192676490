use crate::{foundation::core::SurfaceId, grid::discover::GridNotFound};

/// Convenience result type used across Tilecast.
pub type TilecastResult<T> = Result<T, TilecastError>;

/// Top-level error taxonomy for the ingest and deploy paths.
#[derive(thiserror::Error, Debug)]
pub enum TilecastError {
    /// Malformed request or configuration, rejected before any IO.
    #[error("validation error: {0}")]
    Validation(String),

    /// Network or storage failure while downloading the source.
    #[error("fetch error: {0}")]
    Fetch(String),

    /// The external decoder failed to run or exited unsuccessfully.
    #[error("extract error: {message}")]
    Extract {
        /// Human-readable cause.
        message: String,
        /// Decoder exit code, when the process ran to completion.
        exit_code: Option<i32>,
    },

    /// Decoding succeeded but produced no usable frames.
    #[error("decoder produced no frames")]
    EmptyResult,

    /// No complete grid of empty surfaces at the anchor.
    #[error(transparent)]
    GridNotFound(#[from] GridNotFound),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TilecastError {
    /// Build a [`TilecastError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`TilecastError::Fetch`] value.
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    /// Build a [`TilecastError::Extract`] value without an exit code.
    pub fn extract(msg: impl Into<String>) -> Self {
        Self::Extract {
            message: msg.into(),
            exit_code: None,
        }
    }

    /// Build a [`TilecastError::Extract`] value for a decoder that exited with `code`.
    pub fn extract_exit(code: Option<i32>) -> Self {
        let message = match code {
            Some(code) => format!("decoder exited with code {code}"),
            None => "decoder was terminated by a signal".to_string(),
        };
        Self::Extract {
            message,
            exit_code: code,
        }
    }

    /// Message safe to show to the person who made the request.
    ///
    /// Paths, OS error text and decoder output stay in the logs.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) => format!("Invalid request: {msg}"),
            Self::Fetch(_) => "Could not download the video. Check the URL and try again.".into(),
            Self::Extract {
                exit_code: Some(code),
                ..
            } => format!("Failed to decode the video (decoder exit code {code})."),
            Self::Extract { .. } => "Failed to decode the video.".into(),
            Self::EmptyResult => "Failed to extract frames from video!".into(),
            Self::GridNotFound(nf) => nf.user_message(),
            Self::Other(_) => "Something went wrong while processing the video.".into(),
        }
    }
}

/// Failure to push to or clear a single surface.
///
/// Best-effort: sessions log these and move on to the next cell.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PushError {
    /// The surface no longer exists in the host.
    #[error("surface {0} is gone")]
    SurfaceGone(SurfaceId),

    /// The host refused the update.
    #[error("surface {surface} rejected update: {reason}")]
    Rejected {
        /// Target surface.
        surface: SurfaceId,
        /// Host-supplied reason.
        reason: String,
    },
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
