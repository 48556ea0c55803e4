//! Error types for the icon engine.
//!
//! Every fallible operation inside the crate returns [`IconError`]. The public
//! [`crate::IconEngine`] façade never lets one of these reach the caller: it
//! logs the error and degrades to a fallback value instead.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for icon resolution.
#[derive(Debug, Error)]
pub enum IconError {
    // Referent errors
    #[error("Referent not found: {0}")]
    ReferentNotFound(String),

    #[error("No extraction strategy could produce an icon for {referent}")]
    ExtractionUnsupported { referent: String },

    // Cache errors
    #[error("Icon cache at {path:?} is corrupted: {message}")]
    CacheCorrupted { path: PathBuf, message: String },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Decoding errors
    #[error("Image error: {message}")]
    Image {
        message: String,
        #[source]
        source: Option<image::ImageError>,
    },

    #[error("Invalid {format} data: {message}")]
    InvalidFormat {
        format: &'static str,
        message: String,
    },

    // Composition errors
    #[error("Grid dimension must be 2 or 3, got {0}")]
    InvalidGridDimension(u32),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for icon engine operations.
pub type Result<T> = std::result::Result<T, IconError>;

impl From<std::io::Error> for IconError {
    fn from(err: std::io::Error) -> Self {
        IconError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for IconError {
    fn from(err: serde_json::Error) -> Self {
        IconError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<image::ImageError> for IconError {
    fn from(err: image::ImageError) -> Self {
        IconError::Image {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl IconError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        IconError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Shorthand for a malformed-input error.
    pub(crate) fn invalid(format: &'static str, message: impl Into<String>) -> Self {
        IconError::InvalidFormat {
            format,
            message: message.into(),
        }
    }

    /// Whether the error means the referent itself is gone.
    pub fn is_not_found(&self) -> bool {
        match self {
            IconError::ReferentNotFound(_) => true,
            IconError::Io {
                source: Some(err), ..
            } => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = IconError::ExtractionUnsupported {
            referent: "C:\\Apps\\tool.exe".into(),
        };
        assert_eq!(
            err.to_string(),
            "No extraction strategy could produce an icon for C:\\Apps\\tool.exe"
        );
        assert_eq!(
            IconError::InvalidGridDimension(4).to_string(),
            "Grid dimension must be 2 or 3, got 4"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert!(IconError::io_with_path(io, "/tmp/x").is_not_found());
        assert!(IconError::ReferentNotFound("x".into()).is_not_found());
        assert!(!IconError::InvalidGridDimension(4).is_not_found());
    }
}
