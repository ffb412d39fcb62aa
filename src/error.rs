use std::path::PathBuf;

use thiserror::Error;

/// Library error type for dream-frame operations.
#[derive(Debug, Error)]
pub enum DreamError {
    /// The folder reference does not point at a readable directory.
    #[error("invalid media folder: {0}")]
    BadFolder(PathBuf),

    /// The selected entry could not be decoded into a drawable.
    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    /// A decode produced no frames at all.
    #[error("{0} contains no frames")]
    NoFrames(PathBuf),

    /// The display surface rejected a frame.
    #[error("surface error: {0}")]
    Surface(String),

    /// Underlying IO error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Preference file could not be parsed.
    #[error(transparent)]
    Preferences(#[from] serde_json::Error),
}
