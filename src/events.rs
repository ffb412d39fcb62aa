use std::path::PathBuf;

/// One file discovered in the media folder, with the content type its
/// provider declared for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaEntry {
    pub path: PathBuf,
    pub content_type: Option<String>,
}

impl MediaEntry {
    pub fn new(path: impl Into<PathBuf>, content_type: Option<&str>) -> Self {
        Self {
            path: path.into(),
            content_type: content_type.map(str::to_string),
        }
    }
}

/// Why an activation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    NoFolder,
    EmptyFolder,
    AlreadyLocked,
    StaticDwellElapsed,
    GifFallbackElapsed,
    AnimationCompleted,
    SafetyTimeout,
    DecodeFailed,
    DisplayFailed,
    /// Torn down by the host before the session could finish; no lock attempted.
    Interrupted,
}

impl SessionEnd {
    /// Whether this ending goes through the lock action.
    pub fn locks(self) -> bool {
        !matches!(self, Self::AlreadyLocked | Self::Interrupted)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub displayed: Option<MediaEntry>,
    pub end: SessionEnd,
}
