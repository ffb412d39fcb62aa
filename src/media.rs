//! Content-type classification for media folder entries.

use std::ffi::OsStr;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use image::ImageFormat;

use crate::events::MediaEntry;

pub const IMAGE_PREFIX: &str = "image/";
pub const GIF_CONTENT_TYPE: &str = "image/gif";

/// Content type providers report when they know nothing about a file.
const OPAQUE_CONTENT_TYPE: &str = "application/octet-stream";

const SNIFF_LEN: usize = 64;

/// Serialized handle to the user's media folder.
///
/// Accepts plain paths and `file://` URIs; the stored form is preserved
/// verbatim so it round-trips through the preference store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderRef(String);

impl FolderRef {
    pub fn parse(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == "file://" {
            return None;
        }
        Some(Self(trimmed.to_string()))
    }

    pub fn from_path(path: &Path) -> Self {
        Self(path.to_string_lossy().into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(self.0.strip_prefix("file://").unwrap_or(&self.0))
    }
}

impl fmt::Display for FolderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[must_use]
pub fn content_type_for_extension(path: &Path) -> Option<&'static str> {
    let ext = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)?;
    let mime = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => GIF_CONTENT_TYPE,
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "ico" => "image/x-icon",
        "txt" | "log" => "text/plain",
        "md" => "text/markdown",
        _ => return None,
    };
    Some(mime)
}

/// Identify an image by its magic bytes, ignoring the file name.
pub fn sniff_content_type(path: &Path) -> Option<&'static str> {
    let mut header = [0u8; SNIFF_LEN];
    let mut file = File::open(path).ok()?;
    let mut filled = 0;
    while filled < SNIFF_LEN {
        match file.read(&mut header[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(_) => return None,
        }
    }
    let format = image::guess_format(&header[..filled]).ok()?;
    content_type_for_format(format)
}

fn content_type_for_format(format: ImageFormat) -> Option<&'static str> {
    let mime = match format {
        ImageFormat::Jpeg => "image/jpeg",
        ImageFormat::Png => "image/png",
        ImageFormat::Gif => GIF_CONTENT_TYPE,
        ImageFormat::WebP => "image/webp",
        ImageFormat::Bmp => "image/bmp",
        ImageFormat::Tiff => "image/tiff",
        ImageFormat::Ico => "image/x-icon",
        _ => return None,
    };
    Some(mime)
}

/// Content type a provider declares for `path`: sniffed first, then by extension.
pub fn declared_content_type(path: &Path) -> Option<&'static str> {
    sniff_content_type(path).or_else(|| content_type_for_extension(path))
}

pub fn is_image_type(content_type: &str) -> bool {
    content_type
        .get(..IMAGE_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(IMAGE_PREFIX))
}

/// A declared type that actually says something about the file.
fn known_content_type(entry: &MediaEntry) -> Option<&str> {
    entry
        .content_type
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case(OPAQUE_CONTENT_TYPE))
}

/// GIF detection: a known declared type wins; the `.gif` suffix is the fallback.
#[must_use]
pub fn is_gif(entry: &MediaEntry) -> bool {
    match known_content_type(entry) {
        Some(t) => t.eq_ignore_ascii_case(GIF_CONTENT_TYPE),
        None => entry
            .path
            .extension()
            .and_then(OsStr::to_str)
            .is_some_and(|e| e.eq_ignore_ascii_case("gif")),
    }
}
