//! Folder scanning: list a media folder's children and keep the images.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use walkdir::{DirEntry, WalkDir};

use crate::error::DreamError;
use crate::events::MediaEntry;
use crate::media::{self, FolderRef};

/// Source of folder listings with a declared content type per child.
pub trait DocumentProvider: Send + Sync {
    fn list_children(&self, folder: &FolderRef) -> Result<Vec<MediaEntry>, DreamError>;
}

/// Lists the direct children of a local directory.
#[derive(Debug, Default, Clone)]
pub struct FsProvider;

impl DocumentProvider for FsProvider {
    fn list_children(&self, folder: &FolderRef) -> Result<Vec<MediaEntry>, DreamError> {
        let root = folder.to_path();
        if !root.is_dir() {
            return Err(DreamError::BadFolder(root));
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&root)
            .follow_links(true)
            .min_depth(1)
            .max_depth(1)
        {
            let entry = match entry {
                Ok(entry) => entry,
                // Failing to open the root itself fails the whole listing.
                Err(err) if err.path().is_none_or(|p| p == root) => {
                    return Err(match err.into_io_error() {
                        Some(io) => DreamError::Io(io),
                        None => DreamError::BadFolder(root.clone()),
                    });
                }
                Err(err) => {
                    warn!(
                        path = ?err.path().map(Path::display),
                        error = %err,
                        "skipping unreadable folder entry"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() || is_hidden(&entry) {
                continue;
            }
            let path = entry.path();
            out.push(MediaEntry::new(path, media::declared_content_type(path)));
        }
        Ok(out)
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .is_some_and(|n| n.starts_with('.'))
}

/// Children of `folder` declared as images, in provider order.
///
/// Provider failures are logged and produce an empty list.
pub fn scan(provider: &dyn DocumentProvider, folder: &FolderRef) -> Vec<MediaEntry> {
    let children = match provider.list_children(folder) {
        Ok(children) => children,
        Err(err) => {
            warn!(folder = %folder, error = %err, "folder scan failed; treating as empty");
            return Vec::new();
        }
    };

    let total = children.len();
    let images: Vec<MediaEntry> = children
        .into_iter()
        .filter(|entry| {
            let keep = entry
                .content_type
                .as_deref()
                .is_some_and(media::is_image_type);
            if !keep {
                debug!(
                    path = %entry.path.display(),
                    content_type = entry.content_type.as_deref(),
                    "skipping non-image entry"
                );
            }
            keep
        })
        .collect();
    info!(folder = %folder, total, images = images.len(), "folder scanned");
    images
}

/// Run [`scan`] on the blocking pool.
#[instrument(skip(provider, folder), fields(folder = %folder))]
pub async fn scan_blocking(provider: Arc<dyn DocumentProvider>, folder: FolderRef) -> Vec<MediaEntry> {
    let task_folder = folder.clone();
    match tokio::task::spawn_blocking(move || scan(provider.as_ref(), &task_folder)).await {
        Ok(entries) => entries,
        Err(err) => {
            warn!(error = %err, "scan task failed; treating as empty");
            Vec::new()
        }
    }
}

/// Convenience for callers holding a plain path.
pub fn scan_path(path: &Path) -> Vec<MediaEntry> {
    scan(&FsProvider, &FolderRef::from_path(path))
}
