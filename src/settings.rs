//! Namespaced key-value preferences persisted as a JSON file.

use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::DreamError;
use crate::media::FolderRef;

pub const SELECTED_FOLDER_KEY: &str = "selected_folder_uri";
pub const LOCK_ENROLLED_KEY: &str = "lock_admin_active";

type Namespaces = BTreeMap<String, BTreeMap<String, String>>;

#[derive(Debug, Clone)]
pub struct Preferences {
    path: PathBuf,
    namespace: String,
    data: Namespaces,
}

impl Preferences {
    /// Open the store at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, namespace: impl Into<String>) -> Result<Self, DreamError> {
        let path = path.into();
        let data = match fs::read_to_string(&path) {
            Ok(s) if s.trim().is_empty() => Namespaces::new(),
            Ok(s) => serde_json::from_str(&s)?,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "preferences file missing; starting empty");
                Namespaces::new()
            }
            Err(err) => return Err(err.into()),
        };
        Ok(Self {
            path,
            namespace: namespace.into(),
            data,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.data
            .get(&self.namespace)
            .and_then(|ns| ns.get(key))
            .map(String::as_str)
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.data
            .entry(self.namespace.clone())
            .or_default()
            .insert(key.to_string(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.data.get_mut(&self.namespace)?.remove(key)
    }

    /// Write the store back to disk via a sibling temp file and rename.
    pub fn save(&self) -> Result<(), DreamError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        let body = serde_json::to_string_pretty(&self.data)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), "preferences saved");
        Ok(())
    }

    pub fn selected_folder(&self) -> Option<FolderRef> {
        self.get(SELECTED_FOLDER_KEY).and_then(FolderRef::parse)
    }

    pub fn set_selected_folder(&mut self, folder: &FolderRef) {
        self.set(SELECTED_FOLDER_KEY, folder.as_str());
    }

    pub fn lock_enrolled(&self) -> bool {
        self.get(LOCK_ENROLLED_KEY) == Some("true")
    }

    pub fn set_lock_enrolled(&mut self, enrolled: bool) {
        if enrolled {
            self.set(LOCK_ENROLLED_KEY, "true");
        } else {
            self.remove(LOCK_ENROLLED_KEY);
        }
    }
}
