//! Directory-backed template repository.

use std::ffi::OsStr;
use std::io;
use std::path::{Path, PathBuf};

use crate::Error;

/// Serves the `.html` template files under a single directory. Identifiers
/// are plain filenames; anything with path separators or `..` is rejected
/// outright.
#[derive(Debug, Clone)]
pub struct TemplateStore {
    dir: PathBuf,
}

impl TemplateStore {
    pub fn new(dir: impl Into<PathBuf>) -> TemplateStore {
        TemplateStore { dir: dir.into() }
    }

    /// List available template filenames. An unreadable directory is treated
    /// as empty, not as an error.
    pub async fn list(&self) -> Vec<String> {
        let mut names = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.dir).await else {
            return names;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.ends_with(".html") {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    /// Fetch one template's text by identifier.
    pub async fn get(&self, id: &str) -> Result<String, Error> {
        if id.is_empty() {
            return Err(Error::MissingTemplateId);
        }
        // A bare filename only: an absolute id or one with separators would
        // make `join` escape the template directory.
        if id.contains("..") || Path::new(id).file_name() != Some(OsStr::new(id)) {
            return Err(Error::InvalidTemplateId);
        }

        match tokio::fs::read_to_string(self.dir.join(id)).await {
            Ok(html) => Ok(html),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(Error::TemplateNotFound),
            Err(e) => Err(Error::TemplateRead(e)),
        }
    }
}
