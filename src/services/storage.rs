use crate::utils::validation::sanitize_filename;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// The local data directory fetched files are written into.
///
/// Every transfer gets its own sub-directory, so two relays of the same file
/// never share a path while the stored file keeps its provider title.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Creates a fresh transfer directory and returns the path the file
    /// should be written to.
    pub async fn allocate(&self, title: &str, extension: &str) -> io::Result<PathBuf> {
        let dir = self.root.join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&dir).await?;
        let name = sanitize_filename(&format!("{}{}", title, extension));
        Ok(dir.join(name))
    }

    /// Removes a stored file together with its transfer directory.
    pub async fn release(&self, path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(dir) if dir != self.root && dir.starts_with(&self.root) => {
                tokio::fs::remove_dir_all(dir).await
            }
            _ => match tokio::fs::remove_file(path).await {
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        }
    }
}
