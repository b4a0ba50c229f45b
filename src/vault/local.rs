//! Filesystem-backed vault.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::{ContentFormat, FileContent, FileStat, VaultAccess, VaultError};
use crate::semantic::paths::normalize_path;

/// Vault rooted at a local directory. Symlinks are listed as plain entries
/// and never followed into.
#[derive(Debug, Clone)]
pub struct LocalVault {
    root: PathBuf,
}

impl LocalVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Vault-relative path to an absolute one. `..` cannot climb out of the
    /// root.
    fn absolute(&self, relative: &str) -> PathBuf {
        let normalized = normalize_path(relative);
        if normalized.is_empty() {
            self.root.clone()
        } else {
            self.root.join(normalized)
        }
    }
}

fn map_io(path: &str, err: std::io::Error) -> VaultError {
    if err.kind() == ErrorKind::NotFound {
        VaultError::NotFound(path.to_string())
    } else {
        VaultError::Io(err)
    }
}

fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

impl VaultAccess for LocalVault {
    async fn list_files(&self, dir: &str) -> Result<Vec<String>, VaultError> {
        let path = self.absolute(dir);
        let mut reader = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| map_io(dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader.next_entry().await.map_err(|e| map_io(dir, e))? {
            let name = entry.file_name().to_string_lossy().to_string();
            // file_type() does not traverse symlinks
            let file_type = entry.file_type().await.map_err(|e| map_io(dir, e))?;
            if file_type.is_dir() {
                entries.push(format!("{name}/"));
            } else {
                entries.push(name);
            }
        }

        entries.sort();
        Ok(entries)
    }

    async fn get_file_content(
        &self,
        path: &str,
        _format: ContentFormat,
    ) -> Result<FileContent, VaultError> {
        let absolute = self.absolute(path);
        let meta = tokio::fs::symlink_metadata(&absolute)
            .await
            .map_err(|e| map_io(path, e))?;
        if !meta.is_file() {
            return Err(VaultError::NotFound(path.to_string()));
        }

        let content = tokio::fs::read_to_string(&absolute)
            .await
            .map_err(|e| map_io(path, e))?;

        Ok(FileContent {
            content,
            stat: FileStat {
                mtime: mtime_millis(&meta),
            },
        })
    }
}
