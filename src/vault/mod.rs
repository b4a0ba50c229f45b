//! Access to the note vault.
//!
//! The retrieval core never touches the vault directly; it goes through
//! [`VaultAccess`], which can be backed by the local filesystem
//! ([`LocalVault`]) or by any other note host.

pub mod cache;
pub mod local;

use std::future::Future;

pub use cache::{CacheState, VaultContentCache};
pub use local::LocalVault;

/// Errors reported by a vault backend.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VaultError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, VaultError::NotFound(_))
    }
}

/// Representation requested from [`VaultAccess::get_file_content`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentFormat {
    /// Note body plus file stats.
    Json,
    /// Raw note body.
    Text,
}

/// Note body and its modification time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub stat: FileStat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileStat {
    /// Epoch milliseconds.
    pub mtime: i64,
}

/// Listing and fetching collaborator.
pub trait VaultAccess: Send + Sync + 'static {
    /// List the entries of `dir` (vault-relative, `""` is the root). Entry
    /// names are relative to `dir`; directories end with `/`.
    fn list_files(&self, dir: &str) -> impl Future<Output = Result<Vec<String>, VaultError>> + Send;

    /// Fetch a note body and its stats.
    fn get_file_content(
        &self,
        path: &str,
        format: ContentFormat,
    ) -> impl Future<Output = Result<FileContent, VaultError>> + Send;
}
