//! In-memory note content cache feeding the lexical tier.
//!
//! The cache walks the vault through [`VaultAccess`] and keeps a
//! `path -> CacheEntry` map. Entries are inserted as they are fetched, so
//! readers see a partial corpus while a build is running.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use super::{ContentFormat, VaultAccess, VaultError};
use crate::search::DocumentSource;
use crate::semantic::lexical::LexicalDoc;
use crate::semantic::paths::{normalize_dir, normalize_path, resolve_unique};
use crate::types::CacheEntry;

/// Directories nested deeper than this are not listed.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheState {
    Idle,
    Building,
    Ready,
}

/// Summary of one completed build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildReport {
    pub files_cached: usize,
    pub failures: usize,
    pub dirs_listed: usize,
    pub revisits: usize,
}

/// Holds the `Building` state for the duration of one build. Dropping it
/// without [`BuildGuard::finish`] restores the state held before the build.
struct BuildGuard<'a> {
    state: &'a Mutex<CacheState>,
    prior: CacheState,
    finished: bool,
}

impl<'a> BuildGuard<'a> {
    /// `None` when a build is already running.
    fn acquire(state: &'a Mutex<CacheState>) -> Option<Self> {
        let mut current = state.lock().unwrap_or_else(|e| e.into_inner());
        if *current == CacheState::Building {
            return None;
        }
        let prior = *current;
        *current = CacheState::Building;

        Some(Self {
            state,
            prior,
            finished: false,
        })
    }

    fn finish(mut self) {
        self.finished = true;
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = CacheState::Ready;
    }
}

impl Drop for BuildGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            *self.state.lock().unwrap_or_else(|e| e.into_inner()) = self.prior;
        }
    }
}

pub struct VaultContentCache<V> {
    vault: Arc<V>,
    note_extension: String,
    skip_hidden: bool,
    state: Mutex<CacheState>,
    entries: RwLock<BTreeMap<String, Arc<CacheEntry>>>,
}

impl<V: VaultAccess> VaultContentCache<V> {
    /// `note_extension` is matched case-insensitively, with or without the
    /// leading dot.
    pub fn new(vault: Arc<V>, note_extension: &str, skip_hidden: bool) -> Self {
        Self {
            vault,
            note_extension: note_extension.trim_start_matches('.').to_lowercase(),
            skip_hidden,
            state: Mutex::new(CacheState::Idle),
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn state(&self) -> CacheState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_ready(&self) -> bool {
        self.state() == CacheState::Ready
    }

    pub fn is_building(&self) -> bool {
        self.state() == CacheState::Building
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the current map.
    pub fn get_cache(&self) -> BTreeMap<String, Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn get_entry(&self, path: &str) -> Option<Arc<CacheEntry>> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&normalize_path(path))
            .cloned()
    }

    pub fn remove_entry(&self, path: &str) -> Option<Arc<CacheEntry>> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&normalize_path(path))
    }

    fn insert(&self, path: String, entry: CacheEntry) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(path, Arc::new(entry));
    }

    fn is_note(&self, name: &str) -> bool {
        name.rsplit_once('.')
            .is_some_and(|(stem, ext)| !stem.is_empty() && ext.to_lowercase() == self.note_extension)
    }

    fn is_hidden(&self, name: &str) -> bool {
        let first = name.split('/').next().unwrap_or(name);
        self.skip_hidden && first.starts_with('.') && first != "." && first != ".."
    }

    /// Re-fetch one note. Returns `Ok(false)` when the note no longer exists
    /// and its entry was dropped. The cache state is left untouched.
    pub async fn refresh_entry(&self, path: &str) -> Result<bool, VaultError> {
        let key = normalize_path(path);
        match self.vault.get_file_content(&key, ContentFormat::Json).await {
            Ok(file) => {
                self.insert(
                    key,
                    CacheEntry {
                        content: file.content,
                        mtime: file.stat.mtime,
                    },
                );
                Ok(true)
            }
            Err(e) if e.is_not_found() => {
                log::debug!("cache refresh: path={key} gone, dropping entry");
                self.remove_entry(&key);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Walk the vault and (re)populate the cache.
    ///
    /// Returns `None` without doing anything when a build is already running.
    /// The state becomes `Ready` only after the whole traversal. A failed
    /// root listing, a cancelled build or a panic restores the state held
    /// before the build: `Idle` on first build, `Ready` on a rebuild.
    pub async fn build_cache(&self) -> Option<BuildReport> {
        let Some(guard) = BuildGuard::acquire(&self.state) else {
            log::debug!("cache build already running, skipping");
            return None;
        };

        log::info!("cache build started");
        let started = std::time::Instant::now();

        let mut report = BuildReport::default();
        let mut visited: HashSet<String> = HashSet::new();
        let mut seen_files: HashSet<String> = HashSet::new();
        let mut failed_dirs: Vec<String> = Vec::new();
        let mut pending: Vec<String> = vec![String::new()];

        while let Some(dir) = pending.pop() {
            if !visited.insert(dir.clone()) {
                log::warn!("cache build: directory revisited, skipping dir={dir:?}");
                report.revisits += 1;
                continue;
            }

            let depth = dir.matches('/').count();
            if depth > MAX_DEPTH {
                log::warn!("cache build: directory too deep, skipping dir={dir:?}");
                continue;
            }

            let entries = match self.vault.list_files(&dir).await {
                Ok(entries) => entries,
                Err(e) if dir.is_empty() => {
                    log::error!("cache build: root listing failed: {e}");
                    return Some(report);
                }
                Err(e) if e.is_not_found() => {
                    log::debug!("cache build: directory vanished dir={dir:?}");
                    continue;
                }
                Err(e) => {
                    log::warn!("cache build: listing failed dir={dir:?}: {e}");
                    failed_dirs.push(dir);
                    continue;
                }
            };
            report.dirs_listed += 1;

            let mut subdirs = Vec::new();
            for entry in entries {
                let name = entry.trim_start_matches('/');
                if name.is_empty() || self.is_hidden(name) {
                    continue;
                }

                if name.ends_with('/') {
                    subdirs.push(normalize_dir(&format!("{dir}{name}")));
                    continue;
                }
                if !self.is_note(name) {
                    continue;
                }

                let path = normalize_path(&format!("{dir}{name}"));
                if !seen_files.insert(path.clone()) {
                    continue;
                }

                match self.vault.get_file_content(&path, ContentFormat::Json).await {
                    Ok(file) => {
                        self.insert(
                            path,
                            CacheEntry {
                                content: file.content,
                                mtime: file.stat.mtime,
                            },
                        );
                        report.files_cached += 1;
                    }
                    Err(e) => {
                        log::warn!("cache build: fetch failed path={path:?}: {e}");
                        report.failures += 1;
                    }
                }
            }

            // keep listing order: the stack pops from the back
            pending.extend(subdirs.into_iter().rev());
        }

        self.prune(&seen_files, &failed_dirs);
        guard.finish();

        log::info!(
            "cache build finished: files={} failures={} dirs={} revisits={} took_ms={}",
            report.files_cached,
            report.failures,
            report.dirs_listed,
            report.revisits,
            started.elapsed().as_millis()
        );

        Some(report)
    }

    /// Drop entries not seen in the last pass, except under directories that
    /// could not be listed.
    fn prune(&self, seen: &HashSet<String>, failed_dirs: &[String]) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|path, _| {
            seen.contains(path) || failed_dirs.iter().any(|dir| path.starts_with(dir.as_str()))
        });
        let pruned = before - entries.len();
        if pruned > 0 {
            log::debug!("cache build: pruned {pruned} stale entries");
        }
    }
}

impl<V: VaultAccess> DocumentSource for VaultContentCache<V> {
    fn documents(&self) -> Vec<LexicalDoc> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|(path, entry)| LexicalDoc::new(path.clone(), entry.content.clone()))
            .collect()
    }

    fn resolve(&self, path: &str) -> Option<(String, String)> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = entries.get(&normalize_path(path)) {
            return Some((normalize_path(path), entry.content.clone()));
        }

        let keys: Vec<&String> = entries.keys().collect();
        let key = resolve_unique(&keys, |k| k.as_str(), path)?;
        entries
            .get(*key)
            .map(|entry| ((*key).clone(), entry.content.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::support::FakeVault;

    fn cache(vault: FakeVault) -> VaultContentCache<FakeVault> {
        VaultContentCache::new(Arc::new(vault), "md", true)
    }

    #[tokio::test]
    async fn test_build_caches_notes_recursively() {
        let vault = FakeVault::new()
            .dir("", &["a.md", "sub/", "image.png", ".hidden.md", ".obsidian/"])
            .dir("sub/", &["b.MD", "deeper/"])
            .dir("sub/deeper/", &["c.md"])
            .file("a.md", "alpha")
            .file("sub/b.MD", "beta")
            .file("sub/deeper/c.md", "gamma")
            .file(".hidden.md", "secret");
        let cache = cache(vault);

        assert_eq!(cache.state(), CacheState::Idle);
        let report = cache.build_cache().await.unwrap();

        assert!(cache.is_ready());
        assert_eq!(report.files_cached, 3);
        assert_eq!(report.dirs_listed, 3);
        let keys: Vec<String> = cache.get_cache().keys().cloned().collect();
        assert_eq!(keys, vec!["a.md", "sub/b.MD", "sub/deeper/c.md"]);
        assert_eq!(cache.get_entry("./sub/deeper/c.md").unwrap().content, "gamma");
    }

    #[tokio::test]
    async fn test_file_failures_do_not_block_ready() {
        let vault = FakeVault::new()
            .dir("", &["ok.md", "broken.md"])
            .file("ok.md", "fine")
            .failing_file("broken.md");
        let cache = cache(vault);

        let report = cache.build_cache().await.unwrap();
        assert!(cache.is_ready());
        assert_eq!(report.files_cached, 1);
        assert_eq!(report.failures, 1);
        assert!(cache.get_entry("broken.md").is_none());
    }

    #[tokio::test]
    async fn test_root_listing_failure_never_ready() {
        let vault = FakeVault::new().failing_dir("");
        let cache = cache(vault);

        cache.build_cache().await;
        assert!(!cache.is_ready());
        assert!(!cache.is_building());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_subtree_listing_failure_is_skipped() {
        let vault = FakeVault::new()
            .dir("", &["a.md", "bad/", "gone/"])
            .failing_dir("bad/")
            .file("a.md", "alpha");
        let cache = cache(vault);

        let report = cache.build_cache().await.unwrap();
        assert!(cache.is_ready());
        assert_eq!(report.files_cached, 1);
        assert_eq!(report.dirs_listed, 1);
    }

    #[tokio::test]
    async fn test_cycle_terminates_with_revisit() {
        let vault = FakeVault::new()
            .dir("", &["a/"])
            .dir("a/", &["note.md", "b/"])
            // b lists its grandparent again
            .dir("a/b/", &["../../a/", "../"])
            .file("a/note.md", "looping");
        let cache = cache(vault);

        let report = cache.build_cache().await.unwrap();
        assert!(cache.is_ready());
        assert_eq!(report.files_cached, 1);
        assert_eq!(report.revisits, 2);
    }

    #[tokio::test]
    async fn test_cancelled_build_can_be_restarted() {
        let vault = FakeVault::new()
            .with_delay(std::time::Duration::from_millis(50))
            .dir("", &["a.md"])
            .file("a.md", "alpha");
        let cache = cache(vault);

        let cancelled =
            tokio::time::timeout(std::time::Duration::from_millis(10), cache.build_cache()).await;
        assert!(cancelled.is_err());
        assert_eq!(cache.state(), CacheState::Idle);

        let report = cache.build_cache().await.unwrap();
        assert_eq!(report.files_cached, 1);
        assert!(cache.is_ready());
    }

    #[tokio::test]
    async fn test_root_failure_on_rebuild_keeps_ready() {
        let vault = Arc::new(FakeVault::new().dir("", &["a.md"]).file("a.md", "alpha"));
        let cache = VaultContentCache::new(vault.clone(), "md", true);
        cache.build_cache().await.unwrap();
        assert!(cache.is_ready());

        vault.fail_listing("");
        cache.build_cache().await.unwrap();
        assert_eq!(cache.state(), CacheState::Ready);
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_prunes_deleted_notes() {
        let vault = Arc::new(
            FakeVault::new()
                .dir("", &["keep.md", "drop.md"])
                .file("keep.md", "k")
                .file("drop.md", "d"),
        );
        let cache = VaultContentCache::new(vault.clone(), "md", true);
        cache.build_cache().await.unwrap();
        assert_eq!(cache.len(), 2);

        vault.set_listing("", &["keep.md"]);
        cache.build_cache().await.unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.get_entry("drop.md").is_none());
    }

    #[tokio::test]
    async fn test_refresh_entry_updates_and_removes() {
        let vault = Arc::new(FakeVault::new().dir("", &["a.md"]).file("a.md", "old"));
        let cache = VaultContentCache::new(vault.clone(), "md", true);
        cache.build_cache().await.unwrap();

        vault.set_file("a.md", "new");
        assert!(cache.refresh_entry("a.md").await.unwrap());
        assert_eq!(cache.get_entry("a.md").unwrap().content, "new");
        assert!(cache.is_ready());

        vault.remove_file("a.md");
        assert!(!cache.refresh_entry("a.md").await.unwrap());
        assert!(cache.get_entry("a.md").is_none());
    }

    #[tokio::test]
    async fn test_document_source_resolves_folded_suffix() {
        let vault = FakeVault::new()
            .dir("", &["dir/"])
            .dir("dir/", &["ÉCOLE.md"])
            .file("dir/ÉCOLE.md", "lecture notes");
        let cache = cache(vault);
        cache.build_cache().await.unwrap();

        let (path, content) = cache.resolve("ecole.md").unwrap();
        assert_eq!(path, "dir/ÉCOLE.md");
        assert_eq!(content, "lecture notes");
        assert_eq!(cache.documents().len(), 1);
    }
}
