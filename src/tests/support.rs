//! Fakes and fixtures shared by the integration tests.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use crate::remote::RemoteSearchClient;
use crate::search::{DocumentSource, QueryRouter, RouterSettings, SearchMode, StaticDocuments};
use crate::semantic::embeddings::{EmbeddingError, EncoderSource, TextEncoder};
use crate::semantic::lexical::LexicalDoc;
use crate::semantic::paths::{normalize_dir, normalize_path};
use crate::semantic::store::CachedVectorStore;
use crate::vault::{ContentFormat, FileContent, FileStat, VaultAccess, VaultError};

#[derive(Default)]
struct FakeVaultState {
    listings: HashMap<String, Vec<String>>,
    files: HashMap<String, String>,
    failing_dirs: HashSet<String>,
    failing_files: HashSet<String>,
}

/// Scripted vault: listings and files are declared up front and can be
/// changed while a cache holds the vault.
#[derive(Default)]
pub struct FakeVault {
    state: Mutex<FakeVaultState>,
    delay: Duration,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl FakeVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every call sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn dir(self, path: &str, entries: &[&str]) -> Self {
        self.set_listing(path, entries);
        self
    }

    pub fn file(self, path: &str, content: &str) -> Self {
        self.set_file(path, content);
        self
    }

    pub fn failing_dir(self, path: &str) -> Self {
        self.fail_listing(path);
        self
    }

    pub fn fail_listing(&self, path: &str) {
        self.state.lock().unwrap().failing_dirs.insert(normalize_dir(path));
    }

    pub fn failing_file(self, path: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_files
            .insert(normalize_path(path));
        self
    }

    pub fn set_listing(&self, path: &str, entries: &[&str]) {
        self.state.lock().unwrap().listings.insert(
            normalize_dir(path),
            entries.iter().map(|e| e.to_string()).collect(),
        );
    }

    pub fn set_file(&self, path: &str, content: &str) {
        self.state
            .lock()
            .unwrap()
            .files
            .insert(normalize_path(path), content.to_string());
    }

    pub fn remove_file(&self, path: &str) {
        self.state.lock().unwrap().files.remove(&normalize_path(path));
    }

    pub fn list_count(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl VaultAccess for FakeVault {
    async fn list_files(&self, dir: &str) -> Result<Vec<String>, VaultError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let key = normalize_dir(dir);
        let state = self.state.lock().unwrap();
        if state.failing_dirs.contains(&key) {
            return Err(VaultError::Other(format!("simulated listing failure: {key}")));
        }
        state
            .listings
            .get(&key)
            .cloned()
            .ok_or_else(|| VaultError::NotFound(key))
    }

    async fn get_file_content(
        &self,
        path: &str,
        _format: ContentFormat,
    ) -> Result<FileContent, VaultError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.pause().await;

        let key = normalize_path(path);
        let state = self.state.lock().unwrap();
        if state.failing_files.contains(&key) {
            return Err(VaultError::Other(format!("simulated read failure: {key}")));
        }
        state
            .files
            .get(&key)
            .map(|content| FileContent {
                content: content.clone(),
                stat: FileStat { mtime: 1_700_000_000_000 },
            })
            .ok_or_else(|| VaultError::NotFound(key))
    }
}

/// Encoder answering from a fixed table.
pub struct FakeEncoder {
    name: String,
    dimensions: usize,
    table: HashMap<String, Vec<f32>>,
}

impl TextEncoder for FakeEncoder {
    fn model_name(&self) -> &str {
        &self.name
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.table
            .get(text)
            .cloned()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed(format!("no vector for {text:?}")))
    }
}

/// [`EncoderSource`] handing out one [`FakeEncoder`] and recording the
/// hints it was asked for.
pub struct FakeEncoders {
    encoder: Option<Arc<FakeEncoder>>,
    pub requests: Mutex<Vec<(Option<String>, Option<usize>)>>,
    pub invalidations: AtomicUsize,
}

impl FakeEncoders {
    pub fn new(name: &str, dimensions: usize, table: &[(&str, Vec<f32>)]) -> Self {
        Self {
            encoder: Some(Arc::new(FakeEncoder {
                name: name.to_string(),
                dimensions,
                table: table
                    .iter()
                    .map(|(text, vec)| (text.to_string(), vec.clone()))
                    .collect(),
            })),
            requests: Mutex::new(Vec::new()),
            invalidations: AtomicUsize::new(0),
        }
    }

    pub fn disabled() -> Self {
        Self {
            encoder: None,
            requests: Mutex::new(Vec::new()),
            invalidations: AtomicUsize::new(0),
        }
    }
}

impl EncoderSource for FakeEncoders {
    fn get_or_load(
        &self,
        model_hint: Option<&str>,
        dimension: Option<usize>,
    ) -> Result<Arc<dyn TextEncoder>, EmbeddingError> {
        self.requests
            .lock()
            .unwrap()
            .push((model_hint.map(str::to_string), dimension));

        match &self.encoder {
            Some(encoder) => Ok(encoder.clone()),
            None => Err(EmbeddingError::Disabled),
        }
    }

    fn invalidate(&self) {
        self.invalidations.fetch_add(1, Ordering::SeqCst);
    }
}

/// Write one JSON vector file per note under `dir`.
pub fn write_vectors(dir: &Path, notes: &[(&str, Vec<f32>)]) {
    std::fs::create_dir_all(dir).unwrap();
    for (idx, (path, vec)) in notes.iter().enumerate() {
        let record = json!({
            "path": path,
            "embedding": vec,
            "model": "bge-small-en-v1.5",
        });
        std::fs::write(dir.join(format!("note-{idx}.json")), record.to_string()).unwrap();
    }
}

pub fn docs(items: &[(&str, &str)]) -> Arc<StaticDocuments> {
    Arc::new(StaticDocuments(
        items
            .iter()
            .map(|(path, text)| LexicalDoc::new(*path, *text))
            .collect(),
    ))
}

/// Router over a zero-TTL vector store. `embeddings_dir` of `None` disables
/// the files tier.
pub struct RouterBuilder {
    pub settings: RouterSettings,
    pub remote: Option<RemoteSearchClient>,
    pub encoders: Arc<dyn EncoderSource>,
    pub documents: Arc<dyn DocumentSource>,
}

impl RouterBuilder {
    pub fn new() -> Self {
        Self {
            settings: RouterSettings::default(),
            remote: None,
            encoders: Arc::new(FakeEncoders::disabled()),
            documents: docs(&[]),
        }
    }

    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.settings.mode = mode;
        self
    }

    pub fn embeddings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.settings.embeddings_dir = Some(dir.into());
        self
    }

    pub fn local_query_encoding(mut self, encoders: Arc<dyn EncoderSource>) -> Self {
        self.settings.local_query_encoding = true;
        self.encoders = encoders;
        self
    }

    pub fn remote(mut self, remote: RemoteSearchClient) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn documents(mut self, documents: Arc<dyn DocumentSource>) -> Self {
        self.documents = documents;
        self
    }

    pub fn build(self) -> QueryRouter {
        QueryRouter::new(
            self.settings,
            self.remote,
            Arc::new(CachedVectorStore::new(Duration::ZERO, None)),
            self.encoders,
            self.documents,
        )
    }
}

/// Serve `router` on an ephemeral local port.
pub async fn spawn_server(router: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    addr
}
