use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

use crate::remote::RetryPolicy;
use crate::search::SearchMode;

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_NOTE_EXTENSION: &str = "md";
const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

const DEFAULT_REMOTE_URL: &str = "https://127.0.0.1:27124";
const DEFAULT_REMOTE_PATH: &str = "/search/smart";
/// Per-attempt timeout for the remote tier
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_REMOTE_ATTEMPTS: u32 = 3;
const DEFAULT_REMOTE_BACKOFF_MS: u64 = 250;

/// How long a loaded vector store is reused before it is read again
const DEFAULT_EMBEDDINGS_TTL_SECS: u64 = 300;
/// Vector store directory relative to the vault root
const DEFAULT_EMBEDDINGS_SUBDIR: &str = ".smart-env";

const API_KEY_ENV: &str = "RECALL_API_KEY";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VaultConfig {
    /// Vault root directory
    #[serde(default = "default_vault_root")]
    pub root: PathBuf,

    /// Extension of note files, without the dot
    #[serde(default = "default_note_extension")]
    pub note_extension: String,

    /// Skip files and directories starting with `.`
    #[serde(default = "default_true")]
    pub skip_hidden: bool,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            root: default_vault_root(),
            note_extension: default_note_extension(),
            skip_hidden: true,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub mode: SearchMode,

    #[serde(default = "default_limit")]
    pub default_limit: usize,

    #[serde(default = "max_limit")]
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Auto,
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Remote semantic-search endpoint
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_remote_url")]
    pub base_url: String,

    #[serde(default = "default_remote_path")]
    pub path: String,

    /// Bearer token. Empty falls back to `$RECALL_API_KEY`.
    #[serde(default)]
    pub api_key: String,

    #[serde(default = "default_remote_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_remote_attempts")]
    pub attempts: u32,

    #[serde(default = "default_remote_backoff_ms")]
    pub backoff_ms: u64,

    /// Accept self-signed certificates (local plugin servers use them)
    #[serde(default)]
    pub accept_invalid_certs: bool,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: default_remote_url(),
            path: default_remote_path(),
            api_key: String::new(),
            timeout_ms: DEFAULT_REMOTE_TIMEOUT_MS,
            attempts: DEFAULT_REMOTE_ATTEMPTS,
            backoff_ms: DEFAULT_REMOTE_BACKOFF_MS,
            accept_invalid_certs: false,
        }
    }
}

impl RemoteConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        Some(self.api_key.trim().to_string())
            .filter(|k| !k.is_empty())
            .or_else(|| {
                std::env::var(API_KEY_ENV)
                    .ok()
                    .map(|k| k.trim().to_string())
                    .filter(|k| !k.is_empty())
            })
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.attempts,
            timeout: Duration::from_millis(self.timeout_ms),
            backoff: Duration::from_millis(self.backoff_ms),
        }
    }
}

/// Local precomputed vectors and query encoding
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// Vector store root. Defaults to `<vault.root>/.smart-env`.
    #[serde(default)]
    pub dir: Option<PathBuf>,

    /// Reuse a loaded store for this long. 0 reloads on every search.
    #[serde(default = "default_embeddings_ttl_secs")]
    pub ttl_secs: u64,

    /// Encode free-text queries locally to search the store
    #[serde(default)]
    pub local_query_encoding: bool,

    /// Encoder model (e.g., "bge-base-en-v1.5"). Inferred from the store when unset.
    #[serde(default)]
    pub model: Option<String>,

    /// Model download cache. Defaults to the base path.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: DEFAULT_EMBEDDINGS_TTL_SECS,
            local_query_encoding: false,
            model: None,
            cache_dir: None,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub vault: VaultConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

fn default_vault_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_note_extension() -> String {
    DEFAULT_NOTE_EXTENSION.to_string()
}

fn default_true() -> bool {
    true
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

fn max_limit() -> usize {
    MAX_LIMIT
}

fn default_remote_url() -> String {
    DEFAULT_REMOTE_URL.to_string()
}

fn default_remote_path() -> String {
    DEFAULT_REMOTE_PATH.to_string()
}

fn default_remote_timeout_ms() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_MS
}

fn default_remote_attempts() -> u32 {
    DEFAULT_REMOTE_ATTEMPTS
}

fn default_remote_backoff_ms() -> u64 {
    DEFAULT_REMOTE_BACKOFF_MS
}

fn default_embeddings_ttl_secs() -> u64 {
    DEFAULT_EMBEDDINGS_TTL_SECS
}

impl Config {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.vault.note_extension.trim_start_matches('.').is_empty() {
            bail!("vault.note_extension cannot be empty");
        }

        let search = &self.search;
        if search.max_limit == 0 {
            bail!("search.max_limit must be greater than 0");
        }
        if search.default_limit == 0 || search.default_limit > search.max_limit {
            bail!(
                "search.default_limit must be between 1 and {}, got {}",
                search.max_limit,
                search.default_limit
            );
        }

        let remote = &self.remote;
        if remote.attempts == 0 {
            bail!("remote.attempts must be greater than 0");
        }
        if remote.timeout_ms == 0 {
            bail!("remote.timeout_ms must be greater than 0");
        }
        if remote.enabled {
            url::Url::parse(&remote.base_url)
                .with_context(|| format!("remote.base_url is not a valid url: {}", remote.base_url))?;
        }

        Ok(())
    }

    /// Read `<base_path>/config.yaml`, writing defaults first if it does not
    /// exist.
    pub fn load_with(base_path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let base_path = base_path.as_ref();
        let config_path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !config_path.exists() {
            std::fs::create_dir_all(base_path)
                .with_context(|| format!("failed to create {}", base_path.display()))?;
            write_atomic(&config_path, &serde_yml::to_string(&Self::default())?)?;
            log::info!("wrote default config to {}", config_path.display());
        }

        let config_str = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {}", config_path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("config is malformed: {}", config_path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        Ok(config)
    }

    /// Vector store root: the configured dir, or `<vault.root>/.smart-env`.
    pub fn embeddings_dir(&self) -> PathBuf {
        self.embeddings
            .dir
            .clone()
            .unwrap_or_else(|| self.vault.root.join(DEFAULT_EMBEDDINGS_SUBDIR))
    }

    /// Where fastembed keeps downloaded models: the configured dir as is, or
    /// `<base>/models`.
    pub fn model_cache_dir(&self) -> PathBuf {
        self.embeddings
            .cache_dir
            .clone()
            .unwrap_or_else(|| self.base_path.join("models"))
    }
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let tmp_path = path.with_extension("yaml.tmp");
    std::fs::write(&tmp_path, contents)
        .with_context(|| format!("failed to write {}", tmp_path.display()))?;
    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("failed to move config into place: {}", path.display()))?;
    Ok(())
}
