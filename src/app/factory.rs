use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use homedir::my_home;

use super::{App, NoteCache};
use crate::config::Config;
use crate::remote::RemoteSearchClient;
use crate::search::{DocumentSource, QueryRouter, RouterSettings};
use crate::semantic::embeddings::FastembedEncoderSource;
use crate::semantic::store::CachedVectorStore;
use crate::vault::{LocalVault, VaultContentCache};

const BASE_PATH_ENV: &str = "RECALL_BASE_PATH";

/// Builds the application components from configuration
pub struct AppFactory;

impl AppFactory {
    /// Load configuration from the base path and wire everything up
    pub fn create_app() -> Result<App> {
        let base_path = Self::get_base_path()?;
        let config = Config::load_with(&base_path)
            .with_context(|| format!("failed to load config from {}", base_path.display()))?;

        Self::create_app_with(config)
    }

    pub fn create_app_with(config: Config) -> Result<App> {
        let cache = Self::create_cache(&config);
        let router = Self::create_router(&config, cache.clone())?;

        Ok(App {
            config,
            cache,
            router,
        })
    }

    pub fn create_cache(config: &Config) -> Arc<NoteCache> {
        let vault = Arc::new(LocalVault::new(config.vault.root.clone()));
        log::info!("vault root: {}", vault.root().display());
        Arc::new(VaultContentCache::new(
            vault,
            &config.vault.note_extension,
            config.vault.skip_hidden,
        ))
    }

    pub fn create_router(config: &Config, documents: Arc<dyn DocumentSource>) -> Result<QueryRouter> {
        let remote = if config.remote.enabled {
            let client = RemoteSearchClient::new(&config.remote)
                .context("failed to create remote search client")?;
            log::info!("remote search enabled: {}", client.endpoint());
            Some(client)
        } else {
            None
        };

        let vectors = Arc::new(CachedVectorStore::new(
            Duration::from_secs(config.embeddings.ttl_secs),
            config.embeddings.model.clone(),
        ));
        let encoders = Arc::new(FastembedEncoderSource::new(
            config.embeddings.local_query_encoding,
            config.model_cache_dir(),
        ));

        let settings = RouterSettings {
            mode: config.search.mode,
            embeddings_dir: Some(config.embeddings_dir()),
            local_query_encoding: config.embeddings.local_query_encoding,
            model_hint: config.embeddings.model.clone(),
            default_limit: config.search.default_limit,
            max_limit: config.search.max_limit,
        };

        Ok(QueryRouter::new(settings, remote, vectors, encoders, documents))
    }

    /// `$RECALL_BASE_PATH`, else `~/.config/recall`
    pub fn get_base_path() -> Result<PathBuf> {
        if let Ok(base_path) = std::env::var(BASE_PATH_ENV) {
            return Ok(PathBuf::from(base_path));
        }

        let home = my_home()
            .context("could not determine home directory")?
            .context("home directory path is empty")?;

        Ok(home.join(".config").join("recall"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchInput;
    use crate::types::SearchMethod;

    #[tokio::test]
    async fn test_app_from_default_config_falls_back_to_lexical() {
        let vault_dir = tempfile::tempdir().unwrap();
        std::fs::write(vault_dir.path().join("rust.md"), "rust ownership and borrowing").unwrap();
        std::fs::write(vault_dir.path().join("garden.md"), "tomatoes and basil").unwrap();

        let mut config = Config::default();
        config.vault.root = vault_dir.path().to_path_buf();

        let app = AppFactory::create_app_with(config).unwrap();
        app.cache.build_cache().await.unwrap();

        let outcome = app.router.search(SearchInput::query("borrowing")).await;
        assert_eq!(outcome.method, SearchMethod::Lexical);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].path, "rust.md");
    }

    #[test]
    fn test_invalid_remote_url_fails_router() {
        let mut config = Config::default();
        config.remote.enabled = true;
        config.remote.base_url = "not a url".to_string();

        let cache = AppFactory::create_cache(&config);
        assert!(AppFactory::create_router(&config, cache).is_err());
    }
}
