pub mod factory;

use std::sync::Arc;

pub use factory::AppFactory;

use crate::config::Config;
use crate::search::QueryRouter;
use crate::vault::{LocalVault, VaultContentCache};

pub type NoteCache = VaultContentCache<LocalVault>;

/// Wired application: configuration, content cache and router.
pub struct App {
    pub config: Config,
    pub cache: Arc<NoteCache>,
    pub router: QueryRouter,
}

impl App {
    /// Start a cache build without waiting for it.
    pub fn spawn_cache_build(&self) -> tokio::task::JoinHandle<()> {
        let cache = self.cache.clone();
        tokio::spawn(async move {
            if cache.build_cache().await.is_none() {
                log::debug!("background cache build skipped: already building");
            }
        })
    }
}
