use std::sync::Arc;

use crate::backup::BackupStore;
use crate::catalog::{CatalogCache, FilterRankEngine, QualityRules};
use crate::config::{Config, ConfigStore, FileConfigStore};
use crate::platform::{AccordHost, EmojiHost};
use crate::ratelimit::RateLimiter;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<dyn ConfigStore>,
    pub cache: Arc<CatalogCache>,
    pub engine: Arc<FilterRankEngine>,
    pub host: Arc<dyn EmojiHost>,
    pub backups: BackupStore,
    pub rate_limits: Arc<RateLimiter>,
}

impl AppState {
    /// Wire everything from an already-loaded settings store.
    pub fn new(
        config: Arc<dyn ConfigStore>,
        host: Arc<dyn EmojiHost>,
        backups: BackupStore,
        adult_keywords: Vec<String>,
    ) -> Self {
        let engine =
            FilterRankEngine::new(QualityRules::from_config(config.as_ref()), adult_keywords);
        Self {
            cache: Arc::new(CatalogCache::from_config(config.as_ref())),
            engine: Arc::new(engine),
            rate_limits: Arc::new(RateLimiter::from_config(config.as_ref())),
            config,
            host,
            backups,
        }
    }

    /// Load documents from the paths in `cfg` and talk to the platform over HTTP.
    pub fn from_config(cfg: &Config) -> Self {
        let store = FileConfigStore::load(&cfg.config_path, &cfg.settings_path);
        let keywords = FilterRankEngine::load_adult_keywords(&cfg.keywords_path);
        let host = AccordHost::new(cfg.platform_url.clone(), cfg.bot_token.clone());
        Self::new(
            Arc::new(store),
            Arc::new(host),
            BackupStore::new(cfg.backup_dir.clone()),
            keywords,
        )
    }

    /// Catalog base URL from `api.base_url`.
    pub fn catalog_url(&self) -> String {
        self.config.get_str("api.base_url", "https://emoji.gg/api")
    }
}
