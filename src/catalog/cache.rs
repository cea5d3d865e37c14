use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::Instant;

use super::{decode_list, CatalogEntry, Category, Pack};
use crate::config::ConfigStore;

pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CollectionKind {
    Emojis,
    Categories,
    Packs,
}

impl CollectionKind {
    /// API endpoint for this collection under `base_url`.
    pub fn endpoint(self, base_url: &str) -> String {
        match self {
            CollectionKind::Emojis => base_url.to_string(),
            CollectionKind::Categories => format!("{base_url}?request=categories"),
            CollectionKind::Packs => format!("{}/packs", base_url.trim_end_matches('/')),
        }
    }
}

impl fmt::Display for CollectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKind::Emojis => write!(f, "emojis"),
            CollectionKind::Categories => write!(f, "categories"),
            CollectionKind::Packs => write!(f, "packs"),
        }
    }
}

/// Reasons a refresh did not produce a new snapshot. Never surfaced to
/// callers of the cache; logged and answered with the last good snapshot.
#[derive(Debug)]
pub enum FetchError {
    Http(reqwest::Error),
    Status { status: u16, url: String },
    Decode(serde_json::Error),
    NotAList { kind: CollectionKind, found: &'static str },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Http(e) if e.is_timeout() => write!(f, "request timed out: {e}"),
            FetchError::Http(e) => write!(f, "HTTP error: {e}"),
            FetchError::Status { status, url } => {
                write!(f, "API request to {url} failed with status {status}")
            }
            FetchError::Decode(e) => write!(f, "invalid JSON body: {e}"),
            FetchError::NotAList { kind, found } => {
                write!(f, "expected a JSON array of {kind}, got {found}")
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Http(e)
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Decode(e)
    }
}

/// A complete collection as of one successful fetch.
struct Snapshot<T> {
    items: Arc<Vec<T>>,
    fetched_at: Instant,
}

/// One cached collection. Value and timestamp are swapped in together.
type Slot<T> = ArcSwapOption<Snapshot<T>>;

#[derive(Debug, Clone, Serialize)]
pub struct SlotStats {
    pub cached: bool,
    pub count: usize,
    pub age_seconds: f64,
    pub expired: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub emojis: SlotStats,
    pub categories: SlotStats,
    pub packs: SlotStats,
}

/// TTL cache over the three catalog collections.
///
/// Each slot expires on its own. A failed refresh leaves the slot untouched
/// and the caller gets the previous snapshot, or an empty list if there has
/// never been one. Concurrent misses on the same slot each fetch.
pub struct CatalogCache {
    client: Client,
    ttl: Duration,
    fetch_timeout: Duration,
    emojis: Slot<CatalogEntry>,
    categories: Slot<Category>,
    packs: Slot<Pack>,
}

impl CatalogCache {
    pub fn new(ttl: Duration, fetch_timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            ttl,
            fetch_timeout,
            emojis: ArcSwapOption::empty(),
            categories: ArcSwapOption::empty(),
            packs: ArcSwapOption::empty(),
        }
    }

    /// Build from `api.cache_ttl` and `api.fetch_timeout` (seconds).
    pub fn from_config(config: &dyn ConfigStore) -> Self {
        let ttl = Duration::from_secs(config.get_u64("api.cache_ttl", DEFAULT_TTL.as_secs()));
        let timeout = Duration::from_secs(
            config.get_u64("api.fetch_timeout", DEFAULT_FETCH_TIMEOUT.as_secs()),
        );
        Self::new(ttl, timeout)
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn emojis(&self, base_url: &str, force_refresh: bool) -> Arc<Vec<CatalogEntry>> {
        self.get(&self.emojis, CollectionKind::Emojis, base_url, force_refresh)
            .await
    }

    pub async fn categories(&self, base_url: &str, force_refresh: bool) -> Arc<Vec<Category>> {
        self.get(&self.categories, CollectionKind::Categories, base_url, force_refresh)
            .await
    }

    pub async fn packs(&self, base_url: &str, force_refresh: bool) -> Arc<Vec<Pack>> {
        self.get(&self.packs, CollectionKind::Packs, base_url, force_refresh)
            .await
    }

    /// Drop every snapshot. The next read of any collection goes to the network.
    pub fn clear(&self) {
        tracing::info!("clearing all catalog caches");
        self.emojis.store(None);
        self.categories.store(None);
        self.packs.store(None);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            emojis: self.slot_stats(&self.emojis),
            categories: self.slot_stats(&self.categories),
            packs: self.slot_stats(&self.packs),
        }
    }

    async fn get<T: DeserializeOwned>(
        &self,
        slot: &Slot<T>,
        kind: CollectionKind,
        base_url: &str,
        force_refresh: bool,
    ) -> Arc<Vec<T>> {
        if !force_refresh {
            if let Some(snapshot) = slot.load_full() {
                if !self.is_expired(snapshot.fetched_at) {
                    tracing::debug!("returning {kind} from cache");
                    return Arc::clone(&snapshot.items);
                }
            }
        }

        let url = kind.endpoint(base_url);
        tracing::info!("fetching {kind} from {url}");
        match self.fetch::<T>(&url, kind).await {
            Ok(items) => {
                let items = Arc::new(items);
                slot.store(Some(Arc::new(Snapshot {
                    items: Arc::clone(&items),
                    fetched_at: Instant::now(),
                })));
                tracing::info!("cached {} {kind}", items.len());
                items
            }
            Err(e) => {
                tracing::error!("error fetching {kind}: {e}");
                match slot.load_full() {
                    Some(previous) => {
                        tracing::warn!(
                            "serving stale {kind} snapshot ({} items)",
                            previous.items.len()
                        );
                        Arc::clone(&previous.items)
                    }
                    None => Arc::new(Vec::new()),
                }
            }
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        url: &str,
        kind: CollectionKind,
    ) -> Result<Vec<T>, FetchError> {
        let response = self
            .client
            .get(url)
            .header("User-Agent", "emojibot/1.0")
            .timeout(self.fetch_timeout)
            .send()
            .await?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        let body: serde_json::Value = serde_json::from_slice(&bytes)?;
        decode_list(body, kind)
    }

    fn is_expired(&self, fetched_at: Instant) -> bool {
        fetched_at.elapsed() > self.ttl
    }

    fn slot_stats<T>(&self, slot: &Slot<T>) -> SlotStats {
        match slot.load_full() {
            Some(snapshot) => {
                let age = snapshot.fetched_at.elapsed();
                SlotStats {
                    cached: true,
                    count: snapshot.items.len(),
                    age_seconds: age.as_secs_f64(),
                    expired: age > self.ttl,
                }
            }
            None => SlotStats {
                cached: false,
                count: 0,
                age_seconds: 0.0,
                expired: true,
            },
        }
    }

    /// Pretend every snapshot was fetched `by` earlier than it was.
    #[cfg(test)]
    fn age_all(&self, by: Duration) {
        fn age<T>(slot: &Slot<T>, by: Duration) {
            if let Some(snapshot) = slot.load_full() {
                let fetched_at = snapshot
                    .fetched_at
                    .checked_sub(by)
                    .unwrap_or(snapshot.fetched_at);
                slot.store(Some(Arc::new(Snapshot {
                    items: Arc::clone(&snapshot.items),
                    fetched_at,
                })));
            }
        }
        age(&self.emojis, by);
        age(&self.categories, by);
        age(&self.packs, by);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogId;
    use axum::extract::{Query, State};
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use axum::{Json, Router};
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct MockCatalog {
        emoji_hits: Arc<AtomicUsize>,
        category_hits: Arc<AtomicUsize>,
        pack_hits: Arc<AtomicUsize>,
        failing: Arc<AtomicBool>,
        garbage: Arc<AtomicBool>,
        slow: Arc<AtomicBool>,
    }

    async fn root(
        State(mock): State<MockCatalog>,
        Query(query): Query<HashMap<String, String>>,
    ) -> Response {
        if mock.slow.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3)).await;
        }
        if mock.failing.load(Ordering::SeqCst) {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        if query.get("request").map(String::as_str) == Some("categories") {
            mock.category_hits.fetch_add(1, Ordering::SeqCst);
            return Json(json!([{ "id": 1, "name": "Animals" }])).into_response();
        }
        let n = mock.emoji_hits.fetch_add(1, Ordering::SeqCst);
        if mock.garbage.load(Ordering::SeqCst) {
            return Json(json!({ "message": "maintenance" })).into_response();
        }
        Json(json!([
            { "id": 1, "title": "cat", "faves": 10, "category": 1, "image": "a.png" },
            { "id": 2, "title": format!("dog{n}"), "faves": 50, "category": 1, "image": "b.gif" }
        ]))
        .into_response()
    }

    async fn packs(State(mock): State<MockCatalog>) -> Response {
        mock.pack_hits.fetch_add(1, Ordering::SeqCst);
        Json(json!([{ "id": 9, "name": "starter", "amount": 3 }])).into_response()
    }

    async fn spawn_catalog(mock: MockCatalog) -> String {
        let app = Router::new()
            .route("/api", get(root))
            .route("/api/packs", get(packs))
            .with_state(mock);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/api")
    }

    fn cache() -> CatalogCache {
        CatalogCache::new(Duration::from_secs(60), Duration::from_secs(5))
    }

    #[test]
    fn test_endpoints() {
        let base = "https://emoji.gg/api";
        assert_eq!(CollectionKind::Emojis.endpoint(base), base);
        assert_eq!(
            CollectionKind::Categories.endpoint(base),
            "https://emoji.gg/api?request=categories"
        );
        assert_eq!(CollectionKind::Packs.endpoint("https://x/api/"), "https://x/api/packs");
    }

    #[tokio::test]
    async fn test_fresh_snapshot_is_served_without_network() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        let first = cache.emojis(&url, false).await;
        for _ in 0..5 {
            let again = cache.emojis(&url, false).await;
            assert!(Arc::ptr_eq(&first, &again));
        }
        assert_eq!(first.len(), 2);
        assert_eq!(mock.emoji_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_expired_snapshot_is_refetched() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        cache.emojis(&url, false).await;
        cache.age_all(Duration::from_secs(30));
        cache.emojis(&url, false).await;
        assert_eq!(mock.emoji_hits.load(Ordering::SeqCst), 1);

        cache.age_all(Duration::from_secs(31));
        let refreshed = cache.emojis(&url, false).await;
        assert_eq!(mock.emoji_hits.load(Ordering::SeqCst), 2);
        assert_eq!(refreshed[1].title, "dog1");
    }

    #[tokio::test]
    async fn test_force_refresh_bypasses_fresh_snapshot() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        cache.emojis(&url, false).await;
        cache.emojis(&url, true).await;
        assert_eq!(mock.emoji_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failed_refresh_serves_previous_snapshot() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        let before = cache.emojis(&url, false).await;
        cache.age_all(Duration::from_secs(120));
        mock.failing.store(true, Ordering::SeqCst);

        let after = cache.emojis(&url, false).await;
        assert!(Arc::ptr_eq(&before, &after));

        let stats = cache.stats();
        assert!(stats.emojis.cached);
        assert!(stats.emojis.expired);
        assert!(stats.emojis.age_seconds >= 120.0);
    }

    #[tokio::test]
    async fn test_failed_fetch_without_snapshot_is_empty() {
        let mock = MockCatalog::default();
        mock.failing.store(true, Ordering::SeqCst);
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        assert!(cache.emojis(&url, false).await.is_empty());
        assert!(!cache.stats().emojis.cached);
        // Failures are not cached either.
        cache.emojis(&url, false).await;
        assert!(cache.emojis(&url, true).await.is_empty());
    }

    #[tokio::test]
    async fn test_non_array_body_counts_as_failure() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        let good = cache.emojis(&url, false).await;
        mock.garbage.store(true, Ordering::SeqCst);
        let after = cache.emojis(&url, true).await;
        assert!(Arc::ptr_eq(&good, &after));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_empty() {
        let cache = CatalogCache::new(Duration::from_secs(60), Duration::from_millis(500));
        // Port 9 (discard) on localhost is closed on any sane test machine.
        assert!(cache.emojis("http://127.0.0.1:9/api", false).await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_a_fetch_failure() {
        let mock = MockCatalog::default();
        mock.slow.store(true, Ordering::SeqCst);
        let url = spawn_catalog(mock.clone()).await;
        let cache = CatalogCache::new(Duration::from_secs(60), Duration::from_millis(200));

        let started = std::time::Instant::now();
        assert!(cache.emojis(&url, false).await.is_empty());
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_clear_forces_next_read_to_fetch() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        cache.emojis(&url, false).await;
        cache.categories(&url, false).await;
        cache.clear();

        let stats = cache.stats();
        assert!(!stats.emojis.cached && stats.emojis.expired);
        assert!(!stats.categories.cached && stats.categories.expired);

        cache.emojis(&url, false).await;
        cache.categories(&url, false).await;
        assert_eq!(mock.emoji_hits.load(Ordering::SeqCst), 2);
        assert_eq!(mock.category_hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_slots_expire_independently() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        cache.emojis(&url, false).await;
        cache.age_all(Duration::from_secs(61));
        // Categories were never fetched, so aging only touched emojis.
        let categories = cache.categories(&url, false).await;
        assert_eq!(categories[0].id, CatalogId::Int(1));
        assert_eq!(categories[0].name, "Animals");

        let stats = cache.stats();
        assert!(stats.emojis.expired);
        assert!(!stats.categories.expired);
        assert!(!stats.packs.cached);
    }

    #[tokio::test]
    async fn test_packs_are_fetched_from_packs_endpoint() {
        let mock = MockCatalog::default();
        let url = spawn_catalog(mock.clone()).await;
        let cache = cache();

        let packs = cache.packs(&url, false).await;
        assert_eq!(packs.len(), 1);
        assert_eq!(packs[0]["name"], "starter");
        assert_eq!(mock.pack_hits.load(Ordering::SeqCst), 1);
        assert_eq!(mock.emoji_hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_stats() {
        let stats = cache().stats();
        for slot in [stats.emojis, stats.categories, stats.packs] {
            assert!(!slot.cached);
            assert_eq!(slot.count, 0);
            assert_eq!(slot.age_seconds, 0.0);
            assert!(slot.expired);
        }
    }
}
