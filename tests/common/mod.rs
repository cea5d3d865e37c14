#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get};
use axum::{Json, Router};
use emojibot::backup::BackupStore;
use emojibot::config::FileConfigStore;
use emojibot::platform::AccordHost;
use emojibot::routes;
use emojibot::state::AppState;
use emojibot::storage;
use http::{Method, Request};
use serde_json::{json, Value};
use tower::ServiceExt;

pub const BOT_TOKEN: &str = "test-token";
pub const GUILD: &str = "g1";

pub const PNG: &[u8] = b"\x89PNG\r\n\x1a\n-fake-png";
pub const GIF: &[u8] = b"GIF89a-fake-gif";

/// Counts requests made to the mock catalog, per collection.
#[derive(Default)]
pub struct CatalogHits {
    pub emojis: AtomicU64,
    pub categories: AtomicU64,
}

#[derive(Clone)]
struct CatalogState {
    base: String,
    hits: Arc<CatalogHits>,
}

fn catalog_emojis(base: &str) -> Value {
    json!([
        { "id": 1, "title": "Happy Cat", "image": format!("{base}/img/happy_cat.png"),
          "category": 1, "faves": 50, "filesize": 2000 },
        { "id": 2, "title": "Sad Dog", "image": format!("{base}/img/sad_dog.png"),
          "category": 2, "faves": 30, "filesize": 3000 },
        { "id": 3, "title": "Party Parrot", "image": format!("{base}/img/party_parrot.gif"),
          "category": 1, "faves": 80, "filesize": 5000 },
        { "id": 4, "title": "Cat Nap", "image": format!("{base}/img/cat_nap.png"),
          "category": 1, "faves": 10, "filesize": 1500 },
        { "id": 5, "title": "nsfw thing", "image": format!("{base}/img/nsfw_thing.png"),
          "category": 3, "faves": 99, "filesize": 2500 }
    ])
}

async fn catalog_root(
    State(state): State<CatalogState>,
    Query(params): Query<HashMap<String, String>>,
) -> Json<Value> {
    if params.get("request").map(String::as_str) == Some("categories") {
        state.hits.categories.fetch_add(1, Ordering::SeqCst);
        return Json(json!([
            { "id": 1, "name": "Animals" },
            { "id": 2, "name": "Dogs" },
            { "id": 3, "name": "Other" }
        ]));
    }
    state.hits.emojis.fetch_add(1, Ordering::SeqCst);
    Json(catalog_emojis(&state.base))
}

async fn catalog_image(Path(file): Path<String>) -> Vec<u8> {
    if file.ends_with(".gif") {
        GIF.to_vec()
    } else {
        PNG.to_vec()
    }
}

/// Serve a small emoji catalog on an ephemeral port. Returns its base URL.
async fn spawn_catalog(hits: Arc<CatalogHits>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = Router::new()
        .route("/", get(catalog_root))
        .route("/packs", get(|| async { Json(json!([{ "id": 1, "name": "Starter" }])) }))
        .route("/img/{file}", get(catalog_image))
        .with_state(CatalogState {
            base: base.clone(),
            hits,
        });
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

/// In-memory stand-in for the chat platform's emoji endpoints.
#[derive(Default)]
pub struct PlatformStore {
    pub emojis: Mutex<Vec<Value>>,
    images: Mutex<HashMap<String, Vec<u8>>>,
    next_id: AtomicU64,
}

impl PlatformStore {
    pub fn names(&self) -> Vec<String> {
        self.emojis
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e["name"].as_str().map(str::to_string))
            .collect()
    }

    pub fn insert(&self, name: &str, image: &[u8]) -> String {
        let id = (500 + self.next_id.fetch_add(1, Ordering::SeqCst)).to_string();
        let animated = image.starts_with(b"GIF8");
        let url = format!("/cdn/emojis/{id}.{}", if animated { "gif" } else { "png" });
        self.images.lock().unwrap().insert(url.clone(), image.to_vec());
        let emoji = json!({
            "id": id,
            "name": name,
            "animated": animated,
            "managed": false,
            "available": true,
            "image_url": url
        });
        self.emojis.lock().unwrap().push(emoji);
        id
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .map(|v| v == format!("Bot {BOT_TOKEN}"))
        .unwrap_or(false)
}

type Platform = State<Arc<PlatformStore>>;

async fn list_emojis(State(store): Platform, headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let emojis = store.emojis.lock().unwrap().clone();
    Ok(Json(json!({ "data": emojis })))
}

async fn create_emoji(
    State(store): Platform,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Json<Value>, StatusCode> {
    if !authorized(&headers) {
        return Err(StatusCode::UNAUTHORIZED);
    }
    let name = body["name"].as_str().unwrap_or_default().to_string();
    let encoded = body["image"]
        .as_str()
        .and_then(|uri| uri.split_once(";base64,"))
        .map(|(_, data)| data.to_string())
        .ok_or(StatusCode::BAD_REQUEST)?;
    let image = data_encoding::BASE64
        .decode(encoded.as_bytes())
        .map_err(|_| StatusCode::BAD_REQUEST)?;
    let id = store.insert(&name, &image);
    let emoji = store
        .emojis
        .lock()
        .unwrap()
        .iter()
        .find(|e| e["id"] == id.as_str())
        .cloned()
        .unwrap_or(Value::Null);
    Ok(Json(json!({ "data": emoji })))
}

async fn delete_emoji(
    State(store): Platform,
    headers: HeaderMap,
    Path((_space_id, emoji_id)): Path<(String, String)>,
) -> StatusCode {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED;
    }
    let mut emojis = store.emojis.lock().unwrap();
    let before = emojis.len();
    emojis.retain(|e| e["id"] != emoji_id.as_str());
    if emojis.len() == before {
        StatusCode::NOT_FOUND
    } else {
        StatusCode::NO_CONTENT
    }
}

async fn emoji_image(State(store): Platform, Path(file): Path<String>) -> Result<Vec<u8>, StatusCode> {
    store
        .images
        .lock()
        .unwrap()
        .get(&format!("/cdn/emojis/{file}"))
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

async fn spawn_platform(store: Arc<PlatformStore>) -> String {
    let app = Router::new()
        .route(
            "/api/v1/spaces/{space_id}/emojis",
            get(list_emojis).post(create_emoji),
        )
        .route(
            "/api/v1/spaces/{space_id}/emojis/{emoji_id}",
            delete(delete_emoji),
        )
        .route("/cdn/emojis/{file}", get(emoji_image))
        .with_state(store);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

/// Bot wired to a mock catalog and a mock platform, each on its own port.
/// Each instance is isolated, so tests can run in parallel.
pub struct TestServer {
    pub state: AppState,
    pub catalog_url: String,
    pub catalog_hits: Arc<CatalogHits>,
    pub platform: Arc<PlatformStore>,
}

impl TestServer {
    pub async fn new() -> Self {
        Self::with_document(json!({})).await
    }

    /// Each section of `overrides` (e.g. `api`, `defaults`) is merged into the
    /// global settings document.
    pub async fn with_document(overrides: Value) -> Self {
        let catalog_hits = Arc::new(CatalogHits::default());
        let catalog_url = spawn_catalog(catalog_hits.clone()).await;
        let platform = Arc::new(PlatformStore::default());
        let platform_url = spawn_platform(platform.clone()).await;

        let mut document = json!({
            "api": {
                "base_url": catalog_url,
                "rate_limit_per_user": 1000,
                "fetch_timeout": 5
            }
        });
        for (section, values) in overrides.as_object().into_iter().flatten() {
            let target = &mut document[section.as_str()];
            if target.is_null() {
                *target = json!({});
            }
            let target = target.as_object_mut().unwrap();
            for (key, value) in values.as_object().into_iter().flatten() {
                target.insert(key.clone(), value.clone());
            }
        }

        let dir = storage::temp_storage_path();
        let config = FileConfigStore::from_parts(
            document,
            dir.join("settings.json"),
            BTreeMap::new(),
        );
        let host = AccordHost::new(platform_url, Some(BOT_TOKEN.to_string()));
        let state = AppState::new(
            Arc::new(config),
            Arc::new(host),
            BackupStore::new(dir.join("backups")),
            vec!["nsfw".to_string()],
        );

        Self {
            state,
            catalog_url,
            catalog_hits,
            platform,
        }
    }

    /// Returns an Axum Router wired to this server's state for `oneshot()` calls.
    pub fn router(&self) -> Router {
        routes::router(self.state.clone())
    }

    /// Send one command interaction and return status, headers and JSON body.
    pub async fn command(
        &self,
        name: &str,
        options: Value,
        permissions: &[&str],
    ) -> (StatusCode, HeaderMap, Value) {
        self.command_as("u1", name, options, permissions).await
    }

    pub async fn command_as(
        &self,
        user_id: &str,
        name: &str,
        options: Value,
        permissions: &[&str],
    ) -> (StatusCode, HeaderMap, Value) {
        let body = interaction(user_id, name, options, permissions);
        let response = self
            .router()
            .oneshot(json_request(Method::POST, "/interactions", body))
            .await
            .unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        (status, headers, parse_body(response).await)
    }
}

/// Build an interaction payload. `options` is an object of option name to value.
pub fn interaction(user_id: &str, name: &str, options: Value, permissions: &[&str]) -> Value {
    let options: Vec<Value> = options
        .as_object()
        .map(|map| {
            map.iter()
                .map(|(k, v)| json!({ "name": k, "value": v }))
                .collect()
        })
        .unwrap_or_default();
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "type": "command",
        "data": { "name": name, "options": options },
        "space_id": GUILD,
        "user_id": user_id,
        "member_permissions": permissions
    })
}

pub fn json_request(method: Method, uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap()
}

pub fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub async fn parse_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap_or_else(|_| {
        Value::String(String::from_utf8_lossy(&bytes).into_owned())
    })
}

/// Field names of the first embed in a reply.
pub fn embed_field_names(body: &Value) -> Vec<String> {
    body["data"]["embeds"][0]["fields"]
        .as_array()
        .map(|fields| {
            fields
                .iter()
                .filter_map(|f| f["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}
