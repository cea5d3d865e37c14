//! The chat platform the bot manages emojis on.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::models::emoji::{CreateEmoji, GuildEmoji};
use crate::storage;

pub const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
pub enum HostError {
    Http(reqwest::Error),
    Forbidden(String),
    NotFound(String),
    InvalidImage(String),
    ServerError { status: u16, body: String },
    Decode(String),
}

impl fmt::Display for HostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostError::Http(e) => write!(f, "HTTP error: {e}"),
            HostError::Forbidden(body) => write!(f, "forbidden: {body}"),
            HostError::NotFound(body) => write!(f, "not found: {body}"),
            HostError::InvalidImage(msg) => write!(f, "invalid image: {msg}"),
            HostError::ServerError { status, body } => {
                write!(f, "server returned {status}: {body}")
            }
            HostError::Decode(e) => write!(f, "unexpected response body: {e}"),
        }
    }
}

impl std::error::Error for HostError {}

impl From<reqwest::Error> for HostError {
    fn from(e: reqwest::Error) -> Self {
        HostError::Http(e)
    }
}

/// Emoji operations on one chat platform.
#[async_trait]
pub trait EmojiHost: Send + Sync {
    async fn list_emojis(&self, guild_id: &str) -> Result<Vec<GuildEmoji>, HostError>;

    async fn create_emoji(
        &self,
        guild_id: &str,
        name: &str,
        image: &[u8],
    ) -> Result<GuildEmoji, HostError>;

    async fn delete_emoji(&self, guild_id: &str, emoji_id: &str) -> Result<(), HostError>;

    /// Download an image, either an absolute URL or a path on the platform.
    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, HostError>;
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

/// `EmojiHost` for an accordserver instance, talking to its REST API as a bot.
pub struct AccordHost {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl AccordHost {
    pub fn new(base_url: String, token: Option<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    fn apply_auth(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(ref token) = self.token {
            builder.header("Authorization", format!("Bot {token}"))
        } else {
            builder
        }
    }

    fn emojis_url(&self, guild_id: &str) -> String {
        format!("{}/api/v1/spaces/{guild_id}/emojis", self.base_url)
    }

    /// True when `url` has the platform's scheme, host and port. Only those
    /// requests may carry the bot token.
    fn is_platform_url(&self, url: &str) -> bool {
        match (Url::parse(&self.base_url), Url::parse(url)) {
            (Ok(base), Ok(target)) => base.origin() == target.origin(),
            _ => false,
        }
    }

    fn resolve(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{url}", self.base_url)
        } else {
            url.to_string()
        }
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response, HostError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        Err(match status.as_u16() {
            403 => HostError::Forbidden(body),
            404 => HostError::NotFound(body),
            status => HostError::ServerError { status, body },
        })
    }

    async fn data<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T, HostError> {
        let bytes = Self::check(resp).await?.bytes().await?;
        serde_json::from_slice::<Envelope<T>>(&bytes)
            .map(|envelope| envelope.data)
            .map_err(|e| HostError::Decode(e.to_string()))
    }
}

#[async_trait]
impl EmojiHost for AccordHost {
    async fn list_emojis(&self, guild_id: &str) -> Result<Vec<GuildEmoji>, HostError> {
        let builder = self.client.get(self.emojis_url(guild_id));
        let resp = self.apply_auth(builder).send().await?;
        Self::data(resp).await
    }

    async fn create_emoji(
        &self,
        guild_id: &str,
        name: &str,
        image: &[u8],
    ) -> Result<GuildEmoji, HostError> {
        let image = storage::image_data_uri(image)
            .map_err(|e| HostError::InvalidImage(e.message()))?;
        let builder = self.client.post(self.emojis_url(guild_id)).json(&CreateEmoji {
            name: name.to_string(),
            image,
        });
        let resp = self.apply_auth(builder).send().await?;
        let emoji: GuildEmoji = Self::data(resp).await?;
        tracing::debug!("created emoji {} ({}) in {guild_id}", emoji.name, emoji.id);
        Ok(emoji)
    }

    async fn delete_emoji(&self, guild_id: &str, emoji_id: &str) -> Result<(), HostError> {
        let url = format!("{}/{emoji_id}", self.emojis_url(guild_id));
        let resp = self.apply_auth(self.client.delete(&url)).send().await?;
        Self::check(resp).await?;
        Ok(())
    }

    async fn fetch_image(&self, url: &str) -> Result<Vec<u8>, HostError> {
        let url = self.resolve(url);
        let mut builder = self.client.get(&url).timeout(DOWNLOAD_TIMEOUT);
        if self.is_platform_url(&url) {
            builder = self.apply_auth(builder);
        }
        let resp = Self::check(builder.send().await?).await?;
        Ok(resp.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Path;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::{delete, get};
    use axum::{Json, Router};
    use serde_json::{json, Value};
    use std::sync::{Arc, Mutex};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n-fake-png";

    fn authorized(headers: &HeaderMap) -> bool {
        headers.get("Authorization").and_then(|v| v.to_str().ok()) == Some("Bot secret")
    }

    async fn spawn_platform() -> String {
        let app = Router::new()
            .route(
                "/api/v1/spaces/{space_id}/emojis",
                get(|Path(space): Path<String>, headers: HeaderMap| async move {
                    if !authorized(&headers) {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    if space == "locked" {
                        return Err(StatusCode::FORBIDDEN);
                    }
                    Ok(Json(json!({ "data": [
                        { "id": "1", "name": "wave", "animated": true, "image_url": "/cdn/emojis/1.gif" }
                    ] })))
                })
                .post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                    if !authorized(&headers) {
                        return Err(StatusCode::UNAUTHORIZED);
                    }
                    let image = body["image"].as_str().unwrap_or_default();
                    if !image.starts_with("data:image/png;base64,") {
                        return Err(StatusCode::BAD_REQUEST);
                    }
                    Ok(Json(json!({ "data": { "id": "77", "name": body["name"] } })))
                }),
            )
            .route(
                "/api/v1/spaces/{space_id}/emojis/{emoji_id}",
                delete(|Path((_, emoji_id)): Path<(String, String)>| async move {
                    if emoji_id == "missing" {
                        Err(StatusCode::NOT_FOUND)
                    } else {
                        Ok(Json(json!({ "data": null })))
                    }
                }),
            )
            .route("/cdn/emojis/{file}", get(|| async { PNG.to_vec() }));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/")
    }

    #[tokio::test]
    async fn test_list_create_delete() {
        let base = spawn_platform().await;
        let host = AccordHost::new(base, Some("secret".to_string()));

        let emojis = host.list_emojis("g1").await.unwrap();
        assert_eq!(emojis.len(), 1);
        assert_eq!(emojis[0].mention(), "<a:wave:1>");

        let created = host.create_emoji("g1", "party", PNG).await.unwrap();
        assert_eq!(created.id, "77");
        assert_eq!(created.name, "party");

        host.delete_emoji("g1", "77").await.unwrap();
        assert!(matches!(
            host.delete_emoji("g1", "missing").await,
            Err(HostError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_forbidden_and_unauthenticated() {
        let base = spawn_platform().await;
        let host = AccordHost::new(base.clone(), Some("secret".to_string()));
        assert!(matches!(
            host.list_emojis("locked").await,
            Err(HostError::Forbidden(_))
        ));

        let anonymous = AccordHost::new(base, None);
        assert!(matches!(
            anonymous.list_emojis("g1").await,
            Err(HostError::ServerError { status: 401, .. })
        ));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_image_format() {
        let base = spawn_platform().await;
        let host = AccordHost::new(base, Some("secret".to_string()));
        assert!(matches!(
            host.create_emoji("g1", "x", b"plain text").await,
            Err(HostError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_platform_url_matches_origin_not_prefix() {
        let host = AccordHost::new("https://chat.example.com".to_string(), None);
        assert!(host.is_platform_url("https://chat.example.com/cdn/x.png"));
        assert!(host.is_platform_url("https://chat.example.com:443/cdn/x.png"));
        assert!(!host.is_platform_url("https://chat.example.com.evil.io/x.png"));
        assert!(!host.is_platform_url("https://chat.example.com:8443/x.png"));
        assert!(!host.is_platform_url("http://chat.example.com/x.png"));
        assert!(!host.is_platform_url("not a url"));
    }

    /// Serves `/x.png` and remembers the Authorization header of the last request.
    async fn spawn_recorder() -> (String, Arc<Mutex<Option<Option<String>>>>) {
        let seen: Arc<Mutex<Option<Option<String>>>> = Arc::new(Mutex::new(None));
        let recorded = seen.clone();
        let app = Router::new().route(
            "/x.png",
            get(move |headers: HeaderMap| {
                let recorded = recorded.clone();
                async move {
                    let auth = headers
                        .get("Authorization")
                        .and_then(|v| v.to_str().ok())
                        .map(str::to_string);
                    *recorded.lock().unwrap() = Some(auth);
                    PNG.to_vec()
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (format!("http://{addr}"), seen)
    }

    #[tokio::test]
    async fn test_fetch_image_sends_token_only_to_platform_origin() {
        let (server, seen) = spawn_recorder().await;

        // Same host text, different port: a foreign origin.
        let host = AccordHost::new("http://127.0.0.1".to_string(), Some("secret".to_string()));
        host.fetch_image(&format!("{server}/x.png")).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(None));

        let host = AccordHost::new(server.clone(), Some("secret".to_string()));
        host.fetch_image(&format!("{server}/x.png")).await.unwrap();
        assert_eq!(
            *seen.lock().unwrap(),
            Some(Some("Bot secret".to_string()))
        );
    }

    #[tokio::test]
    async fn test_fetch_image_resolves_relative_paths() {
        let base = spawn_platform().await;
        let host = AccordHost::new(base, Some("secret".to_string()));
        let bytes = host.fetch_image("/cdn/emojis/1.gif").await.unwrap();
        assert_eq!(bytes, PNG);
    }
}
