use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::{json, Value};

use crate::storage;

/// Process-level settings: where things live and how to reach the platform.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub config_path: PathBuf,
    pub settings_path: PathBuf,
    pub keywords_path: PathBuf,
    pub backup_dir: PathBuf,
    pub platform_url: String,
    pub bot_token: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        let path_var = |name: &str, default: &str| {
            std::env::var(name)
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(default))
        };

        Self {
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(39100),
            config_path: path_var("EMOJIBOT_CONFIG", "config.json"),
            settings_path: path_var("EMOJIBOT_SETTINGS", "settings.json"),
            keywords_path: path_var("EMOJIBOT_KEYWORDS", "adult_keywords.json"),
            backup_dir: path_var("EMOJIBOT_BACKUP_DIR", "emoji_backups"),
            platform_url: std::env::var("ACCORD_URL")
                .unwrap_or_else(|_| "http://localhost:39099".to_string()),
            bot_token: std::env::var("BOT_TOKEN").ok().filter(|t| !t.is_empty()),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Serialize(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "failed to persist settings: {e}"),
            ConfigError::Serialize(e) => write!(f, "failed to serialize settings: {e}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(e: std::io::Error) -> Self {
        ConfigError::Io(e)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(e: serde_json::Error) -> Self {
        ConfigError::Serialize(e)
    }
}

/// Per-server key controlling whether regular members may add emojis.
pub const MEMBERS_ALLOW_KEY: &str = "members_allow";

/// Read access to global settings plus read/write access to per-server settings.
///
/// Keys are dotted paths into the global document, e.g. `api.base_url`.
pub trait ConfigStore: Send + Sync {
    fn get(&self, key: &str) -> Option<Value>;

    fn server_setting(&self, server_id: &str, key: &str) -> Option<Value>;

    /// Sets a per-server value and persists it before returning.
    fn set_server_setting(&self, server_id: &str, key: &str, value: Value)
        -> Result<(), ConfigError>;

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.get(key).and_then(|v| v.as_u64()).unwrap_or(default)
    }

    fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
    }

    fn get_str(&self, key: &str, default: &str) -> String {
        self.get(key)
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_else(|| default.to_string())
    }

    fn members_may_add_emojis(&self, server_id: &str) -> bool {
        self.server_setting(server_id, MEMBERS_ALLOW_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn set_members_may_add_emojis(&self, server_id: &str, allow: bool) -> Result<(), ConfigError> {
        self.set_server_setting(server_id, MEMBERS_ALLOW_KEY, Value::Bool(allow))
    }
}

/// Built-in values used for any key the global document does not provide.
pub fn default_document() -> Value {
    json!({
        "api": {
            "base_url": "https://emoji.gg/api",
            "cache_ttl": 3600,
            "fetch_timeout": 10,
            "rate_limit_per_user": 10,
            "rate_limit_window": 60
        },
        "emoji_quality": {
            "min_favorites": 0,
            "min_file_size": 100,
            "max_file_size": 256000,
            "excluded_categories": [],
            "adult_filter_enabled": true
        },
        "defaults": {
            "upload_limit": 50,
            "search_limit": 10
        }
    })
}

/// `ConfigStore` backed by two JSON documents on disk.
pub struct FileConfigStore {
    document: Value,
    defaults: Value,
    settings_path: PathBuf,
    servers: Mutex<BTreeMap<String, serde_json::Map<String, Value>>>,
}

impl FileConfigStore {
    /// Load both documents. Missing or unreadable documents fall back to
    /// defaults (global) or an empty map (per-server) with a warning.
    pub fn load(config_path: &Path, settings_path: &Path) -> Self {
        let document = read_document(config_path, "config").unwrap_or_else(|| json!({}));
        let servers = read_document(settings_path, "settings")
            .and_then(|v| match v {
                Value::Object(map) => Some(map),
                _ => {
                    tracing::warn!("settings document {:?} is not an object, ignoring", settings_path);
                    None
                }
            })
            .map(|map| {
                map.into_iter()
                    .filter_map(|(server, settings)| match settings {
                        Value::Object(s) => Some((server, s)),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self::from_parts(document, settings_path.to_path_buf(), servers)
    }

    pub fn from_parts(
        document: Value,
        settings_path: PathBuf,
        servers: BTreeMap<String, serde_json::Map<String, Value>>,
    ) -> Self {
        Self {
            document,
            defaults: default_document(),
            settings_path,
            servers: Mutex::new(servers),
        }
    }

    fn persist(
        &self,
        servers: &BTreeMap<String, serde_json::Map<String, Value>>,
    ) -> Result<(), ConfigError> {
        let bytes = serde_json::to_vec_pretty(servers)?;
        storage::write_atomic(&self.settings_path, &bytes)?;
        Ok(())
    }
}

impl ConfigStore for FileConfigStore {
    fn get(&self, key: &str) -> Option<Value> {
        lookup(&self.document, key)
            .or_else(|| lookup(&self.defaults, key))
            .cloned()
    }

    fn server_setting(&self, server_id: &str, key: &str) -> Option<Value> {
        let servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        servers.get(server_id).and_then(|s| s.get(key)).cloned()
    }

    fn set_server_setting(
        &self,
        server_id: &str,
        key: &str,
        value: Value,
    ) -> Result<(), ConfigError> {
        let mut servers = self.servers.lock().unwrap_or_else(|e| e.into_inner());
        let previous = servers
            .entry(server_id.to_string())
            .or_default()
            .insert(key.to_string(), value);

        if let Err(e) = self.persist(&servers) {
            // Keep memory in line with what is on disk.
            if let Some(settings) = servers.get_mut(server_id) {
                match previous {
                    Some(old) => {
                        settings.insert(key.to_string(), old);
                    }
                    None => {
                        settings.remove(key);
                    }
                }
                if settings.is_empty() {
                    servers.remove(server_id);
                }
            }
            tracing::error!("failed to save settings for server {server_id}: {e}");
            return Err(e);
        }
        Ok(())
    }
}

fn read_document(path: &Path, label: &str) -> Option<Value> {
    if !path.exists() {
        tracing::warn!("{label} file not found: {:?}, using defaults", path);
        return None;
    }
    let raw = match std::fs::read(path) {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!("failed to read {label} file {:?}: {e}", path);
            return None;
        }
    };
    match serde_json::from_slice(&raw) {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::error!("failed to parse {label} file {:?}: {e}", path);
            None
        }
    }
}

/// Resolve a dotted key. `null` is treated as absent.
fn lookup<'a>(root: &'a Value, key: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in key.split('.') {
        current = current.as_object()?.get(part)?;
    }
    if current.is_null() {
        None
    } else {
        Some(current)
    }
}
