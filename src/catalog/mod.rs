//! Third-party emoji catalog: typed records, the TTL cache in front of the
//! catalog API, and the filter/rank pipeline applied to cached entries.

pub mod cache;
pub mod filter;

use std::cmp::Ordering;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub use cache::{CacheStats, CatalogCache, CollectionKind, FetchError, SlotStats};
pub use filter::{FilterCriteria, FilterRankEngine, QualityRules, SortMode};

/// Catalog identifiers arrive as either JSON numbers or strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CatalogId {
    Int(i64),
    Text(String),
}

impl CatalogId {
    fn as_number(&self) -> Option<i64> {
        match self {
            CatalogId::Int(n) => Some(*n),
            CatalogId::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Ordering used as a recency proxy: numeric where possible, numbers
    /// before non-numeric text, text compared lexicographically.
    pub fn recency_cmp(&self, other: &CatalogId) -> Ordering {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => self.to_string().cmp(&other.to_string()),
        }
    }
}

impl fmt::Display for CatalogId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogId::Int(n) => write!(f, "{n}"),
            CatalogId::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for CatalogId {
    fn from(n: i64) -> Self {
        CatalogId::Int(n)
    }
}

impl From<&str> for CatalogId {
    fn from(s: &str) -> Self {
        CatalogId::Text(s.to_string())
    }
}

/// One emoji in the catalog, as of a single fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: CatalogId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub category: Option<CatalogId>,
    #[serde(default)]
    pub faves: u64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
}

impl CatalogEntry {
    pub fn is_animated(&self) -> bool {
        self.image.to_ascii_lowercase().ends_with(".gif")
    }

    /// File size, if the catalog reported a usable one. Zero means unknown.
    pub fn reported_size(&self) -> Option<u64> {
        self.filesize.filter(|size| *size > 0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Category {
    pub id: CatalogId,
    #[serde(default)]
    pub name: String,
}

/// Packs are passed through untouched.
pub type Pack = serde_json::Value;

/// Find a category id by case-insensitive name.
pub fn resolve_category(categories: &[Category], name: &str) -> Option<CatalogId> {
    categories
        .iter()
        .find(|c| c.name.eq_ignore_ascii_case(name.trim()))
        .map(|c| c.id.clone())
}

/// Decode a JSON array element by element. Elements that do not match `T`
/// are dropped with a warning; anything other than an array is an error.
pub(crate) fn decode_list<T: DeserializeOwned>(
    body: serde_json::Value,
    kind: CollectionKind,
) -> Result<Vec<T>, FetchError> {
    let items = match body {
        serde_json::Value::Array(items) => items,
        other => {
            return Err(FetchError::NotAList {
                kind,
                found: json_type_name(&other),
            })
        }
    };

    let total = items.len();
    let decoded: Vec<T> = items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!("dropping malformed {kind} element: {e}");
                None
            }
        })
        .collect();

    if decoded.len() < total {
        tracing::warn!(
            "dropped {} malformed {kind} element(s) out of {total}",
            total - decoded.len()
        );
    }
    Ok(decoded)
}

fn json_type_name(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
