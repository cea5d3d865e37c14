use std::collections::HashMap;
use std::path::Path;

use rand::seq::SliceRandom;

use super::{CatalogEntry, CatalogId};
use crate::config::ConfigStore;

const MIN_TITLE_LEN: usize = 2;
const MAX_TITLE_LEN: usize = 100;
/// Titles where more than this share of characters are symbols are treated as spam.
const MAX_SPECIAL_CHAR_RATIO: f64 = 0.3;

/// Quality floor applied to every filter pass.
#[derive(Debug, Clone, PartialEq)]
pub struct QualityRules {
    pub min_favorites: u64,
    pub min_file_size: u64,
    pub max_file_size: u64,
    pub excluded_categories: Vec<CatalogId>,
    pub adult_filter_enabled: bool,
}

impl Default for QualityRules {
    fn default() -> Self {
        Self {
            min_favorites: 0,
            min_file_size: 100,
            max_file_size: 256_000,
            excluded_categories: Vec::new(),
            adult_filter_enabled: true,
        }
    }
}

impl QualityRules {
    pub fn from_config(config: &dyn ConfigStore) -> Self {
        let defaults = Self::default();
        let excluded_categories = config
            .get("emoji_quality.excluded_categories")
            .and_then(|v| match v {
                serde_json::Value::Array(items) => Some(
                    items
                        .into_iter()
                        .filter_map(|item| serde_json::from_value(item).ok())
                        .collect(),
                ),
                _ => None,
            })
            .unwrap_or_default();

        Self {
            min_favorites: config.get_u64("emoji_quality.min_favorites", defaults.min_favorites),
            min_file_size: config.get_u64("emoji_quality.min_file_size", defaults.min_file_size),
            max_file_size: config.get_u64("emoji_quality.max_file_size", defaults.max_file_size),
            excluded_categories,
            adult_filter_enabled: config.get_bool(
                "emoji_quality.adult_filter_enabled",
                defaults.adult_filter_enabled,
            ),
        }
    }
}

/// Per-query filter options.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterCriteria {
    pub category: Option<CatalogId>,
    pub include_animated: bool,
    pub adult_filter: bool,
    pub min_favorites: Option<u64>,
    pub query: Option<String>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            category: None,
            include_animated: true,
            adult_filter: true,
            min_favorites: None,
            query: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortMode {
    Favorites,
    Title,
    Recent,
    Random,
    Unsorted,
}

impl SortMode {
    /// Unrecognized names sort nothing.
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "favorites" => SortMode::Favorites,
            "title" => SortMode::Title,
            "recent" => SortMode::Recent,
            "random" => SortMode::Random,
            _ => SortMode::Unsorted,
        }
    }
}

/// Pure filter/rank pipeline over catalog entries. Holds no mutable state.
#[derive(Debug, Clone, Default)]
pub struct FilterRankEngine {
    rules: QualityRules,
    adult_keywords: Vec<String>,
}

impl FilterRankEngine {
    pub fn new(rules: QualityRules, adult_keywords: Vec<String>) -> Self {
        let adult_keywords = adult_keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();
        Self {
            rules,
            adult_keywords,
        }
    }

    pub fn adult_keyword_count(&self) -> usize {
        self.adult_keywords.len()
    }

    /// Read the adult keyword list (a JSON array of strings). A missing or
    /// unreadable document yields no keywords.
    pub fn load_adult_keywords(path: &Path) -> Vec<String> {
        if !path.exists() {
            tracing::warn!("adult keyword file not found: {:?}", path);
            return Vec::new();
        }
        let parsed = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|raw| serde_json::from_slice::<Vec<String>>(&raw).map_err(|e| e.to_string()));
        match parsed {
            Ok(keywords) => {
                tracing::info!("loaded {} adult keywords", keywords.len());
                keywords
            }
            Err(e) => {
                tracing::error!("error loading adult keywords from {:?}: {e}", path);
                Vec::new()
            }
        }
    }

    pub fn filter(&self, entries: &[CatalogEntry], criteria: &FilterCriteria) -> Vec<CatalogEntry> {
        let query = criteria
            .query
            .as_deref()
            .filter(|q| !q.is_empty())
            .map(str::to_lowercase);
        let adult_filter = criteria.adult_filter && self.rules.adult_filter_enabled;

        let filtered: Vec<CatalogEntry> = entries
            .iter()
            .filter(|entry| {
                if let Some(category) = &criteria.category {
                    if entry.category.as_ref() != Some(category) {
                        return false;
                    }
                }
                if !criteria.include_animated && entry.is_animated() {
                    return false;
                }
                if adult_filter && self.contains_adult_content(entry) {
                    return false;
                }
                if !self.is_quality(entry) {
                    return false;
                }
                if let Some(min) = criteria.min_favorites {
                    if entry.faves < min {
                        return false;
                    }
                }
                if let Some(query) = &query {
                    let in_title = entry.title.to_lowercase().contains(query.as_str());
                    let in_description = entry
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(query.as_str()));
                    if !in_title && !in_description {
                        return false;
                    }
                }
                true
            })
            .cloned()
            .collect();

        tracing::debug!("filtered {} emojis to {}", entries.len(), filtered.len());
        filtered
    }

    pub fn rank(&self, entries: &[CatalogEntry], mode: SortMode) -> Vec<CatalogEntry> {
        let mut ranked = entries.to_vec();
        match mode {
            SortMode::Favorites => ranked.sort_by(|a, b| b.faves.cmp(&a.faves)),
            SortMode::Title => ranked.sort_by_cached_key(|e| e.title.to_lowercase()),
            SortMode::Recent => ranked.sort_by(|a, b| b.id.recency_cmp(&a.id)),
            SortMode::Random => ranked.shuffle(&mut rand::thread_rng()),
            SortMode::Unsorted => {}
        }
        ranked
    }

    /// Most-favorited entries that pass the adult and quality filters.
    /// A non-positive `limit` yields nothing.
    pub fn trending(
        &self,
        entries: &[CatalogEntry],
        limit: i64,
        category: Option<&CatalogId>,
    ) -> Vec<CatalogEntry> {
        let limit = usize::try_from(limit).unwrap_or(0);
        if limit == 0 {
            return Vec::new();
        }
        let criteria = FilterCriteria {
            category: category.cloned(),
            adult_filter: true,
            ..FilterCriteria::default()
        };
        let mut ranked = self.rank(&self.filter(entries, &criteria), SortMode::Favorites);
        ranked.truncate(limit);
        ranked
    }

    /// Number of entries per category id. Entries without a category are not counted.
    pub fn category_counts(entries: &[CatalogEntry]) -> HashMap<CatalogId, usize> {
        let mut counts = HashMap::new();
        for category in entries.iter().filter_map(|e| e.category.as_ref()) {
            *counts.entry(category.clone()).or_insert(0) += 1;
        }
        counts
    }

    fn contains_adult_content(&self, entry: &CatalogEntry) -> bool {
        if self.adult_keywords.is_empty() {
            return false;
        }
        let title = entry.title.to_lowercase();
        let description = entry.description.as_deref().unwrap_or_default().to_lowercase();
        let slug = entry.slug.as_deref().unwrap_or_default().to_lowercase();

        let hit = self.adult_keywords.iter().find(|keyword| {
            title.contains(keyword.as_str())
                || description.contains(keyword.as_str())
                || slug.contains(keyword.as_str())
        });
        if let Some(keyword) = hit {
            tracing::debug!("adult content in emoji {:?} (keyword {keyword:?})", entry.title);
            return true;
        }
        false
    }

    fn is_quality(&self, entry: &CatalogEntry) -> bool {
        let rules = &self.rules;
        if entry.faves < rules.min_favorites {
            return false;
        }

        if let Some(category) = &entry.category {
            if rules.excluded_categories.contains(category) {
                return false;
            }
        }

        // Unknown sizes pass; known sizes must be in range.
        if let Some(size) = entry.reported_size() {
            if size < rules.min_file_size || size > rules.max_file_size {
                tracing::debug!("emoji {:?} rejected: filesize {size}", entry.title);
                return false;
            }
        }

        let title_len = entry.title.chars().count();
        if !(MIN_TITLE_LEN..=MAX_TITLE_LEN).contains(&title_len) {
            return false;
        }

        let special = entry
            .title
            .chars()
            .filter(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || c.is_whitespace()))
            .count();
        if special as f64 > title_len as f64 * MAX_SPECIAL_CHAR_RATIO {
            tracing::debug!("emoji {:?} rejected: too many special characters", entry.title);
            return false;
        }

        true
    }
}
