use crate::catalog::{CatalogEntry, CatalogId, FilterCriteria, FilterRankEngine, SortMode};
use crate::error::AppError;
use crate::models::embed::{Embed, COLOR_BLUE, COLOR_GOLD, COLOR_PURPLE};
use crate::models::interaction::InteractionResponse;

use super::CommandContext;

/// Embeds list at most this many emojis.
const MAX_EMBED_ITEMS: usize = 10;
const MAX_LISTED_CATEGORIES: usize = 20;

fn fetch_failed() -> InteractionResponse {
    InteractionResponse::content("❌ Failed to fetch emojis from API.")
}

/// `defaults.search_limit`, used when a command is given no limit.
fn default_limit(ctx: &CommandContext<'_>) -> i64 {
    i64::try_from(ctx.state.config.get_u64("defaults.search_limit", 10)).unwrap_or(i64::MAX)
}

/// Non-positive limits show nothing.
fn clamp_limit(limit: i64) -> usize {
    usize::try_from(limit).unwrap_or(0)
}

fn add_entry_fields<'a>(
    mut embed: Embed,
    entries: impl Iterator<Item = &'a CatalogEntry>,
    numbered: bool,
) -> Embed {
    for (i, entry) in entries.take(MAX_EMBED_ITEMS).enumerate() {
        let kind = if entry.is_animated() { "🎬" } else { "🖼️" };
        let title = if entry.title.is_empty() { "Unknown" } else { entry.title.as_str() };
        let name = if numbered {
            format!("#{} {kind} {title}", i + 1)
        } else {
            format!("{kind} {title}")
        };
        embed = embed.field(
            name,
            format!("❤️ {} favorites\n[View]({})", entry.faves, entry.image),
            true,
        );
    }
    embed
}

pub async fn search(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let query = ctx.required_str("query")?;
    let limit = clamp_limit(ctx.data.option_i64("limit").unwrap_or_else(|| default_limit(ctx)));

    let entries = ctx.state.cache.emojis(&ctx.state.catalog_url(), false).await;
    if entries.is_empty() {
        return Ok(fetch_failed());
    }
    let category = match ctx.category().await {
        Ok(category) => category,
        Err(reply) => return Ok(reply),
    };

    let criteria = FilterCriteria {
        category,
        query: Some(query.clone()),
        ..FilterCriteria::default()
    };
    let engine = &ctx.state.engine;
    let filtered = engine.filter(&entries, &criteria);
    if filtered.is_empty() {
        return Ok(InteractionResponse::content(format!(
            "❌ No emojis found matching `{query}`."
        )));
    }

    let ranked = engine.rank(&filtered, SortMode::Favorites);
    let results = &ranked[..limit.min(ranked.len())];
    let embed = Embed::new(format!("🔍 Search Results for '{query}'"), COLOR_BLUE).description(
        format!(
            "Found {} emojis (showing top {})",
            filtered.len(),
            results.len()
        ),
    );
    Ok(InteractionResponse::embed(add_entry_fields(
        embed,
        results.iter(),
        false,
    )))
}

pub async fn trending(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let limit = ctx.data.option_i64("limit").unwrap_or_else(|| default_limit(ctx));

    let entries = ctx.state.cache.emojis(&ctx.state.catalog_url(), false).await;
    if entries.is_empty() {
        return Ok(fetch_failed());
    }
    let category = match ctx.category().await {
        Ok(category) => category,
        Err(reply) => return Ok(reply),
    };

    let top = ctx.state.engine.trending(&entries, limit, category.as_ref());
    if top.is_empty() {
        return Ok(InteractionResponse::content("❌ No trending emojis found."));
    }

    let embed = Embed::new("🔥 Trending Emojis", COLOR_GOLD)
        .description(format!("Top {} most popular emojis", top.len()));
    Ok(InteractionResponse::embed(add_entry_fields(
        embed,
        top.iter(),
        true,
    )))
}

pub async fn categories(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let url = ctx.state.catalog_url();
    let categories = ctx.state.cache.categories(&url, false).await;
    if categories.is_empty() {
        return Ok(InteractionResponse::content("❌ Failed to fetch categories."));
    }

    let entries = ctx.state.cache.emojis(&url, false).await;
    let counts = FilterRankEngine::category_counts(&entries);
    let count_of = |id: &CatalogId| counts.get(id).copied().unwrap_or(0);

    let mut sorted: Vec<_> = categories.iter().collect();
    sorted.sort_by(|a, b| count_of(&b.id).cmp(&count_of(&a.id)));

    let listing: String = sorted
        .iter()
        .take(MAX_LISTED_CATEGORIES)
        .map(|c| {
            let name = if c.name.is_empty() { "Unknown" } else { c.name.as_str() };
            format!("**{name}** - {} emojis\n", count_of(&c.id))
        })
        .collect();

    let embed = Embed::new("📂 Emoji Categories", COLOR_PURPLE)
        .description(listing)
        .footer(format!("Total: {} categories", categories.len()));
    Ok(InteractionResponse::embed(embed))
}

pub async fn random(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let count = clamp_limit(ctx.data.option_i64("count").unwrap_or(5));

    let entries = ctx.state.cache.emojis(&ctx.state.catalog_url(), false).await;
    if entries.is_empty() {
        return Ok(fetch_failed());
    }
    let category = match ctx.category().await {
        Ok(category) => category,
        Err(reply) => return Ok(reply),
    };

    let engine = &ctx.state.engine;
    let criteria = FilterCriteria {
        category,
        ..FilterCriteria::default()
    };
    let filtered = engine.filter(&entries, &criteria);
    if filtered.is_empty() {
        return Ok(InteractionResponse::content("❌ No emojis found."));
    }

    let shuffled = engine.rank(&filtered, SortMode::Random);
    let results = &shuffled[..count.min(shuffled.len())];
    let embed = Embed::new("🎲 Random Emojis", COLOR_BLUE)
        .description(format!("Here are {} random emojis", results.len()));
    Ok(InteractionResponse::embed(add_entry_fields(
        embed,
        results.iter(),
        false,
    )))
}
