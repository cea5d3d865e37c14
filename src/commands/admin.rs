use crate::catalog::SlotStats;
use crate::error::AppError;
use crate::models::embed::{Embed, COLOR_BLUE};
use crate::models::interaction::InteractionResponse;
use crate::models::permission::ADMINISTRATOR;

use super::CommandContext;

pub fn members_allow(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ctx.require_permission(ADMINISTRATOR)?;
    let allow = ctx
        .data
        .option_bool("allow")
        .ok_or_else(|| AppError::BadRequest("missing required option `allow`".to_string()))?;

    ctx.state.config.set_members_may_add_emojis(guild_id, allow)?;
    tracing::info!("set members_allow to {allow} for guild {guild_id}");

    let status = if allow { "allowed" } else { "not allowed" };
    Ok(InteractionResponse::content(format!(
        "✅ Emoji additions by regular members are now **{status}**."
    )))
}

pub fn clear_cache(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    ctx.require_permission(ADMINISTRATOR)?;
    ctx.state.cache.clear();
    tracing::info!("cache cleared by {} in {:?}", ctx.user_id, ctx.space_id);
    Ok(InteractionResponse::content(
        "✅ Cache cleared. Next API request will fetch fresh data.",
    ))
}

fn describe_slot(slot: &SlotStats) -> String {
    if !slot.cached {
        return "❌ Empty".to_string();
    }
    let status = if slot.expired { "⌛ Stale" } else { "✅ Active" };
    format!("{status}\nItems: {}\nAge: {}s", slot.count, slot.age_seconds as u64)
}

pub fn stats(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let state = ctx.state;
    let cache = state.cache.stats();

    let embed = Embed::new("📊 Bot Statistics", COLOR_BLUE)
        .field("🗄️ Emojis", describe_slot(&cache.emojis), true)
        .field("📂 Categories", describe_slot(&cache.categories), true)
        .field("📦 Packs", describe_slot(&cache.packs), true)
        .field("⏱️ Cache TTL", format!("{}s", state.cache.ttl().as_secs()), true)
        .field(
            "⏳ Rate Limit",
            format!(
                "{} commands per {}s",
                state.rate_limits.capacity(),
                state.rate_limits.window().as_secs()
            ),
            true,
        )
        .field(
            "🛡️ Adult Keywords",
            state.engine.adult_keyword_count().to_string(),
            true,
        )
        .field(
            "🤖 Bot Info",
            format!("Version: {}", env!("CARGO_PKG_VERSION")),
            true,
        );
    Ok(InteractionResponse::embed(embed))
}
