use crate::catalog::{FilterCriteria, SortMode};
use crate::error::AppError;
use crate::manage::{self, UploadSummary};
use crate::models::embed::{Embed, COLOR_GREEN, COLOR_RED};
use crate::models::interaction::InteractionResponse;

use super::CommandContext;

fn ensure_can_manage(ctx: &CommandContext<'_>, guild_id: &str) -> Result<(), AppError> {
    if manage::can_manage_emojis(ctx.state.config.as_ref(), guild_id, ctx.permissions) {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "you don't have permission to add emojis to this server".to_string(),
        ))
    }
}

pub async fn add_emoji(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ensure_can_manage(ctx, guild_id)?;
    let url = ctx.required_str("emoji_url")?;
    let name = ctx.required_str("name")?;

    let emoji = manage::add_emoji(ctx.state.host.as_ref(), guild_id, &url, &name).await?;
    Ok(InteractionResponse::content(format!(
        "✅ Successfully added emoji {} (`{name}`)",
        emoji.mention()
    )))
}

pub async fn upload_emojis(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ensure_can_manage(ctx, guild_id)?;
    let amount = ctx.data.option_i64("amount").unwrap_or_else(|| {
        i64::try_from(ctx.state.config.get_u64("defaults.upload_limit", 50)).unwrap_or(i64::MAX)
    });
    let amount = manage::validate_upload_amount(amount)?;
    let include_animated = ctx.data.option_bool("include_animated").unwrap_or(true);
    let min_favorites = ctx
        .data
        .option_i64("min_favorites")
        .map(|v| u64::try_from(v).unwrap_or(0));

    let entries = ctx.state.cache.emojis(&ctx.state.catalog_url(), false).await;
    if entries.is_empty() {
        return Ok(InteractionResponse::content("❌ Failed to fetch emojis from API."));
    }
    let category = match ctx.category().await {
        Ok(category) => category,
        Err(reply) => return Ok(reply),
    };

    let engine = &ctx.state.engine;
    let criteria = FilterCriteria {
        category,
        include_animated,
        adult_filter: true,
        min_favorites,
        query: None,
    };
    let filtered = engine.filter(&entries, &criteria);
    if filtered.is_empty() {
        return Ok(InteractionResponse::content(
            "❌ No emojis found matching your criteria.",
        ));
    }
    let ranked = engine.rank(&filtered, SortMode::Favorites);

    let mut report = |s: &UploadSummary| {
        tracing::info!(
            "upload progress for guild {guild_id}: {}/{} uploaded, {} skipped, {} failed",
            s.uploaded,
            s.requested,
            s.skipped,
            s.failed
        );
    };
    let summary = manage::upload_from_catalog(
        ctx.state.host.as_ref(),
        guild_id,
        &ranked,
        amount,
        &mut report,
    )
    .await?;

    let (title, color) = if summary.aborted {
        ("⚠️ Upload Stopped", COLOR_RED)
    } else {
        ("✅ Upload Complete", COLOR_GREEN)
    };
    let mut embed = Embed::new(title, color).description(format!(
        "**Uploaded:** {} emojis\n**Skipped:** {} (already exist)\n**Failed:** {}",
        summary.uploaded, summary.skipped, summary.failed
    ));
    if summary.aborted {
        embed = embed.footer("The bot lacks the manage_emojis permission on this server.");
    }
    Ok(InteractionResponse::embed(embed))
}

pub async fn retrieve(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    let identifier = ctx.required_str("identifier")?;
    let emojis = ctx.state.host.list_emojis(guild_id).await?;

    Ok(match manage::retrieve(&emojis, &identifier) {
        Some(emoji) => InteractionResponse::content(emoji.mention()),
        None => InteractionResponse::content(format!(
            "❌ No emoji found with identifier `{identifier}`."
        ))
        .ephemeral(),
    })
}
