use crate::backup::{DeleteAllOutcome, RestoreSummary};
use crate::error::AppError;
use crate::models::embed::{Embed, COLOR_BLUE, COLOR_GREEN, COLOR_RED};
use crate::models::interaction::InteractionResponse;
use crate::models::permission::MANAGE_EMOJIS;

use super::CommandContext;

const MAX_LISTED_BACKUPS: usize = 10;

fn kilobytes(bytes: u64) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}

pub async fn backup(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ctx.require_permission(MANAGE_EMOJIS)?;
    let name = ctx.required_str("name")?;

    let report = ctx
        .state
        .backups
        .create(ctx.state.host.as_ref(), guild_id, &name)
        .await?;

    let embed = Embed::new("✅ Backup Complete", COLOR_GREEN)
        .description(format!("Backed up **{}** emojis", report.archived))
        .field("Backup Name", format!("`{}`", report.name), true)
        .field("File Size", kilobytes(report.size_bytes), true)
        .field("Failed", report.failed.to_string(), true);
    Ok(InteractionResponse::embed(embed))
}

pub async fn list(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ctx.require_permission(MANAGE_EMOJIS)?;

    let backups = ctx.state.backups.list(guild_id).await?;
    if backups.is_empty() {
        return Ok(
            InteractionResponse::content("❌ No backups found for this server.").ephemeral(),
        );
    }

    let mut embed = Embed::new("💾 Server Backups", COLOR_BLUE)
        .description(format!("Found {} backup(s)", backups.len()));
    for backup in backups.iter().take(MAX_LISTED_BACKUPS) {
        embed = embed.field(
            format!("📦 {}", backup.name),
            format!(
                "Size: {}\nCreated: {}",
                kilobytes(backup.size_bytes),
                backup.modified.format("%Y-%m-%d %H:%M")
            ),
            true,
        );
    }
    Ok(InteractionResponse::embed(embed))
}

pub async fn restore(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ctx.require_permission(MANAGE_EMOJIS)?;
    let name = ctx.required_str("name")?;

    let mut report = |s: &RestoreSummary| {
        tracing::info!(
            "restore progress for guild {guild_id}: {}/{} restored",
            s.restored,
            s.total
        );
    };
    let summary = ctx
        .state
        .backups
        .restore(ctx.state.host.as_ref(), guild_id, &name, &mut report)
        .await?;

    let (title, color) = if summary.aborted {
        ("⚠️ Restore Stopped", COLOR_RED)
    } else {
        ("✅ Restore Complete", COLOR_GREEN)
    };
    let mut embed = Embed::new(title, color).description(format!(
        "**Restored:** {} emojis\n**Failed:** {}",
        summary.restored, summary.failed
    ));
    if summary.aborted {
        embed = embed.footer("The bot lacks the manage_emojis permission on this server.");
    }
    Ok(InteractionResponse::embed(embed))
}

pub async fn delete_all(ctx: &CommandContext<'_>) -> Result<InteractionResponse, AppError> {
    let guild_id = ctx.guild()?;
    ctx.require_permission(MANAGE_EMOJIS)?;
    let confirm = ctx.data.option_bool("confirm").unwrap_or(false);

    let outcome = ctx
        .state
        .backups
        .delete_all(ctx.state.host.as_ref(), guild_id, confirm)
        .await?;

    Ok(match outcome {
        DeleteAllOutcome::NeedsConfirmation { count } => InteractionResponse::embed(
            Embed::new("⚠️ Delete All Emojis", COLOR_RED).description(format!(
                "This will delete **{count}** emojis from this server.\n\
                 A backup will be created automatically.\n\
                 Run the command again with `confirm: true` to proceed."
            )),
        )
        .ephemeral(),
        DeleteAllOutcome::Deleted {
            deleted,
            failed,
            backup,
        } => {
            let mut text = format!(
                "✅ Deleted {deleted} emojis. Backup saved as `{}`.",
                backup.name
            );
            if failed > 0 {
                text.push_str(&format!(" {failed} could not be deleted."));
            }
            InteractionResponse::content(text)
        }
    })
}
