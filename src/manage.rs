//! Adding emojis to a server, one at a time or in bulk from the catalog.

use std::collections::HashSet;

use crate::catalog::CatalogEntry;
use crate::config::ConfigStore;
use crate::error::AppError;
use crate::models::emoji::GuildEmoji;
use crate::models::permission::{has_permission, MANAGE_EMOJIS};
use crate::platform::{EmojiHost, HostError};
use crate::storage;

pub const MAX_UPLOAD_AMOUNT: u32 = 100;
pub const MIN_EMOJI_NAME_LEN: usize = 2;
pub const MAX_EMOJI_NAME_LEN: usize = 32;
/// Bulk operations report progress after this many successes.
pub const PROGRESS_INTERVAL: usize = 5;

/// Callers with `manage_emojis` (or `administrator`) may always add emojis;
/// everyone else only when the server has opted in.
pub fn can_manage_emojis(config: &dyn ConfigStore, guild_id: &str, permissions: &[String]) -> bool {
    has_permission(permissions, MANAGE_EMOJIS) || config.members_may_add_emojis(guild_id)
}

/// Turn a catalog title into a platform emoji name: whitespace becomes `_`,
/// anything else outside `[A-Za-z0-9_]` is dropped, capped at 32 characters.
pub fn emoji_name_from_title(title: &str) -> Option<String> {
    let name: String = title
        .trim()
        .chars()
        .filter_map(|c| {
            if c.is_whitespace() {
                Some('_')
            } else if c.is_ascii_alphanumeric() || c == '_' {
                Some(c)
            } else {
                None
            }
        })
        .take(MAX_EMOJI_NAME_LEN)
        .collect();

    if name.len() < MIN_EMOJI_NAME_LEN {
        None
    } else {
        Some(name)
    }
}

pub fn validate_emoji_name(name: &str) -> Result<(), AppError> {
    let len = name.chars().count();
    if !(MIN_EMOJI_NAME_LEN..=MAX_EMOJI_NAME_LEN).contains(&len) {
        return Err(AppError::BadRequest(format!(
            "emoji name must be between {MIN_EMOJI_NAME_LEN} and {MAX_EMOJI_NAME_LEN} characters"
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AppError::BadRequest(
            "emoji name may only contain letters, digits and underscores".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_upload_amount(amount: i64) -> Result<u32, AppError> {
    u32::try_from(amount)
        .ok()
        .filter(|a| (1..=MAX_UPLOAD_AMOUNT).contains(a))
        .ok_or_else(|| {
            AppError::BadRequest(format!("amount must be between 1 and {MAX_UPLOAD_AMOUNT}"))
        })
}

/// Download an image and add it to the server under `name`.
pub async fn add_emoji(
    host: &dyn EmojiHost,
    guild_id: &str,
    url: &str,
    name: &str,
) -> Result<GuildEmoji, AppError> {
    validate_emoji_name(name)?;

    let existing = host.list_emojis(guild_id).await?;
    if existing.iter().any(|e| e.name == name) {
        return Err(AppError::Conflict(format!(
            "an emoji named `{name}` already exists in this server"
        )));
    }

    let bytes = host
        .fetch_image(url)
        .await
        .map_err(|e| AppError::BadRequest(format!("failed to download emoji: {e}")))?;
    storage::check_emoji_size(&bytes)?;

    let emoji = host.create_emoji(guild_id, name, &bytes).await?;
    tracing::info!("added emoji {name} to guild {guild_id}");
    Ok(emoji)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub requested: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// The platform refused further uploads.
    pub aborted: bool,
}

/// Upload up to `amount` entries, walking `candidates` in order.
///
/// Names already on the server (or uploaded earlier in this run) are skipped.
/// Individual download or create failures are counted and the run continues;
/// a permission error ends it.
pub async fn upload_from_catalog(
    host: &dyn EmojiHost,
    guild_id: &str,
    candidates: &[CatalogEntry],
    amount: u32,
    progress: &mut (dyn FnMut(&UploadSummary) + Send),
) -> Result<UploadSummary, AppError> {
    let amount = validate_upload_amount(i64::from(amount))?;

    let mut existing: HashSet<String> = host
        .list_emojis(guild_id)
        .await?
        .into_iter()
        .map(|e| e.name)
        .collect();

    let mut summary = UploadSummary {
        requested: amount as usize,
        ..UploadSummary::default()
    };

    for entry in candidates {
        if summary.uploaded >= summary.requested {
            break;
        }

        let Some(name) = emoji_name_from_title(&entry.title) else {
            summary.failed += 1;
            continue;
        };
        if existing.contains(&name) {
            summary.skipped += 1;
            continue;
        }

        let bytes = match host.fetch_image(&entry.image).await {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::debug!("failed to download {}: {e}", entry.image);
                summary.failed += 1;
                continue;
            }
        };
        if bytes.len() > storage::MAX_EMOJI_SIZE {
            summary.failed += 1;
            continue;
        }

        match host.create_emoji(guild_id, &name, &bytes).await {
            Ok(_) => {
                summary.uploaded += 1;
                existing.insert(name);
                if summary.uploaded % PROGRESS_INTERVAL == 0 {
                    progress(&summary);
                }
            }
            Err(HostError::Forbidden(e)) => {
                tracing::warn!("upload to guild {guild_id} refused: {e}");
                summary.aborted = true;
                break;
            }
            Err(e) => {
                tracing::error!("error uploading emoji {name}: {e}");
                summary.failed += 1;
            }
        }
    }

    progress(&summary);
    tracing::info!(
        "uploaded {} emojis to guild {guild_id} ({} skipped, {} failed)",
        summary.uploaded,
        summary.skipped,
        summary.failed
    );
    Ok(summary)
}

/// Find a server emoji by numeric id or case-insensitive name.
pub fn retrieve<'a>(emojis: &'a [GuildEmoji], identifier: &str) -> Option<&'a GuildEmoji> {
    let identifier = identifier.trim();
    let numeric = !identifier.is_empty() && identifier.chars().all(|c| c.is_ascii_digit());
    emojis.iter().find(|e| {
        (numeric && e.id == identifier) || e.name.eq_ignore_ascii_case(identifier)
    })
}
