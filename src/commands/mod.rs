//! Slash-command handlers. Each command turns an interaction into a reply.

mod admin;
mod backups;
mod emojis;
mod search;

use crate::catalog::{resolve_category, CatalogId};
use crate::error::AppError;
use crate::models::interaction::{
    Command, CommandOption, Interaction, InteractionData, InteractionResponse,
};
use crate::models::permission::has_permission;
use crate::state::AppState;

/// Everything a command handler needs about the invocation.
pub struct CommandContext<'a> {
    pub state: &'a AppState,
    pub data: &'a InteractionData,
    pub space_id: Option<&'a str>,
    pub user_id: &'a str,
    pub permissions: &'a [String],
}

impl CommandContext<'_> {
    /// The server the command was invoked in.
    pub fn guild(&self) -> Result<&str, AppError> {
        self.space_id.ok_or_else(|| {
            AppError::BadRequest("this command can only be used in a server".to_string())
        })
    }

    pub fn require_permission(&self, perm: &str) -> Result<(), AppError> {
        if has_permission(self.permissions, perm) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!("missing permission: {perm}")))
        }
    }

    pub fn required_str(&self, name: &str) -> Result<String, AppError> {
        self.data
            .option_str(name)
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::BadRequest(format!("missing required option `{name}`")))
    }

    /// Resolve the optional `category` option to a catalog id. `Ok(None)` when
    /// the option is absent; an error reply when the name is unknown.
    async fn category(&self) -> Result<Option<CatalogId>, InteractionResponse> {
        let Some(name) = self.data.option_str("category").filter(|s| !s.trim().is_empty()) else {
            return Ok(None);
        };
        let categories = self
            .state
            .cache
            .categories(&self.state.catalog_url(), false)
            .await;
        match resolve_category(&categories, &name) {
            Some(id) => Ok(Some(id)),
            None => Err(InteractionResponse::content(format!(
                "❌ Category `{name}` not found. Use `/categories` to see available categories."
            ))
            .ephemeral()),
        }
    }
}

/// Run the command named in `interaction`.
pub async fn dispatch(
    state: &AppState,
    interaction: &Interaction,
) -> Result<InteractionResponse, AppError> {
    let data = interaction
        .data
        .as_ref()
        .ok_or_else(|| AppError::BadRequest("interaction has no command data".to_string()))?;
    let user_id = interaction.user_id.as_deref().unwrap_or("anonymous");

    state.rate_limits.check(user_id)?;

    let ctx = CommandContext {
        state,
        data,
        space_id: interaction.space_id.as_deref(),
        user_id,
        permissions: &interaction.member_permissions,
    };
    tracing::debug!(
        "command /{} from user {user_id} in {:?}",
        data.name,
        ctx.space_id
    );

    match data.name.as_str() {
        "search" => search::search(&ctx).await,
        "trending" => search::trending(&ctx).await,
        "categories" => search::categories(&ctx).await,
        "random" => search::random(&ctx).await,
        "addemoji" => emojis::add_emoji(&ctx).await,
        "uploademojis" => emojis::upload_emojis(&ctx).await,
        "r" => emojis::retrieve(&ctx).await,
        "backup" => backups::backup(&ctx).await,
        "backups" => backups::list(&ctx).await,
        "uploadbackup" => backups::restore(&ctx).await,
        "deleteallemojis" => backups::delete_all(&ctx).await,
        "membersallow" => admin::members_allow(&ctx),
        "clearcache" => admin::clear_cache(&ctx),
        "stats" => admin::stats(&ctx),
        other => Err(AppError::UnknownCommand(other.to_string())),
    }
}

fn option(name: &str, option_type: &str, description: &str, required: bool) -> CommandOption {
    CommandOption {
        name: name.to_string(),
        description: description.to_string(),
        option_type: option_type.to_string(),
        required,
    }
}

fn command(name: &str, description: &str, options: Vec<CommandOption>) -> Command {
    Command {
        name: name.to_string(),
        description: description.to_string(),
        options,
    }
}

/// The commands this bot answers, for registration with the platform.
pub fn definitions() -> Vec<Command> {
    let category = || option("category", "string", "Filter by category name", false);
    vec![
        command(
            "search",
            "Search for emojis by name or description",
            vec![
                option("query", "string", "Search query", true),
                category(),
                option("limit", "integer", "Maximum number of results (default: 10)", false),
            ],
        ),
        command(
            "trending",
            "Show the most popular emojis",
            vec![
                option("limit", "integer", "Number of emojis to show (default: 10)", false),
                category(),
            ],
        ),
        command("categories", "List all available emoji categories", vec![]),
        command(
            "random",
            "Get random high-quality emojis",
            vec![
                option("count", "integer", "Number of random emojis (default: 5)", false),
                category(),
            ],
        ),
        command(
            "addemoji",
            "Add a custom emoji to the server",
            vec![
                option("emoji_url", "string", "URL of the emoji image", true),
                option("name", "string", "Name for the emoji", true),
            ],
        ),
        command(
            "uploademojis",
            "Upload multiple emojis from the catalog",
            vec![
                option("amount", "integer", "Number of emojis to upload (default: 50)", false),
                category(),
                option("include_animated", "boolean", "Include animated GIF emojis", false),
                option("min_favorites", "integer", "Minimum number of favorites", false),
            ],
        ),
        command(
            "r",
            "Retrieve an emoji by name or ID",
            vec![option("identifier", "string", "Emoji name or ID", true)],
        ),
        command(
            "backup",
            "Backup all server emojis",
            vec![option("name", "string", "Name for this backup", true)],
        ),
        command("backups", "List all available backups", vec![]),
        command(
            "uploadbackup",
            "Restore emojis from a backup",
            vec![option("name", "string", "Name of the backup to restore", true)],
        ),
        command(
            "deleteallemojis",
            "Delete all server emojis (creates backup)",
            vec![option("confirm", "boolean", "Actually delete the emojis", false)],
        ),
        command(
            "membersallow",
            "Allow or disallow regular members to add emojis",
            vec![option("allow", "boolean", "True to allow, false to disallow", true)],
        ),
        command("clearcache", "Clear the emoji cache and force refresh from the API", vec![]),
        command("stats", "Show bot statistics", vec![]),
    ]
}
