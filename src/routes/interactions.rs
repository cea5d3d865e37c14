use axum::extract::State;
use axum::Json;

use crate::catalog::CacheStats;
use crate::commands;
use crate::error::AppError;
use crate::models::interaction::{Command, Interaction, InteractionResponse};
use crate::models::DataResponse;
use crate::state::AppState;

pub async fn list_commands() -> Json<DataResponse<Vec<Command>>> {
    Json(DataResponse::new(commands::definitions()))
}

pub async fn handle_interaction(
    State(state): State<AppState>,
    Json(interaction): Json<Interaction>,
) -> Result<Json<InteractionResponse>, AppError> {
    if interaction.interaction_type == "ping" {
        return Ok(Json(InteractionResponse::content("pong")));
    }
    let response = commands::dispatch(&state, &interaction).await?;
    Ok(Json(response))
}

pub async fn cache_stats(State(state): State<AppState>) -> Json<DataResponse<CacheStats>> {
    Json(DataResponse::new(state.cache.stats()))
}
