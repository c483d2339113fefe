use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, patch, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::{
        admin::{
            ActionResponse, ClaimCardResponse, StartAutomationResponse,
            UpdateStrategyConfigRequest,
        },
        game::GameSummary,
        public::StrategyStateResponse,
    },
    error::AppError,
    services::{admin_service, public_service},
    state::SharedState,
};

/// Routes driving strategy automation of a game.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/games/{game_id}/strategy/state", get(strategy_state))
        .route("/games/{game_id}/strategy/start", post(start_automation))
        .route("/games/{game_id}/strategy/stop", post(stop_automation))
        .route("/games/{game_id}/strategy/config", patch(update_config))
        .route("/games/{game_id}/cards/{card_id}/claim", post(claim_card))
}

/// Start the automation controller of a strategy game.
#[utoipa::path(
    post,
    path = "/games/{game_id}/strategy/start",
    tag = "strategy",
    params(("game_id" = Uuid, Path, description = "Identifier of the strategy game")),
    responses(
        (status = 200, description = "Automation started or already running", body = StartAutomationResponse),
        (status = 400, description = "Game is not a valid strategy game"),
        (status = 404, description = "Game not found"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn start_automation(
    State(state): State<SharedState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<StartAutomationResponse>, AppError> {
    let response = admin_service::start_automation(&state, game_id).await?;
    Ok(Json(response))
}

/// Stop the automation controller of a game.
#[utoipa::path(
    post,
    path = "/games/{game_id}/strategy/stop",
    tag = "strategy",
    params(("game_id" = Uuid, Path, description = "Identifier of the strategy game")),
    responses(
        (status = 200, description = "Automation stopped or was not running", body = ActionResponse)
    )
)]
pub async fn stop_automation(
    State(state): State<SharedState>,
    Path(game_id): Path<Uuid>,
) -> Json<ActionResponse> {
    Json(admin_service::stop_automation(&state, game_id).await)
}

/// Rounds, scheduling and live controller status of a game.
#[utoipa::path(
    get,
    path = "/games/{game_id}/strategy/state",
    tag = "strategy",
    params(("game_id" = Uuid, Path, description = "Identifier of the strategy game")),
    responses(
        (status = 200, description = "Current strategy state", body = StrategyStateResponse),
        (status = 404, description = "Game not found")
    )
)]
pub async fn strategy_state(
    State(state): State<SharedState>,
    Path(game_id): Path<Uuid>,
) -> Result<Json<StrategyStateResponse>, AppError> {
    let response = public_service::strategy_state(&state, game_id).await?;
    Ok(Json(response))
}

/// Edit the strategy settings of a game still in the lobby.
#[utoipa::path(
    patch,
    path = "/games/{game_id}/strategy/config",
    tag = "strategy",
    params(("game_id" = Uuid, Path, description = "Identifier of the strategy game")),
    request_body = UpdateStrategyConfigRequest,
    responses(
        (status = 200, description = "Configuration saved", body = GameSummary),
        (status = 400, description = "Invalid settings"),
        (status = 409, description = "Game already left the lobby")
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Path(game_id): Path<Uuid>,
    Valid(Json(payload)): Valid<Json<UpdateStrategyConfigRequest>>,
) -> Result<Json<GameSummary>, AppError> {
    let summary = admin_service::update_strategy_config(&state, game_id, payload).await?;
    Ok(Json(summary))
}

/// Claim bingo for a card whose marks complete a line.
#[utoipa::path(
    post,
    path = "/games/{game_id}/cards/{card_id}/claim",
    tag = "strategy",
    params(
        ("game_id" = Uuid, Path, description = "Identifier of the strategy game"),
        ("card_id" = Uuid, Path, description = "Identifier of the claimed card")
    ),
    responses(
        (status = 200, description = "Claim recorded", body = ClaimCardResponse),
        (status = 404, description = "Card not found in this game"),
        (status = 409, description = "Card has no complete line")
    )
)]
pub async fn claim_card(
    State(state): State<SharedState>,
    Path((game_id, card_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<ClaimCardResponse>, AppError> {
    let response = admin_service::claim_card(&state, game_id, card_id).await?;
    Ok(Json(response))
}
