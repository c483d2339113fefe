use axum::{
    Json, Router,
    extract::{Query, State},
    routing::get,
};
use axum_valid::Valid;

use crate::{
    dto::{
        admin::ManualAwardRequest,
        game::ScoreEntrySummary,
        public::{ScoresQuery, ScoresResponse},
    },
    error::AppError,
    services::{admin_service, public_service},
    state::SharedState,
};

/// Routes exposing the score ledger.
pub fn router() -> Router<SharedState> {
    Router::new().route("/scores", get(list_scores).post(award_points))
}

/// Score history and leaderboard for an event or a game.
#[utoipa::path(
    get,
    path = "/scores",
    tag = "scores",
    params(ScoresQuery),
    responses(
        (status = 200, description = "Score history, newest first", body = ScoresResponse),
        (status = 400, description = "Neither event_id nor game_id provided")
    )
)]
pub async fn list_scores(
    State(state): State<SharedState>,
    Query(query): Query<ScoresQuery>,
) -> Result<Json<ScoresResponse>, AppError> {
    let response = public_service::list_scores(&state, query).await?;
    Ok(Json(response))
}

/// Append a manual award to a contestant's ledger.
#[utoipa::path(
    post,
    path = "/scores",
    tag = "scores",
    request_body = ManualAwardRequest,
    responses(
        (status = 200, description = "Entries appended", body = [ScoreEntrySummary]),
        (status = 400, description = "Invalid award"),
        (status = 404, description = "Game or contestant not found")
    )
)]
pub async fn award_points(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<ManualAwardRequest>>,
) -> Result<Json<Vec<ScoreEntrySummary>>, AppError> {
    let entries = admin_service::award_manual_points(&state, payload).await?;
    Ok(Json(entries))
}
