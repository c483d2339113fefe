//! Read-only projections of strategy games and their score ledger.

use uuid::Uuid;

use crate::{
    dao::game_store::ScoreQuery,
    dto::{
        game::{RoundSummary, ScoreEntrySummary},
        public::{ScoresQuery, ScoresResponse, StrategyStateResponse},
    },
    error::{ConfigurationError, ServiceError},
    services::{round_service, scoring_service},
    state::SharedState,
};

const DEFAULT_SCORE_LIMIT: usize = 200;
const MAX_SCORE_LIMIT: usize = 500;

/// Rounds of a game, the active and next round, and the live controller view.
pub async fn strategy_state(
    state: &SharedState,
    game_id: Uuid,
) -> Result<StrategyStateResponse, ServiceError> {
    let store = state.require_store().await?;
    let game = store
        .find_game(game_id)
        .await?
        .ok_or(ConfigurationError::GameNotFound(game_id))?;
    let rounds = store.list_rounds(game_id).await?;

    let active_round = round_service::active_round(&rounds).map(|round| round.round_number);
    let next_round = round_service::next_pending_round(&rounds).map(|round| round.round_number);
    let controller = state
        .controllers()
        .get(&game_id)
        .map(|handle| handle.snapshot().into());

    Ok(StrategyStateResponse {
        game: game.into(),
        rounds: rounds.into_iter().map(RoundSummary::from).collect(),
        active_round,
        next_round,
        automation_running: active_round.is_some(),
        controller,
        degraded: state.is_degraded(),
    })
}

/// Score history, newest first, with the leaderboard of the same selection.
pub async fn list_scores(
    state: &SharedState,
    query: ScoresQuery,
) -> Result<ScoresResponse, ServiceError> {
    if query.event_id.is_none() && query.game_id.is_none() {
        return Err(ServiceError::InvalidInput(
            "either event_id or game_id is required".into(),
        ));
    }
    let limit = query
        .limit
        .unwrap_or(DEFAULT_SCORE_LIMIT)
        .clamp(1, MAX_SCORE_LIMIT);

    let store = state.require_store().await?;
    let history = store
        .list_scores(ScoreQuery {
            game_id: query.game_id,
            event_id: query.event_id,
            limit: None,
        })
        .await?;
    let leaderboard = scoring_service::leaderboard(&history);

    Ok(ScoresResponse {
        history: history
            .into_iter()
            .take(limit)
            .map(ScoreEntrySummary::from)
            .collect(),
        leaderboard: leaderboard
            .into_iter()
            .map(ScoreEntrySummary::from)
            .collect(),
    })
}
