//! Business logic powering the admin REST routes: automation lifecycle,
//! lobby configuration, manual awards and card claims.

use std::time::SystemTime;

use tracing::info;
use uuid::Uuid;

use crate::{
    dao::models::{
        AwardSource, BonusRulesEntity, ComboRuleEntity, GameMode, GameStatus, PatternRuleEntity,
        ResultEntity, ResultKind,
    },
    dto::{
        admin::{
            ActionResponse, BonusRulesInput, ClaimCardResponse, ManualAwardRequest,
            StartAutomationResponse, UpdateStrategyConfigRequest,
        },
        game::{GameSummary, ScoreEntrySummary},
    },
    error::{ConfigurationError, ServiceError},
    services::{
        draw_service,
        patterns::{has_line_bingo, merged_marks},
        scoring_service::{self, AwardRequest},
        sse_events,
        strategy_controller::{self, StartOutcome},
    },
    state::SharedState,
};

/// Start automation for a game and return without waiting for the first round.
pub async fn start_automation(
    state: &SharedState,
    game_id: Uuid,
) -> Result<StartAutomationResponse, ServiceError> {
    let outcome = strategy_controller::start_automation(state, game_id).await?;
    let (message, already_running) = match outcome {
        StartOutcome::Started => ("strategy automation started", false),
        StartOutcome::AlreadyRunning => ("strategy automation already running", true),
    };
    Ok(StartAutomationResponse {
        game_id,
        message: message.into(),
        already_running,
    })
}

/// Stop the controller of a game, if one runs in this process.
pub async fn stop_automation(state: &SharedState, game_id: Uuid) -> ActionResponse {
    let message = if strategy_controller::stop_automation(state, game_id, "admin request").await {
        "strategy automation stopped"
    } else {
        "strategy automation was not running"
    };
    ActionResponse {
        message: message.into(),
    }
}

/// Update the strategy settings of a game still in the lobby.
///
/// Existing rounds are reconciled with the new settings on the next start.
pub async fn update_strategy_config(
    state: &SharedState,
    game_id: Uuid,
    request: UpdateStrategyConfigRequest,
) -> Result<GameSummary, ServiceError> {
    let store = state.require_store().await?;
    let mut game = store
        .find_game(game_id)
        .await?
        .ok_or(ConfigurationError::GameNotFound(game_id))?;
    if game.mode != GameMode::Strategy {
        return Err(ConfigurationError::InvalidMode {
            game_id,
            mode: game.mode,
        }
        .into());
    }
    if game.status != GameStatus::Lobby {
        return Err(ServiceError::InvalidState(format!(
            "game `{game_id}` can only be configured in the lobby"
        )));
    }

    if let Some(total_rounds) = request.total_rounds {
        if total_rounds == 0 {
            return Err(ConfigurationError::InvalidTotalRounds(total_rounds).into());
        }
        game.total_rounds = total_rounds;
    }
    if let Some(seconds) = request.draw_interval_seconds {
        game.strategy_draw_interval_seconds = seconds;
    }
    if let Some(seconds) = request.intermission_seconds {
        game.strategy_intermission_seconds = Some(seconds);
    }
    if let Some(enabled) = request.draw_limit_enabled {
        game.strategy_draw_limit_enabled = enabled;
    }
    if let Some(limit) = request.draw_limit {
        game.strategy_draw_limit = Some(limit);
    }
    if let Some(draws) = request.draws_per_round {
        game.strategy_draws_per_round = Some(draws);
    }
    if let Some(points) = request.first_place_points {
        game.strategy_first_place_points = points;
    }
    if let Some(points) = request.second_place_points {
        game.strategy_second_place_points = points;
    }
    if let Some(points) = request.third_place_points {
        game.strategy_third_place_points = points;
    }
    if let Some(required) = request.required_winners {
        game.strategy_required_winners = Some(required);
    }
    if let Some(rules) = request.bonus_rules {
        game.strategy_bonus_rules = Some(rules.into());
    }

    game.updated_at = SystemTime::now();
    store.save_game(game.clone()).await?;
    info!(game_id = %game_id, "strategy configuration updated");
    Ok(game.into())
}

impl From<BonusRulesInput> for BonusRulesEntity {
    fn from(input: BonusRulesInput) -> Self {
        Self {
            patterns: input
                .patterns
                .into_iter()
                .map(|(id, rule)| {
                    let entity = PatternRuleEntity {
                        points: rule.points,
                        label: rule.label,
                    };
                    (id, entity)
                })
                .collect(),
            combo: input.combo.map(|combo| ComboRuleEntity {
                points: combo.points,
                window: combo.window,
                label: combo.label,
            }),
        }
    }
}

/// Append a manual award to a contestant's ledger.
pub async fn award_manual_points(
    state: &SharedState,
    request: ManualAwardRequest,
) -> Result<Vec<ScoreEntrySummary>, ServiceError> {
    let store = state.require_store().await?;
    let game = store
        .find_game(request.game_id)
        .await?
        .ok_or(ConfigurationError::GameNotFound(request.game_id))?;
    let contestant = store
        .find_contestant(request.contestant_id)
        .await?
        .filter(|contestant| contestant.game_id == game.id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("contestant `{}` in game", request.contestant_id))
        })?;

    let award = AwardRequest {
        game_id: game.id,
        event_id: game.event_id.unwrap_or(game.id),
        round_id: request.round_id,
        contestant_id: contestant.id,
        base_points: request.points,
        placement_order: request.placement_order,
        source: AwardSource::Manual,
        notes: request.notes,
        bonuses: Vec::new(),
    };
    let entries = scoring_service::award_points(store.as_ref(), &award).await?;
    sse_events::broadcast_scores_awarded(state, &entries);
    info!(
        game_id = %game.id,
        contestant_id = %contestant.id,
        points = request.points,
        "manual award recorded"
    );
    Ok(entries.into_iter().map(ScoreEntrySummary::from).collect())
}

/// Record a win for a card holding a complete line against the drawn numbers.
///
/// The inserted row reaches the game's controller through the results feed.
pub async fn claim_card(
    state: &SharedState,
    game_id: Uuid,
    card_id: Uuid,
) -> Result<ClaimCardResponse, ServiceError> {
    let store = state.require_store().await?;
    let card = store
        .find_card(card_id)
        .await?
        .filter(|card| card.game_id == game_id)
        .ok_or_else(|| ServiceError::NotFound(format!("card `{card_id}` in game `{game_id}`")))?;
    let contestant_id = card
        .contestant_id
        .ok_or_else(|| ServiceError::InvalidInput(format!("card `{card_id}` has no owner")))?;

    let drawn = draw_service::drawn_numbers(store.as_ref(), game_id).await?;
    if !has_line_bingo(&merged_marks(&card.grid, &drawn)) {
        return Err(ServiceError::InvalidState(format!(
            "card `{card_id}` has no complete line"
        )));
    }

    let username = store
        .find_contestant(contestant_id)
        .await?
        .map(|contestant| contestant.username);
    let result = ResultEntity {
        id: Uuid::new_v4(),
        game_id,
        contestant_id: Some(contestant_id),
        card_id: Some(card_id),
        username,
        payout: 0,
        kind: ResultKind::Win,
        created_at: SystemTime::now(),
    };
    let result_id = result.id;
    store.insert_result(result).await?;
    info!(game_id = %game_id, card_id = %card_id, "bingo claim accepted");

    Ok(ClaimCardResponse {
        card_id,
        contestant_id,
        result_id,
        message: "bingo claim recorded".into(),
    })
}
