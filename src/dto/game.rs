use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{GameEntity, GameMode, GameStatus, RoundEntity, RoundStatus, ScoreEntity},
    dto::format_system_time,
    services::scoring_service::format_award_label,
};

/// Strategy settings and status of a game.
#[derive(Debug, Serialize, ToSchema)]
pub struct GameSummary {
    pub id: Uuid,
    pub event_id: Option<Uuid>,
    pub name: String,
    #[schema(value_type = String, example = "strategy")]
    pub mode: GameMode,
    #[schema(value_type = String, example = "lobby")]
    pub status: GameStatus,
    pub total_rounds: u32,
    pub draw_interval_seconds: u32,
    pub intermission_seconds: Option<u32>,
    pub draw_limit_enabled: bool,
    pub draw_limit: Option<u32>,
    pub draws_per_round: Option<u32>,
    pub placement_points: [i32; 3],
    pub required_winners: Option<u32>,
    pub created_at: String,
    pub updated_at: String,
    pub ended_at: Option<String>,
}

impl From<GameEntity> for GameSummary {
    fn from(game: GameEntity) -> Self {
        Self {
            id: game.id,
            event_id: game.event_id,
            name: game.name,
            mode: game.mode,
            status: game.status,
            total_rounds: game.total_rounds,
            draw_interval_seconds: game.strategy_draw_interval_seconds,
            intermission_seconds: game.strategy_intermission_seconds,
            draw_limit_enabled: game.strategy_draw_limit_enabled,
            draw_limit: game.strategy_draw_limit,
            draws_per_round: game.strategy_draws_per_round,
            placement_points: [
                game.strategy_first_place_points,
                game.strategy_second_place_points,
                game.strategy_third_place_points,
            ],
            required_winners: game.strategy_required_winners,
            created_at: format_system_time(game.created_at),
            updated_at: format_system_time(game.updated_at),
            ended_at: game.ended_at.map(format_system_time),
        }
    }
}

/// One round of a strategy game.
#[derive(Debug, Serialize, ToSchema)]
pub struct RoundSummary {
    pub id: Uuid,
    pub round_number: u32,
    #[schema(value_type = String, example = "pending")]
    pub status: RoundStatus,
    pub draws_per_round: u32,
    pub draw_interval_seconds: u32,
    pub started_at: Option<String>,
    pub ended_at: Option<String>,
    pub intermission_ends_at: Option<String>,
}

impl From<RoundEntity> for RoundSummary {
    fn from(round: RoundEntity) -> Self {
        Self {
            id: round.id,
            round_number: round.round_number,
            status: round.status,
            draws_per_round: round.draws_per_round,
            draw_interval_seconds: round.draw_interval_seconds,
            started_at: round.started_at.map(format_system_time),
            ended_at: round.ended_at.map(format_system_time),
            intermission_ends_at: round.intermission_ends_at.map(format_system_time),
        }
    }
}

/// Ledger entry as exposed to clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoreEntrySummary {
    pub id: Uuid,
    pub event_id: Uuid,
    pub game_id: Uuid,
    pub round_id: Option<Uuid>,
    pub contestant_id: Uuid,
    pub points_awarded: i32,
    pub total_after_round: i32,
    pub award_order: Option<u32>,
    pub is_bonus: bool,
    /// Display label such as `+5 Four Corners`.
    pub label: String,
    /// Tagged metadata (`placement`, `pattern`, `combo` or `adjustment`).
    #[schema(value_type = Object)]
    pub metadata: serde_json::Value,
    pub created_at: String,
}

impl From<ScoreEntity> for ScoreEntrySummary {
    fn from(entry: ScoreEntity) -> Self {
        let label = format_award_label(&entry);
        Self {
            id: entry.id,
            event_id: entry.event_id,
            game_id: entry.game_id,
            round_id: entry.round_id,
            contestant_id: entry.contestant_id,
            points_awarded: entry.points_awarded,
            total_after_round: entry.total_after_round,
            award_order: entry.award_order,
            is_bonus: entry.is_bonus,
            label,
            metadata: serde_json::to_value(&entry.metadata).unwrap_or_default(),
            created_at: format_system_time(entry.created_at),
        }
    }
}
