use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::dto::{
    game::{GameSummary, RoundSummary, ScoreEntrySummary},
    phase::ControllerView,
};

/// Rounds and automation status of a strategy game.
#[derive(Debug, Serialize, ToSchema)]
pub struct StrategyStateResponse {
    pub game: GameSummary,
    pub rounds: Vec<RoundSummary>,
    pub active_round: Option<u32>,
    pub next_round: Option<u32>,
    /// Derived from storage: some round is currently active.
    pub automation_running: bool,
    /// Present while a controller is registered in this process.
    pub controller: Option<ControllerView>,
    pub degraded: bool,
}

/// Filters of the score history.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ScoresQuery {
    pub event_id: Option<Uuid>,
    pub game_id: Option<Uuid>,
    /// Maximum number of history rows (1 to 500, default 200).
    pub limit: Option<usize>,
}

/// Score history (newest first) with the derived leaderboard.
#[derive(Debug, Serialize, ToSchema)]
pub struct ScoresResponse {
    pub history: Vec<ScoreEntrySummary>,
    /// Most recent entry per contestant, highest total first.
    pub leaderboard: Vec<ScoreEntrySummary>,
}
