use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Game flavour selected by the admin.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    /// Single-winner bingo driven manually.
    Classic,
    /// Multi-round automated bingo with placement scoring.
    Strategy,
}

/// Overall lifecycle of a game.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameStatus {
    /// Contestants are joining; configuration can still change.
    Lobby,
    /// Numbers are being drawn.
    Active,
    /// Terminal state; a champion (if any) has been recorded.
    Ended,
}

/// Lifecycle status of a single round.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RoundStatus {
    /// Created but not started yet.
    Pending,
    /// Currently drawing numbers.
    Active,
    /// Intermission after the round, as written by external tooling.
    Cooldown,
    /// Finished; never reactivated.
    Completed,
}

impl RoundStatus {
    /// Whether the round still accepts configuration updates.
    pub fn is_unfinished(self) -> bool {
        matches!(
            self,
            RoundStatus::Pending | RoundStatus::Active | RoundStatus::Cooldown
        )
    }

    /// Rounds only ever move forward: pending → active → (cooldown →) completed.
    pub fn can_advance_to(self, next: RoundStatus) -> bool {
        matches!(
            (self, next),
            (RoundStatus::Pending, RoundStatus::Active)
                | (RoundStatus::Active, RoundStatus::Cooldown)
                | (RoundStatus::Active, RoundStatus::Completed)
                | (RoundStatus::Cooldown, RoundStatus::Completed)
        )
    }
}

/// Points awarded when a named pattern is fully marked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PatternRuleEntity {
    pub points: i32,
    #[serde(default)]
    pub label: Option<String>,
}

/// Points awarded to a contestant placing again within a short window of rounds.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComboRuleEntity {
    pub points: i32,
    #[serde(default)]
    pub window: Option<u32>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Bonus configuration persisted alongside a strategy game.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BonusRulesEntity {
    /// Pattern id (`fourCorners`, `x`, ...) to rule.
    #[serde(default)]
    pub patterns: IndexMap<String, PatternRuleEntity>,
    #[serde(default)]
    pub combo: Option<ComboRuleEntity>,
}

/// Aggregate game entity persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameEntity {
    /// Primary key of the game.
    pub id: Uuid,
    /// Event hosting this game, if any.
    pub event_id: Option<Uuid>,
    /// Display name of the game.
    pub name: String,
    pub mode: GameMode,
    pub status: GameStatus,
    /// Number of rounds played in strategy mode.
    pub total_rounds: u32,
    pub strategy_draw_interval_seconds: u32,
    pub strategy_draws_per_round: Option<u32>,
    pub strategy_intermission_seconds: Option<u32>,
    pub strategy_first_place_points: i32,
    pub strategy_second_place_points: i32,
    pub strategy_third_place_points: i32,
    pub strategy_required_winners: Option<u32>,
    pub strategy_draw_limit_enabled: bool,
    pub strategy_draw_limit: Option<u32>,
    /// Bonus rules; the application defaults apply when absent.
    pub strategy_bonus_rules: Option<BonusRulesEntity>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the game entity was updated.
    pub updated_at: SystemTime,
    /// Set once the game reaches [`GameStatus::Ended`].
    pub ended_at: Option<SystemTime>,
}

/// One scoring epoch of a strategy game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RoundEntity {
    pub id: Uuid,
    pub game_id: Uuid,
    /// Sequential number, unique per game, starting at 1.
    pub round_number: u32,
    pub draws_per_round: u32,
    pub draw_interval_seconds: u32,
    pub status: RoundStatus,
    pub started_at: Option<SystemTime>,
    pub ended_at: Option<SystemTime>,
    pub intermission_ends_at: Option<SystemTime>,
}

/// Immutable record of one number pulled for a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DrawEntity {
    pub id: Uuid,
    pub game_id: Uuid,
    /// Drawn number (1–75).
    pub number: u8,
    /// Gap-free per-game sequence starting at 1.
    pub draw_order: u32,
    pub created_at: SystemTime,
}

/// Numbers of a card with the parallel marked matrix.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BingoGrid {
    pub numbers: Vec<Vec<u8>>,
    /// `true` when the cell was marked or is a free space.
    pub marked: Vec<Vec<bool>>,
}

/// A contestant's card.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CardEntity {
    pub id: Uuid,
    pub game_id: Uuid,
    pub contestant_id: Option<Uuid>,
    pub grid: BingoGrid,
    /// Drawn numbers are marked on this card automatically.
    pub auto_mark_enabled: bool,
    /// The marked cells currently contain a complete line.
    pub is_winner_candidate: bool,
    pub updated_at: SystemTime,
}

/// Participant of a game.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContestantEntity {
    pub id: Uuid,
    pub game_id: Uuid,
    pub username: String,
    /// Join code handed to the participant.
    pub code: Option<String>,
}

/// Who triggered a score entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AwardSource {
    /// Written by the automation controller.
    Auto,
    /// Written through the admin scoring endpoint.
    Manual,
}

/// Free-form description attached to each score entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ScoreMetadata {
    /// Placement points for completing a line.
    Placement { order: u32, source: AwardSource },
    /// Bonus for a named pattern.
    Pattern {
        pattern: String,
        label: String,
        source: AwardSource,
    },
    /// Bonus for placing again within the combo window.
    Combo {
        combo: String,
        label: String,
        source: AwardSource,
    },
    /// Manual adjustment without a placement.
    Adjustment {
        notes: Option<String>,
        source: AwardSource,
    },
}

/// Append-only ledger row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntity {
    pub id: Uuid,
    pub event_id: Uuid,
    pub game_id: Uuid,
    pub round_id: Option<Uuid>,
    pub contestant_id: Uuid,
    pub points_awarded: i32,
    /// Running total after this entry.
    pub total_after_round: i32,
    /// Position of this entry in the contestant's ledger for the game (1-based).
    pub entry_index: u32,
    pub award_order: Option<u32>,
    pub is_bonus: bool,
    pub metadata: ScoreMetadata,
    pub created_at: SystemTime,
}

/// Kind of row written to the results table.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ResultKind {
    /// A contestant claimed a line bingo.
    Win,
    /// Terminal record naming the game champion.
    Champion,
}

/// Row of the results table; inserts are fanned out to subscribers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResultEntity {
    pub id: Uuid,
    pub game_id: Uuid,
    pub contestant_id: Option<Uuid>,
    pub card_id: Option<Uuid>,
    pub username: Option<String>,
    pub payout: i64,
    pub kind: ResultKind,
    pub created_at: SystemTime,
}
