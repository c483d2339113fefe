//! DTO definitions used by the automation control endpoints.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::dto::validation::{validate_notes, validate_pattern_rules};

/// Acknowledgement of a start request; automation runs in the background.
#[derive(Debug, Serialize, ToSchema)]
pub struct StartAutomationResponse {
    pub game_id: Uuid,
    pub message: String,
    /// A controller was already driving this game.
    pub already_running: bool,
}

/// Generic action acknowledgement used by admin endpoints.
#[derive(Debug, Serialize, ToSchema)]
pub struct ActionResponse {
    pub message: String,
}

/// Points and label of one bonus pattern.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PatternRuleInput {
    pub points: i32,
    #[serde(default)]
    pub label: Option<String>,
}

/// Combo bonus settings.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct ComboRuleInput {
    #[validate(range(min = 0))]
    pub points: i32,
    #[serde(default)]
    #[validate(range(min = 1, max = 50))]
    pub window: Option<u32>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Bonus rule set replacing the application defaults for one game.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct BonusRulesInput {
    /// Pattern id (`fourCorners`, `x`, ...) to rule; unknown ids are kept but never match.
    #[serde(default)]
    #[validate(custom(function = "validate_pattern_rules"))]
    #[schema(value_type = Object)]
    pub patterns: IndexMap<String, PatternRuleInput>,
    #[serde(default)]
    #[validate(nested)]
    pub combo: Option<ComboRuleInput>,
}

/// Lobby-only update of a strategy game's settings; absent fields are left unchanged.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct UpdateStrategyConfigRequest {
    #[validate(range(min = 1, max = 50))]
    pub total_rounds: Option<u32>,
    #[validate(range(min = 1, max = 600))]
    pub draw_interval_seconds: Option<u32>,
    #[validate(range(min = 0, max = 3600))]
    pub intermission_seconds: Option<u32>,
    pub draw_limit_enabled: Option<bool>,
    #[validate(range(min = 30, max = 75))]
    pub draw_limit: Option<u32>,
    #[validate(range(min = 30, max = 75))]
    pub draws_per_round: Option<u32>,
    #[validate(range(min = 0))]
    pub first_place_points: Option<i32>,
    #[validate(range(min = 0))]
    pub second_place_points: Option<i32>,
    #[validate(range(min = 0))]
    pub third_place_points: Option<i32>,
    #[validate(range(min = 1, max = 75))]
    pub required_winners: Option<u32>,
    #[validate(nested)]
    pub bonus_rules: Option<BonusRulesInput>,
}

/// Manual score award written with source `manual`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ManualAwardRequest {
    pub game_id: Uuid,
    pub contestant_id: Uuid,
    #[serde(default)]
    pub round_id: Option<Uuid>,
    #[validate(range(min = 1))]
    pub points: i32,
    /// Placement to record with the points, if any.
    #[serde(default)]
    #[validate(range(min = 1))]
    pub placement_order: Option<u32>,
    #[serde(default)]
    #[validate(custom(function = "validate_notes"))]
    pub notes: Option<String>,
}

/// Outcome of a card claim.
#[derive(Debug, Serialize, ToSchema)]
pub struct ClaimCardResponse {
    pub card_id: Uuid,
    pub contestant_id: Uuid,
    /// Identifier of the win row handed to the automation.
    pub result_id: Uuid,
    pub message: String,
}
