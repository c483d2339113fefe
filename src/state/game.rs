use std::time::Duration;

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::models::{BonusRulesEntity, GameEntity, GameMode, RoundEntity},
    error::ConfigurationError,
    services::patterns::title_case,
};

/// Size of the 1-75 number pool.
pub const MAX_DRAWS_PER_ROUND: u32 = 75;
/// Lowest draw cap accepted when the draw limit is enabled.
pub const MIN_LIMITED_DRAWS: u32 = 30;

const DEFAULT_COMBO_WINDOW: u32 = 1;
const DEFAULT_COMBO_LABEL: &str = "Combo";

/// Named pattern worth extra points once fully marked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatternRule {
    /// Registry key (`fourCorners`, `x`, ...).
    pub id: String,
    /// Display label.
    pub label: String,
    /// Points awarded on a match.
    pub points: i32,
}

/// Bonus for placing again within `window` rounds of a prior placement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComboRule {
    /// Points awarded when the combo applies.
    pub points: i32,
    /// Maximum distance, in rounds, to the previous placement.
    pub window: u32,
    /// Display label.
    pub label: String,
}

/// Bonus rule set resolved for one automation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BonusRules {
    /// Pattern rules in configuration order.
    pub patterns: Vec<PatternRule>,
    /// Combo rule, if enabled.
    pub combo: Option<ComboRule>,
}

impl From<&BonusRulesEntity> for BonusRules {
    fn from(value: &BonusRulesEntity) -> Self {
        let patterns = value
            .patterns
            .iter()
            .map(|(id, rule)| PatternRule {
                id: id.clone(),
                label: rule.label.clone().unwrap_or_else(|| title_case(id)),
                points: rule.points,
            })
            .collect();
        let combo = value.combo.as_ref().map(|rule| ComboRule {
            points: rule.points,
            window: rule.window.unwrap_or(DEFAULT_COMBO_WINDOW),
            label: rule
                .label
                .clone()
                .unwrap_or_else(|| DEFAULT_COMBO_LABEL.to_owned()),
        });
        Self { patterns, combo }
    }
}

/// Snapshot of a strategy game's settings, loaded once when automation starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrategyConfig {
    /// Game being automated.
    pub game_id: Uuid,
    /// Event the score ledger belongs to (the game itself when it has no event).
    pub event_id: Uuid,
    /// Number of rounds to play.
    pub total_rounds: u32,
    /// Cadence of the draw loop.
    pub draw_interval_seconds: u32,
    /// Draw cap written on each round.
    pub draws_per_round: u32,
    /// Whether `draws_per_round` limits rounds below the full pool.
    pub draw_limit_enabled: bool,
    /// Pause between two rounds.
    pub intermission_seconds: u32,
    /// Placement points for 1st, 2nd and 3rd.
    pub placement_points: [i32; 3],
    /// Distinct winners that end a round early.
    pub required_winners: u32,
    /// Pattern and combo bonuses.
    pub bonus_rules: BonusRules,
}

impl StrategyConfig {
    /// Resolve the automation settings of `game`, applying application defaults.
    pub fn from_game(game: &GameEntity, defaults: &AppConfig) -> Result<Self, ConfigurationError> {
        if game.mode != GameMode::Strategy {
            return Err(ConfigurationError::InvalidMode {
                game_id: game.id,
                mode: game.mode,
            });
        }
        if game.total_rounds == 0 {
            return Err(ConfigurationError::InvalidTotalRounds(game.total_rounds));
        }

        let bonus_rules = game
            .strategy_bonus_rules
            .as_ref()
            .unwrap_or(defaults.default_bonus_rules());

        Ok(Self {
            game_id: game.id,
            event_id: game.event_id.unwrap_or(game.id),
            total_rounds: game.total_rounds,
            draw_interval_seconds: game.strategy_draw_interval_seconds.max(1),
            draws_per_round: effective_draws_per_round(game),
            draw_limit_enabled: game.strategy_draw_limit_enabled,
            intermission_seconds: game
                .strategy_intermission_seconds
                .unwrap_or(defaults.intermission_seconds()),
            placement_points: [
                game.strategy_first_place_points,
                game.strategy_second_place_points,
                game.strategy_third_place_points,
            ],
            required_winners: game.strategy_required_winners.unwrap_or(1).max(1),
            bonus_rules: bonus_rules.into(),
        })
    }

    /// Points for a 1-based placement; 4th place and beyond earn nothing.
    pub fn placement_points(&self, order: u32) -> i32 {
        order
            .checked_sub(1)
            .and_then(|index| self.placement_points.get(index as usize))
            .copied()
            .unwrap_or(0)
    }

    /// Number of draws after which `round` finishes.
    pub fn draw_cap(&self, round: &RoundEntity) -> u32 {
        if self.draw_limit_enabled {
            round.draws_per_round.clamp(1, MAX_DRAWS_PER_ROUND)
        } else {
            MAX_DRAWS_PER_ROUND
        }
    }

    /// Delay between two draws of `round`, falling back to the game's interval.
    pub fn draw_interval(&self, round: &RoundEntity) -> Duration {
        let seconds = match round.draw_interval_seconds {
            0 => self.draw_interval_seconds,
            seconds => seconds,
        };
        Duration::from_secs(u64::from(seconds.max(1)))
    }

    /// Pause between a completed round and the next one.
    pub fn intermission(&self) -> Duration {
        Duration::from_secs(u64::from(self.intermission_seconds))
    }
}

/// Draws per round derived from the draw-limit flag.
///
/// Limited games use the explicit limit, then the configured draws per round,
/// clamped to `30..=75`; unlimited games play the whole pool.
pub fn effective_draws_per_round(game: &GameEntity) -> u32 {
    if !game.strategy_draw_limit_enabled {
        return MAX_DRAWS_PER_ROUND;
    }
    game.strategy_draw_limit
        .or(game.strategy_draws_per_round)
        .unwrap_or(MAX_DRAWS_PER_ROUND)
        .clamp(MIN_LIMITED_DRAWS, MAX_DRAWS_PER_ROUND)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dao::models::PatternRuleEntity, services::test_fixtures::strategy_game};

    #[test]
    fn draw_limit_is_clamped_when_enabled() {
        let mut game = strategy_game();
        game.strategy_draws_per_round = Some(10);
        assert_eq!(effective_draws_per_round(&game), 75);

        game.strategy_draw_limit_enabled = true;
        assert_eq!(effective_draws_per_round(&game), 30);

        game.strategy_draw_limit = Some(50);
        assert_eq!(effective_draws_per_round(&game), 50);

        game.strategy_draw_limit = Some(120);
        assert_eq!(effective_draws_per_round(&game), 75);
    }

    #[test]
    fn placement_points_stop_after_third() {
        let config = StrategyConfig::from_game(&strategy_game(), &AppConfig::default()).unwrap();
        assert_eq!(config.placement_points(1), 10);
        assert_eq!(config.placement_points(3), 3);
        assert_eq!(config.placement_points(4), 0);
        assert_eq!(config.placement_points(0), 0);
    }

    #[test]
    fn draw_interval_follows_the_round() {
        let config = StrategyConfig::from_game(&strategy_game(), &AppConfig::default()).unwrap();
        let mut round = RoundEntity {
            id: Uuid::new_v4(),
            game_id: config.game_id,
            round_number: 1,
            draws_per_round: 75,
            draw_interval_seconds: 7,
            status: crate::dao::models::RoundStatus::Pending,
            started_at: None,
            ended_at: None,
            intermission_ends_at: None,
        };
        assert_eq!(config.draw_interval(&round), Duration::from_secs(7));

        round.draw_interval_seconds = 0;
        assert_eq!(config.draw_interval(&round), Duration::from_secs(2));
    }

    #[test]
    fn missing_values_fall_back_to_defaults() {
        let mut game = strategy_game();
        game.event_id = None;
        game.strategy_intermission_seconds = None;
        game.strategy_required_winners = Some(0);

        let config = StrategyConfig::from_game(&game, &AppConfig::default()).unwrap();
        assert_eq!(config.event_id, game.id);
        assert_eq!(config.intermission_seconds, 10);
        assert_eq!(config.required_winners, 1);
        assert_eq!(config.bonus_rules.patterns[0].id, "fourCorners");
        assert_eq!(config.bonus_rules.combo.as_ref().map(|c| c.window), Some(1));
    }

    #[test]
    fn pattern_labels_default_to_title_case() {
        let mut game = strategy_game();
        let mut rules = BonusRulesEntity::default();
        rules.patterns.insert(
            "fourCorners".into(),
            PatternRuleEntity {
                points: 5,
                label: None,
            },
        );
        game.strategy_bonus_rules = Some(rules);

        let config = StrategyConfig::from_game(&game, &AppConfig::default()).unwrap();
        assert_eq!(config.bonus_rules.patterns[0].label, "Four Corners");
        assert!(config.bonus_rules.combo.is_none());
    }

    #[test]
    fn classic_games_and_empty_schedules_are_rejected() {
        let mut game = strategy_game();
        game.mode = GameMode::Classic;
        assert!(matches!(
            StrategyConfig::from_game(&game, &AppConfig::default()),
            Err(ConfigurationError::InvalidMode { .. })
        ));

        let mut game = strategy_game();
        game.total_rounds = 0;
        assert_eq!(
            StrategyConfig::from_game(&game, &AppConfig::default()),
            Err(ConfigurationError::InvalidTotalRounds(0))
        );
    }
}
