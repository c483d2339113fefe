use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    BingoGrid, BonusRulesEntity, CardEntity, ContestantEntity, DrawEntity,
    GameEntity, GameMode, GameStatus, ResultEntity, ResultKind, RoundEntity, RoundStatus,
    ScoreEntity, ScoreMetadata,
};

// Identifiers are stored as hyphenated strings so filters stay readable in the shell.

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": id.to_string()}
}

fn parse_uuid(raw: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(raw).map_err(|err| MongoDaoError::MalformedDocument {
        id: raw.to_owned(),
        reason: err.to_string(),
    })
}

fn parse_optional_uuid(raw: Option<String>) -> MongoResult<Option<Uuid>> {
    raw.as_deref().map(parse_uuid).transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameDocument {
    #[serde(rename = "_id")]
    id: String,
    event_id: Option<String>,
    name: String,
    mode: GameMode,
    status: GameStatus,
    total_rounds: u32,
    strategy_draw_interval_seconds: u32,
    strategy_draws_per_round: Option<u32>,
    strategy_intermission_seconds: Option<u32>,
    strategy_first_place_points: i32,
    strategy_second_place_points: i32,
    strategy_third_place_points: i32,
    strategy_required_winners: Option<u32>,
    #[serde(default)]
    strategy_draw_limit_enabled: bool,
    strategy_draw_limit: Option<u32>,
    strategy_bonus_rules: Option<BonusRulesEntity>,
    created_at: DateTime,
    updated_at: DateTime,
    ended_at: Option<DateTime>,
}

impl From<GameEntity> for MongoGameDocument {
    fn from(value: GameEntity) -> Self {
        Self {
            id: value.id.to_string(),
            event_id: value.event_id.map(|id| id.to_string()),
            name: value.name,
            mode: value.mode,
            status: value.status,
            total_rounds: value.total_rounds,
            strategy_draw_interval_seconds: value.strategy_draw_interval_seconds,
            strategy_draws_per_round: value.strategy_draws_per_round,
            strategy_intermission_seconds: value.strategy_intermission_seconds,
            strategy_first_place_points: value.strategy_first_place_points,
            strategy_second_place_points: value.strategy_second_place_points,
            strategy_third_place_points: value.strategy_third_place_points,
            strategy_required_winners: value.strategy_required_winners,
            strategy_draw_limit_enabled: value.strategy_draw_limit_enabled,
            strategy_draw_limit: value.strategy_draw_limit,
            strategy_bonus_rules: value.strategy_bonus_rules,
            created_at: DateTime::from_system_time(value.created_at),
            updated_at: DateTime::from_system_time(value.updated_at),
            ended_at: value.ended_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoGameDocument> for GameEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoGameDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            event_id: parse_optional_uuid(value.event_id)?,
            name: value.name,
            mode: value.mode,
            status: value.status,
            total_rounds: value.total_rounds,
            strategy_draw_interval_seconds: value.strategy_draw_interval_seconds,
            strategy_draws_per_round: value.strategy_draws_per_round,
            strategy_intermission_seconds: value.strategy_intermission_seconds,
            strategy_first_place_points: value.strategy_first_place_points,
            strategy_second_place_points: value.strategy_second_place_points,
            strategy_third_place_points: value.strategy_third_place_points,
            strategy_required_winners: value.strategy_required_winners,
            strategy_draw_limit_enabled: value.strategy_draw_limit_enabled,
            strategy_draw_limit: value.strategy_draw_limit,
            strategy_bonus_rules: value.strategy_bonus_rules,
            created_at: value.created_at.to_system_time(),
            updated_at: value.updated_at.to_system_time(),
            ended_at: value.ended_at.map(DateTime::to_system_time),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoRoundDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    round_number: u32,
    draws_per_round: u32,
    draw_interval_seconds: u32,
    status: RoundStatus,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    intermission_ends_at: Option<DateTime>,
}

impl From<RoundEntity> for MongoRoundDocument {
    fn from(value: RoundEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            round_number: value.round_number,
            draws_per_round: value.draws_per_round,
            draw_interval_seconds: value.draw_interval_seconds,
            status: value.status,
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            intermission_ends_at: value.intermission_ends_at.map(DateTime::from_system_time),
        }
    }
}

impl TryFrom<MongoRoundDocument> for RoundEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoRoundDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            game_id: parse_uuid(&value.game_id)?,
            round_number: value.round_number,
            draws_per_round: value.draws_per_round,
            draw_interval_seconds: value.draw_interval_seconds,
            status: value.status,
            started_at: value.started_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
            intermission_ends_at: value.intermission_ends_at.map(DateTime::to_system_time),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoDrawDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    number: i32,
    draw_order: u32,
    created_at: DateTime,
}

impl From<DrawEntity> for MongoDrawDocument {
    fn from(value: DrawEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            number: i32::from(value.number),
            draw_order: value.draw_order,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoDrawDocument> for DrawEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoDrawDocument) -> MongoResult<Self> {
        let number = u8::try_from(value.number).map_err(|_| MongoDaoError::MalformedDocument {
            id: value.id.clone(),
            reason: format!("draw number {} out of range", value.number),
        })?;
        Ok(Self {
            id: parse_uuid(&value.id)?,
            game_id: parse_uuid(&value.game_id)?,
            number,
            draw_order: value.draw_order,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoCardDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    contestant_id: Option<String>,
    grid: BingoGrid,
    #[serde(default)]
    auto_mark_enabled: bool,
    #[serde(default)]
    is_winner_candidate: bool,
    updated_at: DateTime,
}

impl From<CardEntity> for MongoCardDocument {
    fn from(value: CardEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            contestant_id: value.contestant_id.map(|id| id.to_string()),
            grid: value.grid,
            auto_mark_enabled: value.auto_mark_enabled,
            is_winner_candidate: value.is_winner_candidate,
            updated_at: DateTime::from_system_time(value.updated_at),
        }
    }
}

impl TryFrom<MongoCardDocument> for CardEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoCardDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            game_id: parse_uuid(&value.game_id)?,
            contestant_id: parse_optional_uuid(value.contestant_id)?,
            grid: value.grid,
            auto_mark_enabled: value.auto_mark_enabled,
            is_winner_candidate: value.is_winner_candidate,
            updated_at: value.updated_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoContestantDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    username: String,
    code: Option<String>,
}

impl From<ContestantEntity> for MongoContestantDocument {
    fn from(value: ContestantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            username: value.username,
            code: value.code,
        }
    }
}

impl TryFrom<MongoContestantDocument> for ContestantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoContestantDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            game_id: parse_uuid(&value.game_id)?,
            username: value.username,
            code: value.code,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreDocument {
    #[serde(rename = "_id")]
    id: String,
    event_id: String,
    game_id: String,
    round_id: Option<String>,
    contestant_id: String,
    points_awarded: i32,
    total_after_round: i32,
    entry_index: u32,
    award_order: Option<u32>,
    is_bonus: bool,
    metadata: ScoreMetadata,
    created_at: DateTime,
}

impl From<ScoreEntity> for MongoScoreDocument {
    fn from(value: ScoreEntity) -> Self {
        Self {
            id: value.id.to_string(),
            event_id: value.event_id.to_string(),
            game_id: value.game_id.to_string(),
            round_id: value.round_id.map(|id| id.to_string()),
            contestant_id: value.contestant_id.to_string(),
            points_awarded: value.points_awarded,
            total_after_round: value.total_after_round,
            entry_index: value.entry_index,
            award_order: value.award_order,
            is_bonus: value.is_bonus,
            metadata: value.metadata,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoScoreDocument> for ScoreEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoScoreDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            event_id: parse_uuid(&value.event_id)?,
            game_id: parse_uuid(&value.game_id)?,
            round_id: parse_optional_uuid(value.round_id)?,
            contestant_id: parse_uuid(&value.contestant_id)?,
            points_awarded: value.points_awarded,
            total_after_round: value.total_after_round,
            entry_index: value.entry_index,
            award_order: value.award_order,
            is_bonus: value.is_bonus,
            metadata: value.metadata,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoResultDocument {
    #[serde(rename = "_id")]
    id: String,
    game_id: String,
    contestant_id: Option<String>,
    card_id: Option<String>,
    username: Option<String>,
    payout: i64,
    #[serde(default = "default_result_kind")]
    kind: ResultKind,
    created_at: DateTime,
}

fn default_result_kind() -> ResultKind {
    ResultKind::Win
}

impl From<ResultEntity> for MongoResultDocument {
    fn from(value: ResultEntity) -> Self {
        Self {
            id: value.id.to_string(),
            game_id: value.game_id.to_string(),
            contestant_id: value.contestant_id.map(|id| id.to_string()),
            card_id: value.card_id.map(|id| id.to_string()),
            username: value.username,
            payout: value.payout,
            kind: value.kind,
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoResultDocument> for ResultEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoResultDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_uuid(&value.id)?,
            game_id: parse_uuid(&value.game_id)?,
            contestant_id: parse_optional_uuid(value.contestant_id)?,
            card_id: parse_optional_uuid(value.card_id)?,
            username: value.username,
            payout: value.payout,
            kind: value.kind,
            created_at: value.created_at.to_system_time(),
        })
    }
}
