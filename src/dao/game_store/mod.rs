pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dao::models::{
    CardEntity, ContestantEntity, DrawEntity, GameEntity, ResultEntity, RoundEntity, ScoreEntity,
};
use crate::dao::storage::StorageResult;

/// Predicate applied when listing the cards of a game.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CardFilter {
    /// Only cards with auto-marking enabled.
    pub auto_mark_only: bool,
    /// Only cards currently flagged as winner candidates.
    pub winner_candidates_only: bool,
    /// Only cards owned by this contestant.
    pub contestant_id: Option<Uuid>,
}

impl CardFilter {
    /// Cards that receive marks as numbers are drawn.
    pub fn auto_mark() -> Self {
        Self {
            auto_mark_only: true,
            ..Self::default()
        }
    }

    /// Cards holding a complete line.
    pub fn winner_candidates() -> Self {
        Self {
            winner_candidates_only: true,
            ..Self::default()
        }
    }

    /// Check a card against the filter.
    pub fn matches(&self, card: &CardEntity) -> bool {
        (!self.auto_mark_only || card.auto_mark_enabled)
            && (!self.winner_candidates_only || card.is_winner_candidate)
            && self
                .contestant_id
                .is_none_or(|id| card.contestant_id == Some(id))
    }
}

/// Selection of score entries, always returned newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreQuery {
    pub game_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub limit: Option<usize>,
}

impl ScoreQuery {
    /// Every entry of a game.
    pub fn game(game_id: Uuid) -> Self {
        Self {
            game_id: Some(game_id),
            ..Self::default()
        }
    }

    /// Check an entry against the game/event predicates (the limit is applied by the caller).
    pub fn matches(&self, score: &ScoreEntity) -> bool {
        self.game_id.is_none_or(|id| score.game_id == id)
            && self.event_id.is_none_or(|id| score.event_id == id)
    }
}

/// Abstraction over the persistence layer for strategy bingo games.
///
/// Listing methods return rows in their canonical order: rounds by
/// `round_number`, draws by `draw_order`, scores newest first.
pub trait BingoStore: Send + Sync {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>>;
    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>>;

    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>>;
    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>>;
    fn insert_rounds(&self, rounds: Vec<RoundEntity>) -> BoxFuture<'static, StorageResult<()>>;
    fn save_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<()>>;

    fn list_draws(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<DrawEntity>>>;
    /// Insert a draw, rejecting a repeated number or `draw_order` with a conflict.
    fn insert_draw(&self, draw: DrawEntity) -> BoxFuture<'static, StorageResult<()>>;

    fn list_cards(
        &self,
        game_id: Uuid,
        filter: CardFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<CardEntity>>>;
    fn find_card(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<CardEntity>>>;
    fn save_card(&self, card: CardEntity) -> BoxFuture<'static, StorageResult<()>>;

    fn find_contestant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ContestantEntity>>>;
    fn save_contestant(&self, contestant: ContestantEntity)
    -> BoxFuture<'static, StorageResult<()>>;

    /// Most recent entry of a contestant in a game, optionally restricted to non-bonus rows.
    fn latest_score(
        &self,
        game_id: Uuid,
        contestant_id: Uuid,
        placement_only: bool,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>>;
    /// Append entries in order, rejecting a duplicate `(game, contestant, entry_index)`.
    fn insert_scores(&self, scores: Vec<ScoreEntity>) -> BoxFuture<'static, StorageResult<()>>;
    fn list_scores(&self, query: ScoreQuery) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>>;

    /// Result rows of a game, oldest first.
    fn list_results(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ResultEntity>>>;
    /// Insert a result row and notify subscribers.
    fn insert_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Stream of result rows inserted from now on.
    fn subscribe_results(&self) -> broadcast::Receiver<ResultEntity>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
