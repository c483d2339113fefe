//! Process-local [`BingoStore`] used for local runs and the service tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use tokio::sync::{RwLock, broadcast};
use uuid::Uuid;

use super::{BingoStore, CardFilter, ScoreQuery};
use crate::dao::{
    models::{
        CardEntity, ContestantEntity, DrawEntity, GameEntity, ResultEntity, RoundEntity,
        ScoreEntity,
    },
    storage::{StorageError, StorageResult},
};

const RESULT_FEED_CAPACITY: usize = 64;

#[derive(Default)]
struct Tables {
    games: HashMap<Uuid, GameEntity>,
    rounds: Vec<RoundEntity>,
    draws: Vec<DrawEntity>,
    cards: Vec<CardEntity>,
    contestants: HashMap<Uuid, ContestantEntity>,
    scores: Vec<ScoreEntity>,
    results: Vec<ResultEntity>,
}

/// In-memory storage enforcing the same uniqueness rules as the MongoDB indexes.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    tables: RwLock<Tables>,
    results_tx: broadcast::Sender<ResultEntity>,
    failing_writes: AtomicUsize,
}

#[derive(Debug, thiserror::Error)]
#[error("simulated write failure")]
struct SimulatedFailure;

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        let (results_tx, _rx) = broadcast::channel(RESULT_FEED_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                tables: RwLock::new(Tables::default()),
                results_tx,
                failing_writes: AtomicUsize::new(0),
            }),
        }
    }

    /// Make the next `count` draw/score writes fail as if the backend were unreachable.
    #[cfg(test)]
    pub(crate) fn fail_next_writes(&self, count: usize) {
        self.inner.failing_writes.store(count, Ordering::SeqCst);
    }

    fn check_write(&self, operation: &str) -> StorageResult<()> {
        let injected = self
            .inner
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StorageError::unavailable(
                format!("failed to {operation}"),
                SimulatedFailure,
            ));
        }
        Ok(())
    }

    async fn write_draw(&self, draw: DrawEntity) -> StorageResult<()> {
        self.check_write("insert draw")?;
        let mut tables = self.inner.tables.write().await;
        let clash = tables.draws.iter().any(|existing| {
            existing.game_id == draw.game_id
                && (existing.number == draw.number || existing.draw_order == draw.draw_order)
        });
        if clash {
            return Err(StorageError::conflict(format!(
                "draw {} (order {}) already recorded for game `{}`",
                draw.number, draw.draw_order, draw.game_id
            )));
        }
        tables.draws.push(draw);
        Ok(())
    }

    async fn write_rounds(&self, rounds: Vec<RoundEntity>) -> StorageResult<()> {
        let mut tables = self.inner.tables.write().await;
        for round in &rounds {
            let clash = tables.rounds.iter().any(|existing| {
                existing.game_id == round.game_id && existing.round_number == round.round_number
            });
            if clash {
                return Err(StorageError::conflict(format!(
                    "round {} already exists for game `{}`",
                    round.round_number, round.game_id
                )));
            }
        }
        tables.rounds.extend(rounds);
        Ok(())
    }

    async fn write_scores(&self, scores: Vec<ScoreEntity>) -> StorageResult<()> {
        self.check_write("insert scores")?;
        let mut tables = self.inner.tables.write().await;
        for score in &scores {
            let clash = tables.scores.iter().any(|existing| {
                existing.game_id == score.game_id
                    && existing.contestant_id == score.contestant_id
                    && existing.entry_index == score.entry_index
            });
            if clash {
                return Err(StorageError::conflict(format!(
                    "score entry {} already recorded for contestant `{}`",
                    score.entry_index, score.contestant_id
                )));
            }
        }
        tables.scores.extend(scores);
        Ok(())
    }

    async fn read_scores(&self, query: ScoreQuery) -> Vec<ScoreEntity> {
        let tables = self.inner.tables.read().await;
        let matching = tables
            .scores
            .iter()
            .rev()
            .filter(|score| query.matches(score))
            .cloned();
        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Every result row written so far, oldest first.
    pub async fn results(&self) -> Vec<ResultEntity> {
        self.inner.tables.read().await.results.clone()
    }
}

impl BingoStore for MemoryStore {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.tables.read().await.games.get(&id).cloned()) })
    }

    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.tables.write().await.games.insert(game.id, game);
            Ok(())
        })
    }

    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            let mut rounds: Vec<RoundEntity> = tables
                .rounds
                .iter()
                .filter(|round| round.game_id == game_id)
                .cloned()
                .collect();
            rounds.sort_by_key(|round| round.round_number);
            Ok(rounds)
        })
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables.rounds.iter().find(|round| round.id == id).cloned())
        })
    }

    fn insert_rounds(&self, rounds: Vec<RoundEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_rounds(rounds).await })
    }

    fn save_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            match tables.rounds.iter_mut().find(|existing| existing.id == round.id) {
                Some(slot) => *slot = round,
                None => tables.rounds.push(round),
            }
            Ok(())
        })
    }

    fn list_draws(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<DrawEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            let mut draws: Vec<DrawEntity> = tables
                .draws
                .iter()
                .filter(|draw| draw.game_id == game_id)
                .cloned()
                .collect();
            draws.sort_by_key(|draw| draw.draw_order);
            Ok(draws)
        })
    }

    fn insert_draw(&self, draw: DrawEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_draw(draw).await })
    }

    fn list_cards(
        &self,
        game_id: Uuid,
        filter: CardFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<CardEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .cards
                .iter()
                .filter(|card| card.game_id == game_id && filter.matches(card))
                .cloned()
                .collect())
        })
    }

    fn find_card(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<CardEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables.cards.iter().find(|card| card.id == id).cloned())
        })
    }

    fn save_card(&self, card: CardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            match tables.cards.iter_mut().find(|existing| existing.id == card.id) {
                Some(slot) => *slot = card,
                None => tables.cards.push(card),
            }
            Ok(())
        })
    }

    fn find_contestant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ContestantEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.tables.read().await.contestants.get(&id).cloned()) })
    }

    fn save_contestant(
        &self,
        contestant: ContestantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut tables = store.inner.tables.write().await;
            tables.contestants.insert(contestant.id, contestant);
            Ok(())
        })
    }

    fn latest_score(
        &self,
        game_id: Uuid,
        contestant_id: Uuid,
        placement_only: bool,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .scores
                .iter()
                .rev()
                .find(|score| {
                    score.game_id == game_id
                        && score.contestant_id == contestant_id
                        && (!placement_only || !score.is_bonus)
                })
                .cloned())
        })
    }

    fn insert_scores(&self, scores: Vec<ScoreEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.write_scores(scores).await })
    }

    fn list_scores(&self, query: ScoreQuery) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.read_scores(query).await) })
    }

    fn list_results(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ResultEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let tables = store.inner.tables.read().await;
            Ok(tables
                .results
                .iter()
                .filter(|result| result.game_id == game_id)
                .cloned()
                .collect())
        })
    }

    fn insert_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .tables
                .write()
                .await
                .results
                .push(result.clone());
            // Nobody listening is fine.
            let _ = store.inner.results_tx.send(result);
            Ok(())
        })
    }

    fn subscribe_results(&self) -> broadcast::Receiver<ResultEntity> {
        self.inner.results_tx.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
