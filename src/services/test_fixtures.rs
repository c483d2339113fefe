//! Builders shared by the service tests.

use std::{sync::Arc, time::SystemTime};

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::{
        game_store::{BingoStore, memory::MemoryStore},
        models::{
            BingoGrid, CardEntity, ContestantEntity, GameEntity, GameMode, GameStatus,
        },
    },
    state::{AppState, SharedState},
};

/// Lobby strategy game: 3 rounds, 10/6/3 points, 3 required winners, no draw limit.
pub(crate) fn strategy_game() -> GameEntity {
    let now = SystemTime::now();
    GameEntity {
        id: Uuid::new_v4(),
        event_id: Some(Uuid::new_v4()),
        name: "Friday bingo".into(),
        mode: GameMode::Strategy,
        status: GameStatus::Lobby,
        total_rounds: 3,
        strategy_draw_interval_seconds: 2,
        strategy_draws_per_round: None,
        strategy_intermission_seconds: Some(4),
        strategy_first_place_points: 10,
        strategy_second_place_points: 6,
        strategy_third_place_points: 3,
        strategy_required_winners: Some(3),
        strategy_draw_limit_enabled: false,
        strategy_draw_limit: None,
        strategy_bonus_rules: None,
        created_at: now,
        updated_at: now,
        ended_at: None,
    }
}

pub(crate) fn contestant(game_id: Uuid, username: &str) -> ContestantEntity {
    ContestantEntity {
        id: Uuid::new_v4(),
        game_id,
        username: username.into(),
        code: None,
    }
}

pub(crate) fn card(
    game_id: Uuid,
    contestant_id: Option<Uuid>,
    numbers: Vec<Vec<u8>>,
    marked: Vec<Vec<bool>>,
) -> CardEntity {
    CardEntity {
        id: Uuid::new_v4(),
        game_id,
        contestant_id,
        grid: BingoGrid { numbers, marked },
        auto_mark_enabled: true,
        is_winner_candidate: false,
        updated_at: SystemTime::now(),
    }
}

/// Fifteen auto-marked cards covering 1..=75: whatever number is drawn first,
/// exactly one of them completes a row.
///
/// Card `k` leaves only the diagonal cell of row `r` open, holding `k * 5 + r + 1`;
/// every other cell is pre-marked.
pub(crate) fn line_ready_cards(game_id: Uuid, contestant_id: Uuid) -> Vec<CardEntity> {
    (0..15u8)
        .map(|k| {
            let numbers = (0..5u8)
                .map(|r| {
                    (0..5u8)
                        .map(|c| if c == r { k * 5 + r + 1 } else { 0 })
                        .collect()
                })
                .collect();
            let marked = (0..5)
                .map(|r| (0..5).map(|c| c != r).collect())
                .collect();
            card(game_id, Some(contestant_id), numbers, marked)
        })
        .collect()
}

/// Shared state backed by a fresh [`MemoryStore`].
pub(crate) async fn memory_state() -> (SharedState, MemoryStore) {
    let store = MemoryStore::new();
    let state = AppState::new(AppConfig::default());
    state.set_store(Arc::new(store.clone())).await;
    (state, store)
}

/// Persist `game` with `contestants`, each holding a set of [`line_ready_cards`].
pub(crate) async fn seed_game(
    store: &MemoryStore,
    game: &GameEntity,
    contestants: &[&ContestantEntity],
) {
    store.save_game(game.clone()).await.unwrap();
    for contestant in contestants {
        store.save_contestant((*contestant).clone()).await.unwrap();
        for card in line_ready_cards(game.id, contestant.id) {
            store.save_card(card).await.unwrap();
        }
    }
}
