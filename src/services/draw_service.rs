use std::{collections::HashSet, time::SystemTime};

use rand::{Rng, seq::IndexedRandom};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{BingoStore, CardFilter},
        models::{BingoGrid, DrawEntity},
    },
    error::ServiceError,
    services::patterns::{has_line_bingo, merged_marks},
};

/// Highest number of the pool; numbers run from 1 to `POOL_SIZE`.
pub const POOL_SIZE: u8 = 75;

/// Numbers drawn so far for a game.
pub async fn drawn_numbers(
    store: &dyn BingoStore,
    game_id: Uuid,
) -> Result<HashSet<u8>, ServiceError> {
    let draws = store.list_draws(game_id).await?;
    Ok(draws.into_iter().map(|draw| draw.number).collect())
}

/// Draw a number that has not been drawn for `game_id` yet and persist it.
///
/// Fails with [`ServiceError::PoolExhausted`] once all 75 numbers are out; the
/// caller must end the round instead of retrying. Auto-marking happens after
/// the draw is stored and its failures are only logged.
pub async fn draw_next<R>(
    store: &dyn BingoStore,
    game_id: Uuid,
    rng: &mut R,
) -> Result<DrawEntity, ServiceError>
where
    R: Rng + Send + ?Sized,
{
    let prior = store.list_draws(game_id).await?;
    let drawn: HashSet<u8> = prior.iter().map(|draw| draw.number).collect();
    let remaining: Vec<u8> = (1..=POOL_SIZE)
        .filter(|number| !drawn.contains(number))
        .collect();

    let number = *remaining
        .choose(rng)
        .ok_or(ServiceError::PoolExhausted(game_id))?;
    let draw_order = u32::try_from(prior.len()).unwrap_or(u32::MAX).saturating_add(1);

    let draw = DrawEntity {
        id: Uuid::new_v4(),
        game_id,
        number,
        draw_order,
        created_at: SystemTime::now(),
    };
    store.insert_draw(draw.clone()).await?;
    debug!(game_id = %game_id, number, draw_order, "number drawn");

    if let Err(err) = apply_auto_marks(store, game_id, number).await {
        warn!(game_id = %game_id, number, error = %err, "auto-mark propagation failed");
    }

    Ok(draw)
}

/// Mark `number` on every auto-marking card of the game and refresh its winner flag.
///
/// Returns how many cards changed.
pub async fn apply_auto_marks(
    store: &dyn BingoStore,
    game_id: Uuid,
    number: u8,
) -> Result<usize, ServiceError> {
    let cards = store.list_cards(game_id, CardFilter::auto_mark()).await?;
    let mut updated = 0;

    for mut card in cards {
        if !mark_number(&mut card.grid, number) {
            continue;
        }
        card.is_winner_candidate = has_line_bingo(&card.grid.marked);
        card.updated_at = SystemTime::now();
        store.save_card(card).await?;
        updated += 1;
    }

    Ok(updated)
}

/// Mark every cell holding `number`, normalising the marked matrix to the grid shape.
fn mark_number(grid: &mut BingoGrid, number: u8) -> bool {
    if !grid.numbers.iter().flatten().any(|cell| *cell == number) {
        return false;
    }
    grid.marked = merged_marks(grid, &HashSet::from([number]));
    true
}

#[cfg(test)]
mod tests {
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::{
        dao::game_store::memory::MemoryStore,
        services::test_fixtures::{card, line_ready_cards},
    };

    #[tokio::test]
    async fn pool_is_drawn_without_repeats_then_exhausted() {
        let store = MemoryStore::new();
        let game_id = Uuid::new_v4();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..POOL_SIZE {
            draw_next(&store, game_id, &mut rng).await.unwrap();
        }

        let draws = store.list_draws(game_id).await.unwrap();
        let orders: Vec<u32> = draws.iter().map(|draw| draw.draw_order).collect();
        assert_eq!(orders, (1..=75).collect::<Vec<u32>>());
        let numbers: HashSet<u8> = draws.iter().map(|draw| draw.number).collect();
        assert_eq!(numbers.len(), 75);

        let err = draw_next(&store, game_id, &mut rng).await.unwrap_err();
        assert!(matches!(err, ServiceError::PoolExhausted(id) if id == game_id));
    }

    #[tokio::test]
    async fn failed_insert_leaves_no_gap() {
        let store = MemoryStore::new();
        let game_id = Uuid::new_v4();
        let mut rng = StdRng::seed_from_u64(1);

        draw_next(&store, game_id, &mut rng).await.unwrap();
        store.fail_next_writes(1);
        assert!(draw_next(&store, game_id, &mut rng).await.is_err());
        draw_next(&store, game_id, &mut rng).await.unwrap();

        let orders: Vec<u32> = store
            .list_draws(game_id)
            .await
            .unwrap()
            .iter()
            .map(|draw| draw.draw_order)
            .collect();
        assert_eq!(orders, vec![1, 2]);
    }

    #[tokio::test]
    async fn auto_marks_flag_winner_candidates() {
        let store = MemoryStore::new();
        let game_id = Uuid::new_v4();
        let contestant_id = Uuid::new_v4();
        for card in line_ready_cards(game_id, contestant_id) {
            store.save_card(card).await.unwrap();
        }
        let mut manual = card(
            game_id,
            Some(contestant_id),
            vec![vec![12; 5]; 5],
            vec![vec![false; 5]; 5],
        );
        manual.auto_mark_enabled = false;
        store.save_card(manual.clone()).await.unwrap();

        let updated = apply_auto_marks(&store, game_id, 12).await.unwrap();
        assert_eq!(updated, 1);

        let candidates = store
            .list_cards(game_id, CardFilter::winner_candidates())
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert!(candidates[0].grid.marked[1].iter().all(|cell| *cell));

        let untouched = store.find_card(manual.id).await.unwrap().unwrap();
        assert_eq!(untouched, manual);
    }
}
