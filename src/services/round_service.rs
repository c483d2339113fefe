use std::{
    collections::HashSet,
    time::{Duration, SystemTime},
};

use indexmap::IndexSet;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{BingoStore, ScoreQuery},
        models::{AwardSource, RoundEntity, RoundStatus, ScoreMetadata},
    },
    error::ServiceError,
    state::game::StrategyConfig,
};

/// Where the controller picks up when it looks for work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextRound {
    /// A round left active by an earlier run; it keeps drawing where it stopped.
    Resume(RoundEntity),
    /// Lowest pending round.
    Activate(RoundEntity),
    /// Every round is completed.
    Exhausted,
}

/// Draws and placements already recorded for a round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundProgress {
    pub draws: u32,
    /// Placed contestants in placement order.
    pub winners: IndexSet<Uuid>,
}

/// Create the missing rounds `1..=total_rounds` and refresh unfinished ones.
///
/// Existing round numbers are never duplicated. Rounds that are still pending,
/// active or cooling down take the current draws-per-round and draw interval
/// values. Returns every round of the game ordered by number.
pub async fn ensure_rounds(
    store: &dyn BingoStore,
    config: &StrategyConfig,
) -> Result<Vec<RoundEntity>, ServiceError> {
    let existing = store.list_rounds(config.game_id).await?;
    let known: HashSet<u32> = existing.iter().map(|round| round.round_number).collect();

    let missing: Vec<RoundEntity> = (1..=config.total_rounds)
        .filter(|number| !known.contains(number))
        .map(|round_number| RoundEntity {
            id: Uuid::new_v4(),
            game_id: config.game_id,
            round_number,
            draws_per_round: config.draws_per_round,
            draw_interval_seconds: config.draw_interval_seconds,
            status: RoundStatus::Pending,
            started_at: None,
            ended_at: None,
            intermission_ends_at: None,
        })
        .collect();
    if !missing.is_empty() {
        info!(
            game_id = %config.game_id,
            created = missing.len(),
            "seeding strategy rounds"
        );
        store.insert_rounds(missing).await?;
    }

    for mut round in existing {
        let stale = round.draws_per_round != config.draws_per_round
            || round.draw_interval_seconds != config.draw_interval_seconds;
        if round.status.is_unfinished() && stale {
            round.draws_per_round = config.draws_per_round;
            round.draw_interval_seconds = config.draw_interval_seconds;
            store.save_round(round).await?;
        }
    }

    Ok(store.list_rounds(config.game_id).await?)
}

/// Lowest-numbered round still waiting to be played.
pub fn next_pending_round(rounds: &[RoundEntity]) -> Option<&RoundEntity> {
    rounds
        .iter()
        .filter(|round| round.status == RoundStatus::Pending)
        .min_by_key(|round| round.round_number)
}

/// Round currently drawing numbers.
pub fn active_round(rounds: &[RoundEntity]) -> Option<&RoundEntity> {
    rounds
        .iter()
        .find(|round| round.status == RoundStatus::Active)
}

/// Pick the round to play next for `game_id`.
///
/// Rounds stuck in cooldown are completed. An active round wins over pending
/// ones; when several are active the lowest is kept and the others completed.
pub async fn next_round(store: &dyn BingoStore, game_id: Uuid) -> Result<NextRound, ServiceError> {
    let rounds = store.list_rounds(game_id).await?;
    let now = SystemTime::now();
    let mut resumed: Option<RoundEntity> = None;

    for round in &rounds {
        let keep = round.status == RoundStatus::Active && resumed.is_none();
        if keep {
            resumed = Some(round.clone());
            continue;
        }
        if !matches!(round.status, RoundStatus::Active | RoundStatus::Cooldown) {
            continue;
        }
        warn!(
            game_id = %game_id,
            round = round.round_number,
            status = ?round.status,
            "completing round left open by a previous run"
        );
        let mut closed = round.clone();
        closed.status = RoundStatus::Completed;
        closed.ended_at.get_or_insert(now);
        store.save_round(closed).await?;
    }

    if let Some(round) = resumed {
        return Ok(NextRound::Resume(round));
    }
    Ok(next_pending_round(&rounds)
        .cloned()
        .map_or(NextRound::Exhausted, NextRound::Activate))
}

/// Draws made since `round` started and the automatic placements written for it.
pub async fn round_progress(
    store: &dyn BingoStore,
    round: &RoundEntity,
) -> Result<RoundProgress, ServiceError> {
    let draws = match round.started_at {
        Some(started_at) => store
            .list_draws(round.game_id)
            .await?
            .iter()
            .filter(|draw| draw.created_at >= started_at)
            .count(),
        None => 0,
    };

    let mut placements: Vec<(u32, Uuid)> = store
        .list_scores(ScoreQuery::game(round.game_id))
        .await?
        .into_iter()
        .filter(|entry| entry.round_id == Some(round.id))
        .filter_map(|entry| match entry.metadata {
            ScoreMetadata::Placement {
                order,
                source: AwardSource::Auto,
            } => Some((order, entry.contestant_id)),
            _ => None,
        })
        .collect();
    placements.sort_unstable();

    Ok(RoundProgress {
        draws: u32::try_from(draws).unwrap_or(u32::MAX),
        winners: placements.into_iter().map(|(_, contestant_id)| contestant_id).collect(),
    })
}

/// Move `round` from pending to active.
///
/// A round left active or cooling down by an interrupted run is completed
/// first so at most one round of the game is ever active.
pub async fn activate_round(
    store: &dyn BingoStore,
    mut round: RoundEntity,
) -> Result<RoundEntity, ServiceError> {
    if !round.status.can_advance_to(RoundStatus::Active) {
        return Err(ServiceError::InvalidState(format!(
            "round {} is {:?} and cannot become active",
            round.round_number, round.status
        )));
    }

    let now = SystemTime::now();
    for mut stale in store.list_rounds(round.game_id).await? {
        if stale.id == round.id
            || !matches!(stale.status, RoundStatus::Active | RoundStatus::Cooldown)
        {
            continue;
        }
        warn!(
            game_id = %round.game_id,
            stale_round = stale.round_number,
            "completing round left open by a previous run"
        );
        stale.status = RoundStatus::Completed;
        stale.ended_at.get_or_insert(now);
        store.save_round(stale).await?;
    }

    round.status = RoundStatus::Active;
    round.started_at = Some(now);
    round.ended_at = None;
    round.intermission_ends_at = None;
    store.save_round(round.clone()).await?;
    Ok(round)
}

/// Complete the round and stamp when the following intermission ends.
///
/// Completing an already completed round returns it unchanged.
pub async fn complete_round(
    store: &dyn BingoStore,
    round_id: Uuid,
    intermission: Duration,
) -> Result<RoundEntity, ServiceError> {
    let mut round = store
        .find_round(round_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("round `{round_id}`")))?;
    if round.status == RoundStatus::Completed {
        return Ok(round);
    }
    if !round.status.can_advance_to(RoundStatus::Completed) {
        return Err(ServiceError::InvalidState(format!(
            "round {} is {:?} and cannot be completed",
            round.round_number, round.status
        )));
    }

    let now = SystemTime::now();
    round.status = RoundStatus::Completed;
    round.ended_at = Some(now);
    round.intermission_ends_at = Some(now + intermission);
    store.save_round(round.clone()).await?;
    Ok(round)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig, dao::game_store::memory::MemoryStore,
        services::test_fixtures::strategy_game,
    };

    fn config() -> StrategyConfig {
        StrategyConfig::from_game(&strategy_game(), &AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn seeding_twice_keeps_one_row_per_round() {
        let store = MemoryStore::new();
        let config = config();

        ensure_rounds(&store, &config).await.unwrap();
        let rounds = ensure_rounds(&store, &config).await.unwrap();

        let numbers: Vec<u32> = rounds.iter().map(|round| round.round_number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        assert!(rounds.iter().all(|round| round.status == RoundStatus::Pending));
    }

    #[tokio::test]
    async fn draw_cap_edits_reach_unfinished_rounds_only() {
        let store = MemoryStore::new();
        let mut config = config();
        let rounds = ensure_rounds(&store, &config).await.unwrap();
        let first = activate_round(&store, rounds[0].clone()).await.unwrap();
        complete_round(&store, first.id, Duration::from_secs(5))
            .await
            .unwrap();

        config.draws_per_round = 40;
        let rounds = ensure_rounds(&store, &config).await.unwrap();

        assert_eq!(rounds[0].draws_per_round, 75);
        assert_eq!(rounds[1].draws_per_round, 40);
        assert_eq!(rounds[2].draws_per_round, 40);
    }

    #[tokio::test]
    async fn extra_rounds_are_appended() {
        let store = MemoryStore::new();
        let mut config = config();
        ensure_rounds(&store, &config).await.unwrap();

        config.total_rounds = 5;
        let rounds = ensure_rounds(&store, &config).await.unwrap();
        assert_eq!(rounds.len(), 5);
        assert_eq!(rounds[4].round_number, 5);
    }

    #[tokio::test]
    async fn activation_closes_a_stale_round() {
        let store = MemoryStore::new();
        let rounds = ensure_rounds(&store, &config()).await.unwrap();
        activate_round(&store, rounds[0].clone()).await.unwrap();

        let pending = store.list_rounds(rounds[0].game_id).await.unwrap();
        let next = next_pending_round(&pending).cloned().unwrap();
        assert_eq!(next.round_number, 2);
        activate_round(&store, next).await.unwrap();

        let rounds = store.list_rounds(rounds[0].game_id).await.unwrap();
        let active: Vec<u32> = rounds
            .iter()
            .filter(|round| round.status == RoundStatus::Active)
            .map(|round| round.round_number)
            .collect();
        assert_eq!(active, vec![2]);
        assert_eq!(rounds[0].status, RoundStatus::Completed);
        assert!(rounds[0].ended_at.is_some());
    }

    #[tokio::test]
    async fn completed_rounds_are_never_reactivated() {
        let store = MemoryStore::new();
        let rounds = ensure_rounds(&store, &config()).await.unwrap();
        let round = activate_round(&store, rounds[0].clone()).await.unwrap();
        let done = complete_round(&store, round.id, Duration::from_secs(4))
            .await
            .unwrap();

        let intermission = done
            .intermission_ends_at
            .unwrap()
            .duration_since(done.ended_at.unwrap())
            .unwrap();
        assert_eq!(intermission, Duration::from_secs(4));

        let again = complete_round(&store, round.id, Duration::from_secs(9))
            .await
            .unwrap();
        assert_eq!(again, done);
        assert!(matches!(
            activate_round(&store, done).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn interval_edits_reach_unfinished_rounds() {
        let store = MemoryStore::new();
        let mut config = config();
        let rounds = ensure_rounds(&store, &config).await.unwrap();
        let first = activate_round(&store, rounds[0].clone()).await.unwrap();
        complete_round(&store, first.id, Duration::from_secs(5))
            .await
            .unwrap();

        config.draw_interval_seconds = 9;
        let rounds = ensure_rounds(&store, &config).await.unwrap();
        let intervals: Vec<u32> = rounds.iter().map(|r| r.draw_interval_seconds).collect();
        assert_eq!(intervals, vec![2, 9, 9]);
    }

    #[tokio::test]
    async fn open_rounds_are_resumed_before_pending_ones() {
        let store = MemoryStore::new();
        let rounds = ensure_rounds(&store, &config()).await.unwrap();
        let game_id = rounds[0].game_id;
        let active = activate_round(&store, rounds[1].clone()).await.unwrap();
        let mut cooling = rounds[0].clone();
        cooling.status = RoundStatus::Cooldown;
        store.save_round(cooling).await.unwrap();

        assert_eq!(
            next_round(&store, game_id).await.unwrap(),
            NextRound::Resume(active.clone())
        );
        let first = store.find_round(rounds[0].id).await.unwrap().unwrap();
        assert_eq!(first.status, RoundStatus::Completed);
        assert!(first.ended_at.is_some());

        complete_round(&store, active.id, Duration::ZERO).await.unwrap();
        assert!(matches!(
            next_round(&store, game_id).await.unwrap(),
            NextRound::Activate(round) if round.round_number == 3
        ));
    }

    #[tokio::test]
    async fn last_round_left_active_is_not_exhausted() {
        let store = MemoryStore::new();
        let rounds = ensure_rounds(&store, &config()).await.unwrap();
        let game_id = rounds[0].game_id;
        for round in &rounds[..2] {
            let round = activate_round(&store, round.clone()).await.unwrap();
            complete_round(&store, round.id, Duration::ZERO).await.unwrap();
        }
        let last = activate_round(&store, rounds[2].clone()).await.unwrap();

        assert_eq!(
            next_round(&store, game_id).await.unwrap(),
            NextRound::Resume(last.clone())
        );
        complete_round(&store, last.id, Duration::ZERO).await.unwrap();
        assert_eq!(next_round(&store, game_id).await.unwrap(), NextRound::Exhausted);
    }

    #[tokio::test]
    async fn progress_counts_draws_and_auto_placements_of_the_round() {
        use crate::{
            dao::models::{DrawEntity, ScoreEntity},
            services::scoring_service::{AwardRequest, award_points},
        };

        let store = MemoryStore::new();
        let rounds = ensure_rounds(&store, &config()).await.unwrap();
        let game_id = rounds[0].game_id;
        let round = activate_round(&store, rounds[0].clone()).await.unwrap();
        for (order, number) in [(1, 7), (2, 12)] {
            store
                .insert_draw(DrawEntity {
                    id: Uuid::new_v4(),
                    game_id,
                    number,
                    draw_order: order,
                    created_at: SystemTime::now(),
                })
                .await
                .unwrap();
        }

        let (ann, bob) = (Uuid::new_v4(), Uuid::new_v4());
        for (contestant_id, order, source) in [
            (bob, 2, AwardSource::Auto),
            (ann, 1, AwardSource::Auto),
            (bob, 1, AwardSource::Manual),
        ] {
            let request = AwardRequest {
                game_id,
                event_id: game_id,
                round_id: Some(round.id),
                contestant_id,
                base_points: 5,
                placement_order: Some(order),
                source,
                notes: None,
                bonuses: Vec::new(),
            };
            let entries: Vec<ScoreEntity> = award_points(&store, &request).await.unwrap();
            assert_eq!(entries.len(), 1);
        }

        let progress = round_progress(&store, &round).await.unwrap();
        assert_eq!(progress.draws, 2);
        assert_eq!(progress.winners.into_iter().collect::<Vec<_>>(), vec![ann, bob]);
    }
}
