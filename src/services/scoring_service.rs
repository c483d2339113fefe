use std::{
    collections::{HashMap, HashSet},
    time::SystemTime,
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{BingoStore, ScoreQuery},
        models::{
            AwardSource, GameStatus, ResultEntity, ResultKind, ScoreEntity, ScoreMetadata,
        },
        storage::StorageError,
    },
    error::{ConfigurationError, ServiceError},
};

/// Attempts made when a concurrent writer took the same ledger position.
const MAX_APPEND_ATTEMPTS: usize = 3;

/// Kind of bonus attached to an award.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BonusKind {
    /// Named pattern fully marked on the winning card.
    Pattern,
    /// Placement repeated within the combo window.
    Combo,
}

/// Bonus entry requested on top of the placement points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BonusAward {
    pub kind: BonusKind,
    /// Pattern id, or the combo key.
    pub id: String,
    pub label: String,
    pub points: i32,
}

/// Everything needed to append one award to a contestant's ledger.
#[derive(Debug, Clone)]
pub struct AwardRequest {
    pub game_id: Uuid,
    pub event_id: Uuid,
    pub round_id: Option<Uuid>,
    pub contestant_id: Uuid,
    /// Placement (or manual) points; nothing is written for it when not positive.
    pub base_points: i32,
    pub placement_order: Option<u32>,
    pub source: AwardSource,
    /// Free text kept on manual adjustments.
    pub notes: Option<String>,
    pub bonuses: Vec<BonusAward>,
}

/// Identity of an automatic entry within one round of one contestant.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum EntryKey {
    Placement,
    Pattern(String),
    Combo(String),
}

impl EntryKey {
    fn of(metadata: &ScoreMetadata) -> Option<Self> {
        match metadata {
            ScoreMetadata::Placement { .. } => Some(Self::Placement),
            ScoreMetadata::Pattern { pattern, .. } => Some(Self::Pattern(pattern.clone())),
            ScoreMetadata::Combo { combo, .. } => Some(Self::Combo(combo.clone())),
            ScoreMetadata::Adjustment { .. } => None,
        }
    }
}

/// Append the entries of `request` to the contestant's ledger.
///
/// The running total continues from the single most recent entry of the
/// contestant in the game. The placement entry comes first, then pattern
/// bonuses, then the combo bonus; values that are not positive are skipped and
/// an award with nothing positive writes nothing.
///
/// Automatic awards are keyed on round, contestant and entry kind: entries
/// already in the ledger for that round are not written again, so replaying an
/// award after a partially applied batch only appends what is missing.
pub async fn award_points(
    store: &dyn BingoStore,
    request: &AwardRequest,
) -> Result<Vec<ScoreEntity>, ServiceError> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        let written = written_keys(store, request).await?;
        let latest = store
            .latest_score(request.game_id, request.contestant_id, false)
            .await?;
        let entries = build_entries(request, latest.as_ref(), &written);
        if entries.is_empty() {
            return Ok(entries);
        }

        match store.insert_scores(entries.clone()).await {
            Ok(()) => return Ok(entries),
            Err(StorageError::Conflict { message }) if attempt < MAX_APPEND_ATTEMPTS => {
                warn!(
                    contestant_id = %request.contestant_id,
                    attempt,
                    message,
                    "score ledger moved concurrently; retrying award"
                );
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn written_keys(
    store: &dyn BingoStore,
    request: &AwardRequest,
) -> Result<HashSet<EntryKey>, ServiceError> {
    let Some(round_id) = request.round_id else {
        return Ok(HashSet::new());
    };
    if request.source != AwardSource::Auto {
        return Ok(HashSet::new());
    }

    let history = store.list_scores(ScoreQuery::game(request.game_id)).await?;
    let written: HashSet<EntryKey> = history
        .iter()
        .filter(|entry| {
            entry.contestant_id == request.contestant_id && entry.round_id == Some(round_id)
        })
        .filter_map(|entry| EntryKey::of(&entry.metadata))
        .collect();
    if !written.is_empty() {
        debug!(
            contestant_id = %request.contestant_id,
            round_id = %round_id,
            written = written.len(),
            "round award already partly recorded"
        );
    }
    Ok(written)
}

fn build_entries(
    request: &AwardRequest,
    latest: Option<&ScoreEntity>,
    written: &HashSet<EntryKey>,
) -> Vec<ScoreEntity> {
    let mut total = latest.map_or(0, |entry| entry.total_after_round);
    let mut entry_index = latest.map_or(0, |entry| entry.entry_index);
    let created_at = SystemTime::now();
    let mut entries = Vec::with_capacity(1 + request.bonuses.len());

    let mut push = |points: i32, award_order: Option<u32>, is_bonus: bool, metadata| {
        if EntryKey::of(&metadata).is_some_and(|key| written.contains(&key)) {
            return;
        }
        total += points;
        entry_index += 1;
        entries.push(ScoreEntity {
            id: Uuid::new_v4(),
            event_id: request.event_id,
            game_id: request.game_id,
            round_id: request.round_id,
            contestant_id: request.contestant_id,
            points_awarded: points,
            total_after_round: total,
            entry_index,
            award_order,
            is_bonus,
            metadata,
            created_at,
        });
    };

    if request.base_points > 0 {
        let metadata = match request.placement_order {
            Some(order) => ScoreMetadata::Placement {
                order,
                source: request.source,
            },
            None => ScoreMetadata::Adjustment {
                notes: request.notes.clone(),
                source: request.source,
            },
        };
        push(request.base_points, request.placement_order, false, metadata);
    }

    let patterns = request
        .bonuses
        .iter()
        .filter(|bonus| bonus.kind == BonusKind::Pattern);
    let combos = request
        .bonuses
        .iter()
        .filter(|bonus| bonus.kind == BonusKind::Combo);
    for bonus in patterns.chain(combos).filter(|bonus| bonus.points > 0) {
        let metadata = match bonus.kind {
            BonusKind::Pattern => ScoreMetadata::Pattern {
                pattern: bonus.id.clone(),
                label: bonus.label.clone(),
                source: request.source,
            },
            BonusKind::Combo => ScoreMetadata::Combo {
                combo: bonus.id.clone(),
                label: bonus.label.clone(),
                source: request.source,
            },
        };
        push(bonus.points, None, true, metadata);
    }

    entries
}

/// Most recent entry per contestant, highest total first.
pub fn leaderboard(history: &[ScoreEntity]) -> Vec<ScoreEntity> {
    let mut latest: HashMap<Uuid, &ScoreEntity> = HashMap::new();
    for entry in history {
        latest
            .entry(entry.contestant_id)
            .and_modify(|current| {
                if (entry.created_at, entry.entry_index) > (current.created_at, current.entry_index)
                {
                    *current = entry;
                }
            })
            .or_insert(entry);
    }

    let mut board: Vec<ScoreEntity> = latest.into_values().cloned().collect();
    board.sort_by(|a, b| {
        b.total_after_round
            .cmp(&a.total_after_round)
            .then(a.created_at.cmp(&b.created_at))
    });
    board
}

/// Entry that first reached the highest running total.
pub fn champion_entry(history: &[ScoreEntity]) -> Option<&ScoreEntity> {
    let best = history.iter().map(|entry| entry.total_after_round).max()?;
    history
        .iter()
        .filter(|entry| entry.total_after_round == best)
        .min_by_key(|entry| (entry.created_at, entry.entry_index))
}

/// Record the champion of `game_id` and end the game.
///
/// The game is ended even when nobody scored; no result row is written then.
pub async fn crown_champion(
    store: &dyn BingoStore,
    game_id: Uuid,
) -> Result<Option<ResultEntity>, ServiceError> {
    let mut game = store
        .find_game(game_id)
        .await?
        .ok_or(ConfigurationError::GameNotFound(game_id))?;
    let crowned = store
        .list_results(game_id)
        .await?
        .into_iter()
        .find(|result| result.kind == ResultKind::Champion);
    let history = store.list_scores(ScoreQuery::game(game_id)).await?;

    let result = match (crowned, champion_entry(&history)) {
        (Some(crowned), _) => {
            debug!(game_id = %game_id, "champion already recorded; ending game");
            Some(crowned)
        }
        (None, Some(entry)) => {
            let username = store
                .find_contestant(entry.contestant_id)
                .await?
                .map(|contestant| contestant.username)
                .unwrap_or_else(|| entry.contestant_id.to_string());
            let result = ResultEntity {
                id: Uuid::new_v4(),
                game_id,
                contestant_id: Some(entry.contestant_id),
                card_id: None,
                username: Some(username),
                payout: 0,
                kind: ResultKind::Champion,
                created_at: SystemTime::now(),
            };
            store.insert_result(result.clone()).await?;
            info!(
                game_id = %game_id,
                contestant_id = %entry.contestant_id,
                total = entry.total_after_round,
                "champion selected"
            );
            Some(result)
        }
        (None, None) => {
            info!(game_id = %game_id, "no scores recorded; ending game without champion");
            None
        }
    };

    let now = SystemTime::now();
    game.status = GameStatus::Ended;
    game.ended_at = Some(now);
    game.updated_at = now;
    store.save_game(game).await?;

    Ok(result)
}

/// Short human label of a ledger entry (`+10 pts · 1st`, `+5 Four Corners`).
pub fn format_award_label(entry: &ScoreEntity) -> String {
    let points = entry.points_awarded;
    match &entry.metadata {
        ScoreMetadata::Placement { order, .. } => format!("+{points} pts · {}", ordinal(*order)),
        ScoreMetadata::Pattern { label, .. } | ScoreMetadata::Combo { label, .. } => {
            format!("+{points} {label}")
        }
        ScoreMetadata::Adjustment {
            notes: Some(notes), ..
        } if !notes.trim().is_empty() => format!("+{points} pts · {}", notes.trim()),
        ScoreMetadata::Adjustment { .. } => format!("+{points} pts"),
    }
}

fn ordinal(order: u32) -> String {
    let suffix = match (order % 10, order % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{order}{suffix}")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        dao::game_store::memory::MemoryStore,
        services::test_fixtures::{contestant, strategy_game},
    };

    fn request(game_id: Uuid, contestant_id: Uuid, base_points: i32) -> AwardRequest {
        AwardRequest {
            game_id,
            event_id: game_id,
            round_id: Some(Uuid::new_v4()),
            contestant_id,
            base_points,
            placement_order: Some(1),
            source: AwardSource::Auto,
            notes: None,
            bonuses: Vec::new(),
        }
    }

    fn bonus(kind: BonusKind, id: &str, points: i32) -> BonusAward {
        BonusAward {
            kind,
            id: id.into(),
            label: id.into(),
            points,
        }
    }

    fn entry(contestant_id: Uuid, total: i32, index: u32, at_secs: u64) -> ScoreEntity {
        ScoreEntity {
            id: Uuid::new_v4(),
            event_id: Uuid::nil(),
            game_id: Uuid::nil(),
            round_id: None,
            contestant_id,
            points_awarded: 1,
            total_after_round: total,
            entry_index: index,
            award_order: None,
            is_bonus: false,
            metadata: ScoreMetadata::Placement {
                order: 1,
                source: AwardSource::Auto,
            },
            created_at: SystemTime::UNIX_EPOCH + Duration::from_secs(at_secs),
        }
    }

    #[tokio::test]
    async fn entries_accumulate_placement_then_patterns_then_combo() {
        let store = MemoryStore::new();
        let (game_id, contestant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut award = request(game_id, contestant_id, 10);
        award.bonuses = vec![
            bonus(BonusKind::Combo, "combo", 7),
            bonus(BonusKind::Pattern, "fourCorners", 5),
            bonus(BonusKind::Pattern, "x", 0),
        ];

        let entries = award_points(&store, &award).await.unwrap();

        let totals: Vec<(i32, i32, u32)> = entries
            .iter()
            .map(|e| (e.points_awarded, e.total_after_round, e.entry_index))
            .collect();
        assert_eq!(totals, vec![(10, 10, 1), (5, 15, 2), (7, 22, 3)]);
        assert!(!entries[0].is_bonus);
        assert_eq!(entries[0].award_order, Some(1));
        assert!(matches!(
            &entries[1].metadata,
            ScoreMetadata::Pattern { pattern, .. } if pattern == "fourCorners"
        ));
        assert!(matches!(entries[2].metadata, ScoreMetadata::Combo { .. }));
    }

    #[tokio::test]
    async fn nothing_positive_writes_nothing() {
        let store = MemoryStore::new();
        let (game_id, contestant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut award = request(game_id, contestant_id, 0);
        award.bonuses = vec![bonus(BonusKind::Pattern, "x", -3)];

        assert!(award_points(&store, &award).await.unwrap().is_empty());
        assert!(
            store
                .list_scores(ScoreQuery::game(game_id))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn baseline_is_the_latest_entry_not_a_sum() {
        let store = MemoryStore::new();
        let (game_id, contestant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut seeded = entry(contestant_id, 100, 4, 0);
        seeded.game_id = game_id;
        store.insert_scores(vec![seeded]).await.unwrap();

        let entries = award_points(&store, &request(game_id, contestant_id, 10))
            .await
            .unwrap();
        assert_eq!(entries[0].total_after_round, 110);
        assert_eq!(entries[0].entry_index, 5);
    }

    #[tokio::test]
    async fn consecutive_awards_keep_totals_monotonic() {
        let store = MemoryStore::new();
        let (game_id, contestant_id) = (Uuid::new_v4(), Uuid::new_v4());
        for points in [10, 6, 3] {
            let mut award = request(game_id, contestant_id, points);
            award.bonuses = vec![bonus(BonusKind::Pattern, "x", 2)];
            award_points(&store, &award).await.unwrap();
        }

        let mut history = store.list_scores(ScoreQuery::game(game_id)).await.unwrap();
        history.reverse();
        assert_eq!(history.len(), 6);
        for pair in history.windows(2) {
            assert!(pair[1].points_awarded > 0);
            assert_eq!(
                pair[1].total_after_round,
                pair[0].total_after_round + pair[1].points_awarded
            );
        }
        assert_eq!(history[5].total_after_round, 25);
    }

    #[tokio::test]
    async fn failed_writes_surface_as_errors() {
        let store = MemoryStore::new();
        store.fail_next_writes(1);
        let err = award_points(&store, &request(Uuid::new_v4(), Uuid::new_v4(), 10))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unavailable(_)));
    }

    #[test]
    fn leaderboard_keeps_latest_entry_per_contestant() {
        let (ann, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let history = vec![
            entry(bob, 12, 2, 30),
            entry(ann, 20, 2, 20),
            entry(bob, 6, 1, 10),
            entry(ann, 10, 1, 5),
        ];

        let board = leaderboard(&history);
        let rows: Vec<(Uuid, i32)> = board
            .iter()
            .map(|e| (e.contestant_id, e.total_after_round))
            .collect();
        assert_eq!(rows, vec![(ann, 20), (bob, 12)]);
    }

    #[test]
    fn champion_tie_goes_to_whoever_got_there_first() {
        let (ann, bob) = (Uuid::new_v4(), Uuid::new_v4());
        let history = vec![entry(ann, 15, 2, 40), entry(bob, 15, 3, 30), entry(ann, 5, 1, 1)];
        assert_eq!(champion_entry(&history).map(|e| e.contestant_id), Some(bob));
        assert!(champion_entry(&[]).is_none());
    }

    #[tokio::test]
    async fn crowning_writes_result_and_ends_game() {
        let store = MemoryStore::new();
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        store.save_game(game.clone()).await.unwrap();
        store.save_contestant(ann.clone()).await.unwrap();
        award_points(&store, &request(game.id, ann.id, 10))
            .await
            .unwrap();

        let result = crown_champion(&store, game.id).await.unwrap().unwrap();
        assert_eq!(result.kind, ResultKind::Champion);
        assert_eq!(result.username.as_deref(), Some("ann"));
        assert_eq!(result.payout, 0);

        let ended = store.find_game(game.id).await.unwrap().unwrap();
        assert_eq!(ended.status, GameStatus::Ended);
        assert!(ended.ended_at.is_some());
    }

    #[tokio::test]
    async fn crowning_without_scores_still_ends_game() {
        let store = MemoryStore::new();
        let game = strategy_game();
        store.save_game(game.clone()).await.unwrap();

        assert!(crown_champion(&store, game.id).await.unwrap().is_none());
        assert!(store.results().await.is_empty());
        let ended = store.find_game(game.id).await.unwrap().unwrap();
        assert_eq!(ended.status, GameStatus::Ended);
    }

    #[test]
    fn labels_describe_the_award() {
        let mut placement = entry(Uuid::new_v4(), 10, 1, 0);
        placement.points_awarded = 10;
        assert_eq!(format_award_label(&placement), "+10 pts · 1st");

        placement.metadata = ScoreMetadata::Placement {
            order: 2,
            source: AwardSource::Auto,
        };
        assert_eq!(format_award_label(&placement), "+10 pts · 2nd");

        placement.points_awarded = 5;
        placement.metadata = ScoreMetadata::Pattern {
            pattern: "fourCorners".into(),
            label: "Four Corners".into(),
            source: AwardSource::Auto,
        };
        assert_eq!(format_award_label(&placement), "+5 Four Corners");

        placement.metadata = ScoreMetadata::Adjustment {
            notes: None,
            source: AwardSource::Manual,
        };
        assert_eq!(format_award_label(&placement), "+5 pts");
        assert_eq!(ordinal(11), "11th");
        assert_eq!(ordinal(23), "23rd");
    }

    #[tokio::test]
    async fn replayed_round_award_only_appends_missing_entries() {
        let store = MemoryStore::new();
        let (game_id, contestant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut award = request(game_id, contestant_id, 10);
        award.bonuses = vec![bonus(BonusKind::Pattern, "fourCorners", 5)];

        // Only the placement row of the batch reached the ledger.
        let mut first = award_points(&store, &award).await.unwrap();
        first.truncate(1);
        let store = MemoryStore::new();
        store.insert_scores(first).await.unwrap();

        let appended = award_points(&store, &award).await.unwrap();
        assert_eq!(appended.len(), 1);
        assert!(matches!(appended[0].metadata, ScoreMetadata::Pattern { .. }));
        assert_eq!(appended[0].total_after_round, 15);

        assert!(award_points(&store, &award).await.unwrap().is_empty());
        let history = store.list_scores(ScoreQuery::game(game_id)).await.unwrap();
        let placements = history.iter().filter(|entry| !entry.is_bonus).count();
        assert_eq!((history.len(), placements), (2, 1));
    }

    #[tokio::test]
    async fn manual_awards_are_never_deduplicated() {
        let store = MemoryStore::new();
        let (game_id, contestant_id) = (Uuid::new_v4(), Uuid::new_v4());
        let mut award = request(game_id, contestant_id, 4);
        award.source = AwardSource::Manual;

        award_points(&store, &award).await.unwrap();
        let second = award_points(&store, &award).await.unwrap();
        assert_eq!(second[0].total_after_round, 8);
    }

    #[tokio::test]
    async fn crowning_twice_keeps_a_single_champion() {
        let store = MemoryStore::new();
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        store.save_game(game.clone()).await.unwrap();
        store.save_contestant(ann.clone()).await.unwrap();
        award_points(&store, &request(game.id, ann.id, 10))
            .await
            .unwrap();

        let first = crown_champion(&store, game.id).await.unwrap().unwrap();
        let second = crown_champion(&store, game.id).await.unwrap().unwrap();
        assert_eq!(first.id, second.id);

        let champions = store
            .list_results(game.id)
            .await
            .unwrap()
            .into_iter()
            .filter(|result| result.kind == ResultKind::Champion)
            .count();
        assert_eq!(champions, 1);
    }
}
