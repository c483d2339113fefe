use std::{
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::{sync::RwLock, sync::broadcast, time::sleep};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoCardDocument, MongoContestantDocument, MongoDrawDocument, MongoGameDocument,
        MongoResultDocument, MongoRoundDocument, MongoScoreDocument, doc_id,
    },
};
use crate::dao::{
    game_store::{BingoStore, CardFilter, ScoreQuery},
    models::{
        CardEntity, ContestantEntity, DrawEntity, GameEntity, ResultEntity, RoundEntity,
        ScoreEntity,
    },
    storage::StorageResult,
};

const GAMES: &str = "games";
const ROUNDS: &str = "rounds";
const DRAWS: &str = "draws";
const CARDS: &str = "cards";
const CONTESTANTS: &str = "contestants";
const SCORES: &str = "scores";
const RESULTS: &str = "results";

const RESULT_FEED_CAPACITY: usize = 256;
const WATCH_RETRY_INITIAL: Duration = Duration::from_millis(500);
const WATCH_RETRY_MAX: Duration = Duration::from_secs(30);

/// MongoDB backed [`BingoStore`].
///
/// Result inserts are published through a change stream on the `results`
/// collection so rows written by other processes reach the controllers too.
/// Deployments without change streams (standalone servers) fall back to
/// publishing the rows inserted by this process.
#[derive(Clone)]
pub struct MongoStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
    results_tx: broadcast::Sender<ResultEntity>,
    watching: AtomicBool,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn database(&self) -> Database {
        let guard = self.state.read().await;
        guard.database.clone()
    }

    async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    /// Follow inserts on `results` until the stream errors.
    async fn follow_results(&self) -> MongoResult<()> {
        let collection = self
            .database()
            .await
            .collection::<MongoResultDocument>(RESULTS);
        let mut stream = collection
            .watch()
            .pipeline(vec![doc! { "$match": { "operationType": "insert" } }])
            .await
            .map_err(|source| MongoDaoError::WatchResults { source })?;

        self.watching.store(true, Ordering::SeqCst);
        debug!("following result inserts through a change stream");

        loop {
            let event = match stream.try_next().await {
                Ok(Some(event)) => event,
                Ok(None) => return Ok(()),
                Err(source) => {
                    self.watching.store(false, Ordering::SeqCst);
                    return Err(MongoDaoError::WatchResults { source });
                }
            };
            let Some(document) = event.full_document else {
                continue;
            };
            match ResultEntity::try_from(document) {
                Ok(result) => {
                    let _ = self.results_tx.send(result);
                }
                Err(err) => warn!(error = %err, "skipping malformed result document"),
            }
        }
    }
}

/// Keep a change stream open on `results`, reopening it with backoff.
async fn watch_results(inner: Weak<MongoInner>) {
    let mut delay = WATCH_RETRY_INITIAL;
    loop {
        let Some(store) = inner.upgrade() else {
            return;
        };
        match store.follow_results().await {
            Ok(()) => delay = WATCH_RETRY_INITIAL,
            Err(err) => {
                store.watching.store(false, Ordering::SeqCst);
                warn!(
                    error = %err,
                    retry_in_ms = delay.as_millis(),
                    "result change stream unavailable"
                );
            }
        }
        drop(store);
        sleep(delay).await;
        delay = (delay * 2).min(WATCH_RETRY_MAX);
    }
}

fn collect_entities<D, E>(documents: Vec<D>) -> MongoResult<Vec<E>>
where
    E: TryFrom<D, Error = MongoDaoError>,
{
    documents.into_iter().map(E::try_from).collect()
}

fn unique_index(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(
            IndexOptions::builder()
                .name(Some(name.to_owned()))
                .unique(Some(true))
                .build(),
        )
        .build()
}

impl MongoStore {
    /// Establish a connection to MongoDB, ensure indexes are present and
    /// start following the results collection.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;
        let (results_tx, _) = broadcast::channel(RESULT_FEED_CAPACITY);

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
            results_tx,
            watching: AtomicBool::new(false),
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        tokio::spawn(watch_results(Arc::downgrade(&store.inner)));
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.inner.database().await;
        let indexes: [(&'static str, &'static str, Document); 4] = [
            (
                ROUNDS,
                "game_id,round_number",
                doc! {"game_id": 1, "round_number": 1},
            ),
            (DRAWS, "game_id,number", doc! {"game_id": 1, "number": 1}),
            (
                DRAWS,
                "game_id,draw_order",
                doc! {"game_id": 1, "draw_order": 1},
            ),
            (
                SCORES,
                "game_id,contestant_id,entry_index",
                doc! {"game_id": 1, "contestant_id": 1, "entry_index": 1},
            ),
        ];

        for (collection, index, keys) in indexes {
            let name = format!("{}_{}_uniq", collection, index.replace(',', "_"));
            database
                .collection::<Document>(collection)
                .create_index(unique_index(keys, &name))
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.inner.database().await.collection::<T>(name)
    }

    async fn find_game(&self, id: Uuid) -> MongoResult<Option<GameEntity>> {
        let collection = self.collection::<MongoGameDocument>(GAMES).await;
        collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadGame { id, source })?
            .map(GameEntity::try_from)
            .transpose()
    }

    async fn save_game(&self, game: GameEntity) -> MongoResult<()> {
        let id = game.id;
        let document: MongoGameDocument = game.into();
        let collection = self.collection::<MongoGameDocument>(GAMES).await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveGame { id, source })?;
        Ok(())
    }

    async fn list_rounds(&self, game_id: Uuid) -> MongoResult<Vec<RoundEntity>> {
        let collection = self.collection::<MongoRoundDocument>(ROUNDS).await;
        let documents: Vec<MongoRoundDocument> = collection
            .find(doc! {"game_id": game_id.to_string()})
            .sort(doc! {"round_number": 1})
            .await
            .map_err(|source| MongoDaoError::LoadRounds { game_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadRounds { game_id, source })?;
        collect_entities(documents)
    }

    async fn find_round(&self, id: Uuid) -> MongoResult<Option<RoundEntity>> {
        let collection = self.collection::<MongoRoundDocument>(ROUNDS).await;
        collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadRounds { game_id: id, source })?
            .map(RoundEntity::try_from)
            .transpose()
    }

    async fn insert_rounds(&self, rounds: Vec<RoundEntity>) -> MongoResult<()> {
        let Some(game_id) = rounds.first().map(|round| round.game_id) else {
            return Ok(());
        };
        let documents: Vec<MongoRoundDocument> = rounds.into_iter().map(Into::into).collect();
        let collection = self.collection::<MongoRoundDocument>(ROUNDS).await;
        collection
            .insert_many(documents)
            .await
            .map_err(|source| MongoDaoError::SaveRounds { game_id, source })?;
        Ok(())
    }

    async fn save_round(&self, round: RoundEntity) -> MongoResult<()> {
        let id = round.id;
        let game_id = round.game_id;
        let document: MongoRoundDocument = round.into();
        let collection = self.collection::<MongoRoundDocument>(ROUNDS).await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveRounds { game_id, source })?;
        Ok(())
    }

    async fn list_draws(&self, game_id: Uuid) -> MongoResult<Vec<DrawEntity>> {
        let collection = self.collection::<MongoDrawDocument>(DRAWS).await;
        let documents: Vec<MongoDrawDocument> = collection
            .find(doc! {"game_id": game_id.to_string()})
            .sort(doc! {"draw_order": 1})
            .await
            .map_err(|source| MongoDaoError::LoadDraws { game_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadDraws { game_id, source })?;
        collect_entities(documents)
    }

    async fn insert_draw(&self, draw: DrawEntity) -> MongoResult<()> {
        let game_id = draw.game_id;
        let number = draw.number;
        let document: MongoDrawDocument = draw.into();
        let collection = self.collection::<MongoDrawDocument>(DRAWS).await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::InsertDraw {
                game_id,
                number,
                source,
            })?;
        Ok(())
    }

    async fn list_cards(&self, game_id: Uuid, filter: CardFilter) -> MongoResult<Vec<CardEntity>> {
        let mut query = doc! {"game_id": game_id.to_string()};
        if filter.auto_mark_only {
            query.insert("auto_mark_enabled", true);
        }
        if filter.winner_candidates_only {
            query.insert("is_winner_candidate", true);
        }
        if let Some(contestant_id) = filter.contestant_id {
            query.insert("contestant_id", contestant_id.to_string());
        }

        let collection = self.collection::<MongoCardDocument>(CARDS).await;
        let documents: Vec<MongoCardDocument> = collection
            .find(query)
            .await
            .map_err(|source| MongoDaoError::LoadCards { game_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadCards { game_id, source })?;
        collect_entities(documents)
    }

    async fn find_card(&self, id: Uuid) -> MongoResult<Option<CardEntity>> {
        let collection = self.collection::<MongoCardDocument>(CARDS).await;
        collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadCards { game_id: id, source })?
            .map(CardEntity::try_from)
            .transpose()
    }

    async fn save_card(&self, card: CardEntity) -> MongoResult<()> {
        let id = card.id;
        let document: MongoCardDocument = card.into();
        let collection = self.collection::<MongoCardDocument>(CARDS).await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveCard { id, source })?;
        Ok(())
    }

    async fn find_contestant(&self, id: Uuid) -> MongoResult<Option<ContestantEntity>> {
        let collection = self.collection::<MongoContestantDocument>(CONTESTANTS).await;
        collection
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadContestant { id, source })?
            .map(ContestantEntity::try_from)
            .transpose()
    }

    async fn save_contestant(&self, contestant: ContestantEntity) -> MongoResult<()> {
        let id = contestant.id;
        let document: MongoContestantDocument = contestant.into();
        let collection = self.collection::<MongoContestantDocument>(CONTESTANTS).await;
        collection
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveContestant { id, source })?;
        Ok(())
    }

    async fn latest_score(
        &self,
        game_id: Uuid,
        contestant_id: Uuid,
        placement_only: bool,
    ) -> MongoResult<Option<ScoreEntity>> {
        let mut query = doc! {
            "game_id": game_id.to_string(),
            "contestant_id": contestant_id.to_string(),
        };
        if placement_only {
            query.insert("is_bonus", false);
        }

        let collection = self.collection::<MongoScoreDocument>(SCORES).await;
        collection
            .find_one(query)
            .sort(doc! {"entry_index": -1})
            .await
            .map_err(|source| MongoDaoError::LoadScores { source })?
            .map(ScoreEntity::try_from)
            .transpose()
    }

    async fn insert_scores(&self, scores: Vec<ScoreEntity>) -> MongoResult<()> {
        let Some(contestant_id) = scores.first().map(|score| score.contestant_id) else {
            return Ok(());
        };
        let documents: Vec<MongoScoreDocument> = scores.into_iter().map(Into::into).collect();
        let collection = self.collection::<MongoScoreDocument>(SCORES).await;
        collection
            .insert_many(documents)
            .await
            .map_err(|source| MongoDaoError::InsertScores {
                contestant_id,
                source,
            })?;
        Ok(())
    }

    async fn list_scores(&self, query: ScoreQuery) -> MongoResult<Vec<ScoreEntity>> {
        let mut filter = doc! {};
        if let Some(game_id) = query.game_id {
            filter.insert("game_id", game_id.to_string());
        }
        if let Some(event_id) = query.event_id {
            filter.insert("event_id", event_id.to_string());
        }

        let collection = self.collection::<MongoScoreDocument>(SCORES).await;
        let mut find = collection
            .find(filter)
            .sort(doc! {"created_at": -1, "entry_index": -1});
        if let Some(limit) = query.limit {
            find = find.limit(i64::try_from(limit).unwrap_or(i64::MAX));
        }
        let documents: Vec<MongoScoreDocument> = find
            .await
            .map_err(|source| MongoDaoError::LoadScores { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadScores { source })?;
        collect_entities(documents)
    }

    async fn list_results(&self, game_id: Uuid) -> MongoResult<Vec<ResultEntity>> {
        let collection = self.collection::<MongoResultDocument>(RESULTS).await;
        let documents: Vec<MongoResultDocument> = collection
            .find(doc! {"game_id": game_id.to_string()})
            .sort(doc! {"created_at": 1})
            .await
            .map_err(|source| MongoDaoError::LoadResults { game_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadResults { game_id, source })?;
        collect_entities(documents)
    }

    async fn insert_result(&self, result: ResultEntity) -> MongoResult<()> {
        let game_id = result.game_id;
        let document: MongoResultDocument = result.clone().into();
        let collection = self.collection::<MongoResultDocument>(RESULTS).await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::InsertResult { game_id, source })?;

        if !self.inner.watching.load(Ordering::SeqCst) {
            let _ = self.inner.results_tx.send(result);
        }
        Ok(())
    }
}

impl BingoStore for MongoStore {
    fn find_game(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<GameEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game(id).await.map_err(Into::into) })
    }

    fn save_game(&self, game: GameEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_game(game).await.map_err(Into::into) })
    }

    fn list_rounds(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_rounds(game_id).await.map_err(Into::into) })
    }

    fn find_round(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<RoundEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_round(id).await.map_err(Into::into) })
    }

    fn insert_rounds(&self, rounds: Vec<RoundEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_rounds(rounds).await.map_err(Into::into) })
    }

    fn save_round(&self, round: RoundEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_round(round).await.map_err(Into::into) })
    }

    fn list_draws(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<DrawEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_draws(game_id).await.map_err(Into::into) })
    }

    fn insert_draw(&self, draw: DrawEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_draw(draw).await.map_err(Into::into) })
    }

    fn list_cards(
        &self,
        game_id: Uuid,
        filter: CardFilter,
    ) -> BoxFuture<'static, StorageResult<Vec<CardEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_cards(game_id, filter).await.map_err(Into::into) })
    }

    fn find_card(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<CardEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_card(id).await.map_err(Into::into) })
    }

    fn save_card(&self, card: CardEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_card(card).await.map_err(Into::into) })
    }

    fn find_contestant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ContestantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_contestant(id).await.map_err(Into::into) })
    }

    fn save_contestant(
        &self,
        contestant: ContestantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_contestant(contestant).await.map_err(Into::into) })
    }

    fn latest_score(
        &self,
        game_id: Uuid,
        contestant_id: Uuid,
        placement_only: bool,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .latest_score(game_id, contestant_id, placement_only)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_scores(&self, scores: Vec<ScoreEntity>) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_scores(scores).await.map_err(Into::into) })
    }

    fn list_scores(&self, query: ScoreQuery) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_scores(query).await.map_err(Into::into) })
    }

    fn list_results(&self, game_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ResultEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_results(game_id).await.map_err(Into::into) })
    }

    fn insert_result(&self, result: ResultEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_result(result).await.map_err(Into::into) })
    }

    fn subscribe_results(&self) -> broadcast::Receiver<ResultEntity> {
        self.inner.results_tx.subscribe()
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
