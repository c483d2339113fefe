use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use thiserror::Error;
use uuid::Uuid;

use super::DUPLICATE_KEY_CODE;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game `{id}`")]
    SaveGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load game `{id}`")]
    LoadGame {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load rounds of game `{game_id}`")]
    LoadRounds {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save rounds of game `{game_id}`")]
    SaveRounds {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load draws of game `{game_id}`")]
    LoadDraws {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert draw {number} for game `{game_id}`")]
    InsertDraw {
        game_id: Uuid,
        number: u8,
        #[source]
        source: MongoError,
    },
    #[error("failed to load cards of game `{game_id}`")]
    LoadCards {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save card `{id}`")]
    SaveCard {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load contestant `{id}`")]
    LoadContestant {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to save contestant `{id}`")]
    SaveContestant {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load scores")]
    LoadScores {
        #[source]
        source: MongoError,
    },
    #[error("failed to insert scores for contestant `{contestant_id}`")]
    InsertScores {
        contestant_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to insert result for game `{game_id}`")]
    InsertResult {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to load results of game `{game_id}`")]
    LoadResults {
        game_id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to follow inserts on the results collection")]
    WatchResults {
        #[source]
        source: MongoError,
    },
    #[error("stored document `{id}` is malformed: {reason}")]
    MalformedDocument { id: String, reason: String },
}

impl MongoDaoError {
    fn source_error(&self) -> Option<&MongoError> {
        match self {
            MongoDaoError::InvalidUri { source, .. }
            | MongoDaoError::ClientConstruction { source }
            | MongoDaoError::InitialPing { source, .. }
            | MongoDaoError::HealthPing { source }
            | MongoDaoError::EnsureIndex { source, .. }
            | MongoDaoError::SaveGame { source, .. }
            | MongoDaoError::LoadGame { source, .. }
            | MongoDaoError::LoadRounds { source, .. }
            | MongoDaoError::SaveRounds { source, .. }
            | MongoDaoError::LoadDraws { source, .. }
            | MongoDaoError::InsertDraw { source, .. }
            | MongoDaoError::LoadCards { source, .. }
            | MongoDaoError::SaveCard { source, .. }
            | MongoDaoError::LoadContestant { source, .. }
            | MongoDaoError::SaveContestant { source, .. }
            | MongoDaoError::LoadScores { source }
            | MongoDaoError::InsertScores { source, .. }
            | MongoDaoError::InsertResult { source, .. }
            | MongoDaoError::LoadResults { source, .. }
            | MongoDaoError::WatchResults { source } => Some(source),
            MongoDaoError::MalformedDocument { .. } => None,
        }
    }

    /// Whether the failure is a unique index violation.
    pub fn is_duplicate_key(&self) -> bool {
        let Some(source) = self.source_error() else {
            return false;
        };
        match source.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == DUPLICATE_KEY_CODE,
            ErrorKind::InsertMany(failure) => failure
                .write_errors
                .as_ref()
                .is_some_and(|errors| errors.iter().any(|err| err.code == DUPLICATE_KEY_CODE)),
            _ => false,
        }
    }
}
