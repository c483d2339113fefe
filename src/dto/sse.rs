use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the SSE stream.
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when automation activates a round.
pub struct RoundStartedEvent {
    pub game_id: Uuid,
    pub round_id: Uuid,
    pub round_number: u32,
    /// Draws after which the round finishes.
    pub draw_cap: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a round completes and the intermission begins.
pub struct RoundCompletedEvent {
    pub game_id: Uuid,
    pub round_id: Uuid,
    pub round_number: u32,
    /// `draw_cap_reached`, `required_winners` or `pool_exhausted`.
    pub reason: String,
    /// RFC 3339 end of the intermission.
    pub intermission_ends_at: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after every number drawn by automation.
pub struct DrawCreatedEvent {
    pub game_id: Uuid,
    pub round_number: Option<u32>,
    pub number: u8,
    pub draw_order: u32,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast for each ledger entry appended to a contestant's score.
pub struct ScoreAwardedEvent {
    pub game_id: Uuid,
    pub round_id: Option<Uuid>,
    pub contestant_id: Uuid,
    pub points: i32,
    pub total: i32,
    pub is_bonus: bool,
    /// Display label such as `+10 pts · 1st`.
    pub label: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast once the last round is over and the game ended.
pub struct ChampionSelectedEvent {
    pub game_id: Uuid,
    /// Absent when nobody scored.
    pub contestant_id: Option<Uuid>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a controller is stopped before the game ended.
pub struct AutomationStoppedEvent {
    pub game_id: Uuid,
    pub reason: String,
}
