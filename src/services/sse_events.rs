use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dao::models::{DrawEntity, ResultEntity, RoundEntity, ScoreEntity},
    dto::{
        format_system_time,
        sse::{
            AutomationStoppedEvent, ChampionSelectedEvent, DrawCreatedEvent, RoundCompletedEvent,
            RoundStartedEvent, ScoreAwardedEvent, ServerEvent, SystemStatus,
        },
    },
    services::scoring_service::format_award_label,
    state::{SharedState, state_machine::FinishReason},
};

const EVENT_SYSTEM_STATUS: &str = "system_status";
const EVENT_ROUND_STARTED: &str = "round.started";
const EVENT_ROUND_COMPLETED: &str = "round.completed";
const EVENT_DRAW_CREATED: &str = "draw.created";
const EVENT_SCORE_AWARDED: &str = "score.awarded";
const EVENT_CHAMPION_SELECTED: &str = "champion.selected";
const EVENT_AUTOMATION_STOPPED: &str = "automation.stopped";

/// Broadcast the degraded flag after it changed.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_public_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

/// Broadcast that a round became active.
pub fn broadcast_round_started(state: &SharedState, round: &RoundEntity, draw_cap: u32) {
    let payload = RoundStartedEvent {
        game_id: round.game_id,
        round_id: round.id,
        round_number: round.round_number,
        draw_cap,
    };
    send_public_event(state, EVENT_ROUND_STARTED, &payload);
}

/// Broadcast that a round completed and why.
pub fn broadcast_round_completed(state: &SharedState, round: &RoundEntity, reason: FinishReason) {
    let payload = RoundCompletedEvent {
        game_id: round.game_id,
        round_id: round.id,
        round_number: round.round_number,
        reason: reason.as_str().to_string(),
        intermission_ends_at: round.intermission_ends_at.map(format_system_time),
    };
    send_public_event(state, EVENT_ROUND_COMPLETED, &payload);
}

/// Broadcast a freshly drawn number.
pub fn broadcast_draw_created(state: &SharedState, draw: &DrawEntity, round_number: Option<u32>) {
    let payload = DrawCreatedEvent {
        game_id: draw.game_id,
        round_number,
        number: draw.number,
        draw_order: draw.draw_order,
    };
    send_public_event(state, EVENT_DRAW_CREATED, &payload);
}

/// Broadcast every ledger entry written by one award.
pub fn broadcast_scores_awarded(state: &SharedState, entries: &[ScoreEntity]) {
    for entry in entries {
        let payload = ScoreAwardedEvent {
            game_id: entry.game_id,
            round_id: entry.round_id,
            contestant_id: entry.contestant_id,
            points: entry.points_awarded,
            total: entry.total_after_round,
            is_bonus: entry.is_bonus,
            label: format_award_label(entry),
        };
        send_public_event(state, EVENT_SCORE_AWARDED, &payload);
    }
}

/// Broadcast the end of the game and its champion, if anyone scored.
pub fn broadcast_champion_selected(
    state: &SharedState,
    game_id: Uuid,
    result: Option<&ResultEntity>,
) {
    let payload = ChampionSelectedEvent {
        game_id,
        contestant_id: result.and_then(|result| result.contestant_id),
        username: result.and_then(|result| result.username.clone()),
    };
    send_public_event(state, EVENT_CHAMPION_SELECTED, &payload);
}

/// Broadcast that automation of a game was stopped.
pub fn broadcast_automation_stopped(state: &SharedState, game_id: Uuid, reason: &str) {
    let payload = AutomationStoppedEvent {
        game_id,
        reason: reason.to_string(),
    };
    send_public_event(state, EVENT_AUTOMATION_STOPPED, &payload);
}

fn send_public_event(state: &SharedState, event: &str, payload: &impl Serialize) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(event) => state.public_sse().broadcast(event),
        Err(err) => warn!(event, error = %err, "failed to serialize public SSE payload"),
    }
}
