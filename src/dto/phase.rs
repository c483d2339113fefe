use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::{
    ControllerSnapshot,
    state_machine::{AutomationPhase, RunningPhase},
};

/// Automation phase exposed to clients.
#[derive(Debug, Serialize, ToSchema, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibleAutomationPhase {
    /// Controller loaded, no round started yet.
    Idle,
    /// A round is drawing numbers.
    RoundActive,
    /// Waiting for the next round.
    Intermission,
    /// Champion selected.
    Ended,
    /// Stopped before the game ended.
    Stopped,
}

impl From<AutomationPhase> for VisibleAutomationPhase {
    fn from(value: AutomationPhase) -> Self {
        match value {
            AutomationPhase::Idle => VisibleAutomationPhase::Idle,
            AutomationPhase::Running(RunningPhase::RoundActive { .. }) => {
                VisibleAutomationPhase::RoundActive
            }
            AutomationPhase::Running(RunningPhase::Intermission { .. }) => {
                VisibleAutomationPhase::Intermission
            }
            AutomationPhase::Ended => VisibleAutomationPhase::Ended,
            AutomationPhase::Stopped => VisibleAutomationPhase::Stopped,
        }
    }
}

/// Live view of a running controller.
#[derive(Debug, Serialize, ToSchema)]
pub struct ControllerView {
    pub phase: VisibleAutomationPhase,
    /// Applied lifecycle transitions so far.
    pub transitions: usize,
    pub initialized: bool,
    pub active_round_number: Option<u32>,
    pub active_round_id: Option<Uuid>,
    pub draws_this_round: u32,
    pub draw_cap: u32,
    /// Contestants placed in the active round, in placement order.
    pub winners_this_round: Vec<Uuid>,
    /// Last failure swallowed by the automation loop.
    pub last_error: Option<String>,
}

impl From<ControllerSnapshot> for ControllerView {
    fn from(snapshot: ControllerSnapshot) -> Self {
        Self {
            phase: snapshot.phase.into(),
            transitions: snapshot.transitions,
            initialized: snapshot.initialized,
            active_round_number: snapshot.active_round_number,
            active_round_id: snapshot.active_round_id,
            draws_this_round: snapshot.draws_this_round,
            draw_cap: snapshot.draw_cap,
            winners_this_round: snapshot.winners_this_round,
            last_error: snapshot.last_error,
        }
    }
}
