use std::time::Duration;

use indexmap::IndexSet;
use tokio::{
    sync::{mpsc, oneshot, watch},
    time::Instant,
};
use uuid::Uuid;

use crate::state::state_machine::AutomationPhase;

/// In-memory run-state of one game's controller; never persisted.
#[derive(Debug, Default)]
pub struct RunState {
    /// `start` completed (config loaded, rounds ensured, feed subscribed).
    pub initialized: bool,
    /// Round currently drawing numbers.
    pub active_round_number: Option<u32>,
    /// Identifier of the active round.
    pub active_round_id: Option<Uuid>,
    /// Next draw tick.
    pub draw_deadline: Option<Instant>,
    /// End of the current intermission.
    pub intermission_deadline: Option<Instant>,
    /// Set by `stop`; every timer callback checks it first.
    pub shutting_down: bool,
    /// Contestants already placed in the active round, in placement order.
    pub winners: IndexSet<Uuid>,
    /// Draws performed since the active round started.
    pub draws_executed: u32,
    /// Draw cap of the active round.
    pub draw_cap: u32,
    /// Delay between two draws of the active round.
    pub draw_interval: Duration,
    /// Most recent failure swallowed by the loop.
    pub last_error: Option<String>,
    /// Champion selection already ran for this instance.
    pub champion_selected: bool,
}

impl RunState {
    /// Forget everything tied to the active round.
    pub fn clear_round(&mut self) {
        self.active_round_number = None;
        self.active_round_id = None;
        self.draw_deadline = None;
        self.winners.clear();
        self.draws_executed = 0;
        self.draw_cap = 0;
        self.draw_interval = Duration::ZERO;
    }

    /// Cancel both timers.
    pub fn cancel_timers(&mut self) {
        self.draw_deadline = None;
        self.intermission_deadline = None;
    }
}

/// Read-only view of a controller published after every step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerSnapshot {
    pub phase: AutomationPhase,
    /// Applied lifecycle transitions so far.
    pub transitions: usize,
    pub initialized: bool,
    pub active_round_number: Option<u32>,
    pub active_round_id: Option<Uuid>,
    pub draws_this_round: u32,
    pub draw_cap: u32,
    pub winners_this_round: Vec<Uuid>,
    pub last_error: Option<String>,
}

impl Default for ControllerSnapshot {
    fn default() -> Self {
        Self {
            phase: AutomationPhase::Idle,
            transitions: 0,
            initialized: false,
            active_round_number: None,
            active_round_id: None,
            draws_this_round: 0,
            draw_cap: 0,
            winners_this_round: Vec::new(),
            last_error: None,
        }
    }
}

/// Message accepted by a running controller task.
#[derive(Debug)]
pub enum ControllerCommand {
    /// Cancel timers, drop the feed and exit; `done` fires once resources are released.
    Stop {
        reason: String,
        done: oneshot::Sender<()>,
    },
}

/// Registry entry of a live controller.
#[derive(Debug, Clone)]
pub struct ControllerHandle {
    instance_id: Uuid,
    commands: mpsc::Sender<ControllerCommand>,
    snapshot: watch::Receiver<ControllerSnapshot>,
}

impl ControllerHandle {
    /// Wrap the channels of a freshly built controller.
    pub fn new(
        commands: mpsc::Sender<ControllerCommand>,
        snapshot: watch::Receiver<ControllerSnapshot>,
    ) -> Self {
        Self {
            instance_id: Uuid::new_v4(),
            commands,
            snapshot,
        }
    }

    /// Identifier distinguishing successive controllers of the same game.
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ControllerSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Ask the controller to stop and wait until it released its timers.
    ///
    /// Returns `false` when the task had already exited.
    pub async fn stop(&self, reason: impl Into<String>) -> bool {
        let (done, finished) = oneshot::channel();
        let command = ControllerCommand::Stop {
            reason: reason.into(),
            done,
        };
        if self.commands.send(command).await.is_err() {
            return false;
        }
        finished.await.is_ok()
    }
}
