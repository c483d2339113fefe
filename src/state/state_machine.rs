use std::time::Instant;

use thiserror::Error;
use uuid::Uuid;

/// High-level phases of a game's automation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationPhase {
    /// Controller created; no round started yet.
    Idle,
    /// Rounds are being played.
    Running(RunningPhase),
    /// Champion selected; the game is over.
    Ended,
    /// Automation was stopped before the game ended.
    Stopped,
}

/// Fine-grained phase while rounds are being played.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningPhase {
    /// Numbers are being drawn for this round.
    RoundActive {
        /// Sequential round number.
        round_number: u32,
    },
    /// Waiting for the next round after `completed_round` finished.
    Intermission {
        /// Round that just completed.
        completed_round: u32,
    },
}

/// Why a round finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// The round reached its draw cap.
    DrawCapReached,
    /// Enough distinct contestants won.
    RequiredWinners,
    /// No numbers left to draw.
    PoolExhausted,
}

impl FinishReason {
    /// Wire name of the reason.
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::DrawCapReached => "draw_cap_reached",
            FinishReason::RequiredWinners => "required_winners",
            FinishReason::PoolExhausted => "pool_exhausted",
        }
    }
}

/// Events that can be applied to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutomationEvent {
    /// A pending round was activated.
    RoundStarted(u32),
    /// The active round completed.
    RoundFinished(FinishReason),
    /// No pending round remained and the champion was recorded.
    ChampionSelected,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: AutomationPhase,
    /// The event that cannot be applied from this phase.
    pub event: AutomationEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        /// Phase when plan was created.
        expected: AutomationPhase,
        /// Current phase.
        actual: AutomationPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch {
        /// Version when plan was created.
        expected: usize,
        /// Current version.
        actual: usize,
    },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch {
        /// Expected plan ID.
        expected: PlanId,
        /// Provided plan ID.
        got: PlanId,
    },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Unique identifier for this plan.
    pub id: PlanId,
    /// Phase the state machine is currently in.
    pub from: AutomationPhase,
    /// Phase the state machine will transition to.
    pub to: AutomationPhase,
    /// Event that triggered this transition.
    pub event: AutomationEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    /// Timestamp when this plan was created.
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Snapshot {
    /// Current phase of the state machine.
    pub phase: AutomationPhase,
    /// Version number of the state machine (increments on each transition).
    pub version: usize,
    /// Pending transition phase, if a transition is planned but not yet applied.
    pub pending: Option<AutomationPhase>,
}

/// Round lifecycle of one game's automation run.
///
/// Every persisted round transition is planned first, the storage work runs,
/// then the plan is applied (or aborted when the work fails).
#[derive(Debug, Clone)]
pub struct AutomationStateMachine {
    phase: AutomationPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for AutomationStateMachine {
    fn default() -> Self {
        Self {
            phase: AutomationPhase::Idle,
            version: 0,
            pending: None,
        }
    }
}

impl AutomationStateMachine {
    /// Create a new state machine initialised in the idle state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Inspect the current phase.
    pub fn phase(&self) -> AutomationPhase {
        self.phase
    }

    /// Round currently drawing numbers, if any.
    pub fn active_round(&self) -> Option<u32> {
        match self.phase {
            AutomationPhase::Running(RunningPhase::RoundActive { round_number }) => {
                Some(round_number)
            }
            _ => None,
        }
    }

    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self.phase, AutomationPhase::Ended | AutomationPhase::Stopped)
    }

    /// Create a snapshot of the current state machine state.
    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Plan a transition by validating that the event can be applied from the current phase.
    /// Returns a Plan that can later be applied or aborted.
    pub fn plan(&mut self, event: AutomationEvent) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, moving the state machine to the next phase.
    /// Returns the new phase after the transition.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<AutomationPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected_plan_id = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected: expected_plan_id,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it, returning the state machine to its previous state.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    /// Force the stopped phase from anywhere, dropping any pending plan.
    pub fn halt(&mut self) -> AutomationPhase {
        self.pending = None;
        if self.phase != AutomationPhase::Ended {
            self.phase = AutomationPhase::Stopped;
            self.version += 1;
        }
        self.phase
    }

    /// Compute a transition from an event if the transition is valid.
    fn compute_transition(
        &self,
        event: AutomationEvent,
    ) -> Result<AutomationPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (AutomationPhase::Idle, AutomationEvent::RoundStarted(round_number)) => {
                AutomationPhase::Running(RunningPhase::RoundActive { round_number })
            }
            (
                AutomationPhase::Running(RunningPhase::Intermission { completed_round }),
                AutomationEvent::RoundStarted(round_number),
            ) if round_number > completed_round => {
                AutomationPhase::Running(RunningPhase::RoundActive { round_number })
            }
            (
                AutomationPhase::Running(RunningPhase::RoundActive { round_number }),
                AutomationEvent::RoundFinished(_),
            ) => AutomationPhase::Running(RunningPhase::Intermission {
                completed_round: round_number,
            }),
            (
                AutomationPhase::Idle | AutomationPhase::Running(RunningPhase::Intermission { .. }),
                AutomationEvent::ChampionSelected,
            ) => AutomationPhase::Ended,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(sm: &mut AutomationStateMachine, event: AutomationEvent) -> AutomationPhase {
        let plan = sm.plan(event).unwrap();
        sm.apply(plan.id).unwrap()
    }

    #[test]
    fn initial_state_is_idle() {
        let sm = AutomationStateMachine::new();
        assert_eq!(sm.phase(), AutomationPhase::Idle);
        assert_eq!(sm.active_round(), None);
    }

    #[test]
    fn plays_every_round_then_ends() {
        let mut sm = AutomationStateMachine::new();

        assert_eq!(
            apply(&mut sm, AutomationEvent::RoundStarted(1)),
            AutomationPhase::Running(RunningPhase::RoundActive { round_number: 1 })
        );
        assert_eq!(
            apply(
                &mut sm,
                AutomationEvent::RoundFinished(FinishReason::RequiredWinners)
            ),
            AutomationPhase::Running(RunningPhase::Intermission { completed_round: 1 })
        );
        assert_eq!(sm.active_round(), None);
        assert_eq!(
            apply(&mut sm, AutomationEvent::RoundStarted(2)),
            AutomationPhase::Running(RunningPhase::RoundActive { round_number: 2 })
        );
        apply(
            &mut sm,
            AutomationEvent::RoundFinished(FinishReason::DrawCapReached),
        );
        assert_eq!(
            apply(&mut sm, AutomationEvent::ChampionSelected),
            AutomationPhase::Ended
        );
        assert!(sm.is_terminal());
        assert_eq!(sm.snapshot().version, 5);
    }

    #[test]
    fn a_finished_round_is_never_reactivated() {
        let mut sm = AutomationStateMachine::new();
        apply(&mut sm, AutomationEvent::RoundStarted(2));
        apply(
            &mut sm,
            AutomationEvent::RoundFinished(FinishReason::PoolExhausted),
        );

        let err = sm.plan(AutomationEvent::RoundStarted(2)).unwrap_err();
        assert!(matches!(err, PlanError::InvalidTransition(_)));
    }

    #[test]
    fn champion_cannot_be_selected_mid_round() {
        let mut sm = AutomationStateMachine::new();
        apply(&mut sm, AutomationEvent::RoundStarted(1));

        match sm.plan(AutomationEvent::ChampionSelected).unwrap_err() {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(
                    invalid.from,
                    AutomationPhase::Running(RunningPhase::RoundActive { round_number: 1 })
                );
                assert_eq!(invalid.event, AutomationEvent::ChampionSelected);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn pending_plan_blocks_a_second_plan() {
        let mut sm = AutomationStateMachine::new();
        let plan = sm.plan(AutomationEvent::RoundStarted(1)).unwrap();
        assert_eq!(
            sm.plan(AutomationEvent::ChampionSelected).unwrap_err(),
            PlanError::AlreadyPending
        );
        assert_eq!(
            sm.snapshot().pending,
            Some(AutomationPhase::Running(RunningPhase::RoundActive {
                round_number: 1
            }))
        );

        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), AutomationPhase::Idle);
    }

    #[test]
    fn halt_stops_from_any_phase_but_ended() {
        let mut sm = AutomationStateMachine::new();
        apply(&mut sm, AutomationEvent::RoundStarted(1));
        sm.plan(AutomationEvent::RoundFinished(FinishReason::DrawCapReached))
            .unwrap();

        assert_eq!(sm.halt(), AutomationPhase::Stopped);
        assert!(sm.snapshot().pending.is_none());
        assert!(sm.plan(AutomationEvent::RoundStarted(2)).is_err());

        let mut ended = AutomationStateMachine::new();
        apply(&mut ended, AutomationEvent::ChampionSelected);
        assert_eq!(ended.halt(), AutomationPhase::Ended);
    }
}
