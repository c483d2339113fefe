//! Per-game automation actor.
//!
//! Each automated game owns one tokio task holding its [`RunState`]. The task
//! wakes on three sources: commands from its [`ControllerHandle`], win rows from
//! the results feed, and its draw or intermission deadline. Nothing else
//! touches the run-state, so round bookkeeping needs no lock.

use std::{future::Future, sync::Arc, time::Duration};

use rand::{SeedableRng, rngs::StdRng};
use tokio::{
    sync::{
        broadcast::{self, error::RecvError},
        mpsc, watch,
    },
    time::{self, Instant, timeout},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        game_store::{BingoStore, CardFilter},
        models::{
            AwardSource, BingoGrid, GameStatus, ResultEntity, ResultKind, RoundEntity,
            ScoreEntity,
        },
    },
    error::{ConfigurationError, ServiceError},
    services::{
        draw_service,
        patterns::detect_patterns,
        round_service::{self, NextRound},
        scoring_service::{self, AwardRequest, BonusAward, BonusKind},
        sse_events,
    },
    state::{
        ControllerHandle, ControllerSnapshot, Plan, SharedState,
        automation::{ControllerCommand, RunState},
        game::StrategyConfig,
        state_machine::{AutomationEvent, AutomationPhase, AutomationStateMachine, FinishReason},
    },
};

/// Delay before retrying a round transition that failed.
const RETRY_DELAY: Duration = Duration::from_secs(2);
const COMMAND_CAPACITY: usize = 8;
const COMBO_KEY: &str = "combo";

/// Card information that came with a win notification.
#[derive(Debug, Clone, Default)]
pub struct WinContext {
    pub card_id: Option<Uuid>,
    pub grid: Option<BingoGrid>,
}

/// What [`StrategyController::handle_win`] did with a win.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WinOutcome {
    /// No round was drawing numbers.
    NoActiveRound,
    /// The contestant already placed in this round.
    Duplicate,
    /// Placed beyond the paid placements; nothing was written.
    Unranked { order: u32 },
    /// Ledger entries written for the placement and its bonuses.
    Awarded { order: u32, entries: Vec<ScoreEntity> },
}

/// Result of a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// A new controller task was spawned.
    Started,
    /// A controller was already registered for the game.
    AlreadyRunning,
}

enum Wake {
    Command(Option<ControllerCommand>),
    Result(Option<ResultEntity>),
    DrawTick,
    IntermissionElapsed,
}

/// Automation state of a single strategy game.
pub struct StrategyController {
    game_id: Uuid,
    app: SharedState,
    config: StrategyConfig,
    run: RunState,
    machine: AutomationStateMachine,
    rng: StdRng,
    transition_timeout: Duration,
    snapshot_tx: watch::Sender<ControllerSnapshot>,
}

impl StrategyController {
    /// Load the game, seed its rounds and subscribe to win rows.
    ///
    /// Fails without side effects on the game when it is missing, already
    /// ended or not a strategy game.
    pub async fn load(
        app: SharedState,
        game_id: Uuid,
    ) -> Result<(Self, broadcast::Receiver<ResultEntity>), ServiceError> {
        let store = app.require_store().await?;
        let mut game = store
            .find_game(game_id)
            .await?
            .ok_or(ConfigurationError::GameNotFound(game_id))?;
        if game.status == GameStatus::Ended {
            return Err(ConfigurationError::GameEnded(game_id).into());
        }
        let config = StrategyConfig::from_game(&game, app.config())?;

        round_service::ensure_rounds(store.as_ref(), &config).await?;
        if game.status == GameStatus::Lobby {
            game.status = GameStatus::Active;
            game.updated_at = std::time::SystemTime::now();
            store.save_game(game).await?;
        }
        let feed = store.subscribe_results();

        let (snapshot_tx, _) = watch::channel(ControllerSnapshot::default());
        let transition_timeout = app.config().transition_timeout();
        let mut controller = Self {
            game_id,
            app,
            config,
            run: RunState::default(),
            machine: AutomationStateMachine::new(),
            rng: StdRng::from_os_rng(),
            transition_timeout,
            snapshot_tx,
        };
        controller.run.initialized = true;
        controller.publish();
        info!(
            game_id = %game_id,
            total_rounds = controller.config.total_rounds,
            "strategy automation initialised"
        );
        Ok((controller, feed))
    }

    /// Receiver of the snapshots published after every step.
    pub fn subscribe_snapshots(&self) -> watch::Receiver<ControllerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Drive the game until it ends or a stop command arrives.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<ControllerCommand>,
        feed: broadcast::Receiver<ResultEntity>,
        instance_id: Uuid,
    ) {
        let mut feed = Some(feed);
        self.start_next_round().await;
        self.publish();

        while !self.machine.is_terminal() {
            let draw_deadline = self.run.draw_deadline;
            let intermission_deadline = self.run.intermission_deadline;
            let wake = tokio::select! {
                command = commands.recv() => Wake::Command(command),
                result = recv_result(&mut feed) => Wake::Result(result),
                () = sleep_until_deadline(draw_deadline) => Wake::DrawTick,
                () = sleep_until_deadline(intermission_deadline) => Wake::IntermissionElapsed,
            };

            match wake {
                Wake::Command(Some(ControllerCommand::Stop { reason, done })) => {
                    self.stop(&reason);
                    drop(feed.take());
                    self.publish();
                    let _ = done.send(());
                    break;
                }
                Wake::Command(None) => {
                    self.stop("controller handle dropped");
                    break;
                }
                Wake::Result(Some(result)) => self.on_result(result).await,
                Wake::Result(None) => {
                    warn!(game_id = %self.game_id, "results feed closed; relying on card polling");
                    feed = None;
                }
                Wake::DrawTick => self.on_draw_tick().await,
                Wake::IntermissionElapsed => self.start_next_round().await,
            }
            self.publish();
        }

        self.app
            .controllers()
            .remove_if(&self.game_id, |_, handle| handle.instance_id() == instance_id);
        debug!(game_id = %self.game_id, "controller task exited");
    }

    async fn store(&self) -> Result<Arc<dyn BingoStore>, ServiceError> {
        self.app.require_store().await
    }

    async fn on_result(&mut self, result: ResultEntity) {
        if result.game_id != self.game_id || result.kind != ResultKind::Win {
            return;
        }
        let Some(contestant_id) = result.contestant_id else {
            return;
        };
        let context = WinContext {
            card_id: result.card_id,
            grid: None,
        };
        if let Err(err) = self.handle_win(contestant_id, context).await {
            self.record_error("handle win", &err);
        }
    }

    /// Resume a round left active, else activate the lowest pending round, else
    /// crown the champion.
    async fn start_next_round(&mut self) {
        if self.run.shutting_down {
            return;
        }
        self.run.intermission_deadline = None;

        let next = match self.next_round().await {
            Ok(next) => next,
            Err(err) => return self.retry_later("load rounds", &err),
        };
        match next {
            NextRound::Resume(round) => {
                if let Err(err) = self.resume(round).await {
                    self.retry_later("resume round", &err);
                }
            }
            NextRound::Activate(round) => {
                if let Err(err) = self.activate(round).await {
                    self.retry_later("activate round", &err);
                }
            }
            NextRound::Exhausted => self.select_champion().await,
        }
    }

    async fn next_round(&self) -> Result<NextRound, ServiceError> {
        let store = self.store().await?;
        round_service::next_round(store.as_ref(), self.game_id).await
    }

    async fn activate(&mut self, round: RoundEntity) -> Result<(), ServiceError> {
        let store = self.store().await?;
        let (round, _) = run_transition(
            &mut self.machine,
            self.transition_timeout,
            AutomationEvent::RoundStarted(round.round_number),
            round_service::activate_round(store.as_ref(), round),
        )
        .await?;

        self.enter_round(&round);
        info!(
            game_id = %self.game_id,
            round = round.round_number,
            draw_cap = self.run.draw_cap,
            "round started"
        );
        sse_events::broadcast_round_started(&self.app, &round, self.run.draw_cap);
        Ok(())
    }

    /// Pick up a round an earlier run left active, keeping its draws and placements.
    async fn resume(&mut self, round: RoundEntity) -> Result<(), ServiceError> {
        let store = self.store().await?;
        let (progress, _) = run_transition(
            &mut self.machine,
            self.transition_timeout,
            AutomationEvent::RoundStarted(round.round_number),
            round_service::round_progress(store.as_ref(), &round),
        )
        .await?;

        self.enter_round(&round);
        self.run.draws_executed = progress.draws;
        self.run.winners = progress.winners;
        info!(
            game_id = %self.game_id,
            round = round.round_number,
            draws = self.run.draws_executed,
            winners = self.run.winners.len(),
            "interrupted round resumed"
        );
        sse_events::broadcast_round_started(&self.app, &round, self.run.draw_cap);
        Ok(())
    }

    fn enter_round(&mut self, round: &RoundEntity) {
        self.run.clear_round();
        self.run.active_round_number = Some(round.round_number);
        self.run.active_round_id = Some(round.id);
        self.run.draw_cap = self.config.draw_cap(round);
        self.run.draw_interval = self.config.draw_interval(round);
        self.run.draw_deadline = Some(Instant::now() + self.run.draw_interval);
    }

    async fn on_draw_tick(&mut self) {
        if self.run.shutting_down {
            return;
        }
        self.run.draw_deadline = None;
        let Some(round_id) = self.run.active_round_id else {
            return;
        };

        if self.run.draws_executed >= self.run.draw_cap {
            return self.finish_round(FinishReason::DrawCapReached).await;
        }
        if self.required_winners_reached() {
            return self.finish_round(FinishReason::RequiredWinners).await;
        }

        match self.perform_draw().await {
            Ok(()) => {}
            Err(ServiceError::PoolExhausted(_)) => {
                warn!(game_id = %self.game_id, "draw pool exhausted; completing round");
                return self.finish_round(FinishReason::PoolExhausted).await;
            }
            Err(err) => self.record_error("draw", &err),
        }

        if self.run.active_round_id == Some(round_id) && self.run.draw_deadline.is_none() {
            self.run.draw_deadline = Some(Instant::now() + self.run.draw_interval);
        }
    }

    async fn perform_draw(&mut self) -> Result<(), ServiceError> {
        let store = self.store().await?;
        let draw = draw_service::draw_next(store.as_ref(), self.game_id, &mut self.rng).await?;
        self.run.draws_executed += 1;
        self.run.last_error = None;
        sse_events::broadcast_draw_created(&self.app, &draw, self.run.active_round_number);

        if let Err(err) = self.evaluate_auto_winners(store.as_ref()).await {
            self.record_error("evaluate winners", &err);
        }
        Ok(())
    }

    /// Route every winner-candidate card of the game through win handling.
    async fn evaluate_auto_winners(&mut self, store: &dyn BingoStore) -> Result<(), ServiceError> {
        let candidates = store
            .list_cards(self.game_id, CardFilter::winner_candidates())
            .await?;
        for card in candidates {
            if self.run.active_round_id.is_none() {
                break;
            }
            let Some(contestant_id) = card.contestant_id else {
                continue;
            };
            let context = WinContext {
                card_id: Some(card.id),
                grid: Some(card.grid),
            };
            if let Err(err) = self.handle_win(contestant_id, context).await {
                self.record_error("handle win", &err);
            }
        }
        Ok(())
    }

    /// Award a placement to `contestant_id` in the active round.
    ///
    /// A contestant places at most once per round. When the award cannot be
    /// written the contestant is removed from the round's winners again.
    pub async fn handle_win(
        &mut self,
        contestant_id: Uuid,
        context: WinContext,
    ) -> Result<WinOutcome, ServiceError> {
        if self.run.shutting_down {
            return Ok(WinOutcome::NoActiveRound);
        }
        let (Some(round_id), Some(round_number)) =
            (self.run.active_round_id, self.run.active_round_number)
        else {
            debug!(
                game_id = %self.game_id,
                contestant_id = %contestant_id,
                "win outside an active round ignored"
            );
            return Ok(WinOutcome::NoActiveRound);
        };
        if !self.run.winners.insert(contestant_id) {
            debug!(
                game_id = %self.game_id,
                contestant_id = %contestant_id,
                "duplicate win ignored"
            );
            return Ok(WinOutcome::Duplicate);
        }

        let order = u32::try_from(self.run.winners.len()).unwrap_or(u32::MAX);
        let base_points = self.config.placement_points(order);
        let outcome = if base_points <= 0 {
            info!(
                game_id = %self.game_id,
                contestant_id = %contestant_id,
                order,
                "winner placed beyond paid placements"
            );
            WinOutcome::Unranked { order }
        } else {
            match self
                .award_placement(contestant_id, round_id, round_number, order, base_points, context)
                .await
            {
                Ok(entries) => {
                    info!(
                        game_id = %self.game_id,
                        contestant_id = %contestant_id,
                        round = round_number,
                        order,
                        entries = entries.len(),
                        "placement awarded"
                    );
                    sse_events::broadcast_scores_awarded(&self.app, &entries);
                    WinOutcome::Awarded { order, entries }
                }
                Err(err) => {
                    self.run.winners.shift_remove(&contestant_id);
                    return Err(err);
                }
            }
        };

        if self.required_winners_reached() {
            self.finish_round(FinishReason::RequiredWinners).await;
        }
        Ok(outcome)
    }

    async fn award_placement(
        &self,
        contestant_id: Uuid,
        round_id: Uuid,
        round_number: u32,
        order: u32,
        base_points: i32,
        context: WinContext,
    ) -> Result<Vec<ScoreEntity>, ServiceError> {
        let store = self.store().await?;
        let drawn = draw_service::drawn_numbers(store.as_ref(), self.game_id).await?;
        let grid = self
            .load_winning_grid(store.as_ref(), contestant_id, context)
            .await?;

        let mut bonuses: Vec<BonusAward> = grid
            .map(|grid| {
                detect_patterns(&grid, &drawn, &self.config.bonus_rules)
                    .into_iter()
                    .map(|found| BonusAward {
                        kind: BonusKind::Pattern,
                        id: found.id,
                        label: found.label,
                        points: found.points,
                    })
                    .collect()
            })
            .unwrap_or_default();
        if let Some(combo) = self
            .compute_combo_bonus(store.as_ref(), contestant_id, round_number)
            .await?
        {
            bonuses.push(combo);
        }

        let request = AwardRequest {
            game_id: self.game_id,
            event_id: self.config.event_id,
            round_id: Some(round_id),
            contestant_id,
            base_points,
            placement_order: Some(order),
            source: AwardSource::Auto,
            notes: None,
            bonuses,
        };
        scoring_service::award_points(store.as_ref(), &request).await
    }

    /// Grid from the context, else the referenced card, else the contestant's candidate card.
    async fn load_winning_grid(
        &self,
        store: &dyn BingoStore,
        contestant_id: Uuid,
        context: WinContext,
    ) -> Result<Option<BingoGrid>, ServiceError> {
        if let Some(grid) = context.grid {
            return Ok(Some(grid));
        }
        if let Some(card_id) = context.card_id {
            if let Some(card) = store.find_card(card_id).await? {
                return Ok(Some(card.grid));
            }
        }
        let filter = CardFilter {
            winner_candidates_only: true,
            contestant_id: Some(contestant_id),
            ..CardFilter::default()
        };
        let cards = store.list_cards(self.game_id, filter).await?;
        Ok(cards.into_iter().next().map(|card| card.grid))
    }

    /// Combo bonus when the contestant's previous placement is at most `window` rounds back.
    async fn compute_combo_bonus(
        &self,
        store: &dyn BingoStore,
        contestant_id: Uuid,
        round_number: u32,
    ) -> Result<Option<BonusAward>, ServiceError> {
        let Some(rule) = self.config.bonus_rules.combo.as_ref().filter(|rule| rule.points > 0)
        else {
            return Ok(None);
        };
        let Some(previous_round_id) = store
            .latest_score(self.game_id, contestant_id, true)
            .await?
            .and_then(|entry| entry.round_id)
        else {
            return Ok(None);
        };
        let Some(previous) = store.find_round(previous_round_id).await? else {
            return Ok(None);
        };

        let gap = round_number.saturating_sub(previous.round_number);
        Ok((gap > 0 && gap <= rule.window).then(|| BonusAward {
            kind: BonusKind::Combo,
            id: COMBO_KEY.to_string(),
            label: rule.label.clone(),
            points: rule.points,
        }))
    }

    fn required_winners_reached(&self) -> bool {
        u32::try_from(self.run.winners.len()).unwrap_or(u32::MAX) >= self.config.required_winners
    }

    /// Complete the active round and schedule the next one after the intermission.
    ///
    /// When the round cannot be completed it stays active and the next tick retries.
    async fn finish_round(&mut self, reason: FinishReason) {
        let Some(round_id) = self.run.active_round_id else {
            return;
        };
        self.run.draw_deadline = None;

        let store = match self.store().await {
            Ok(store) => store,
            Err(err) => return self.retry_finish(&err),
        };
        let outcome = run_transition(
            &mut self.machine,
            self.transition_timeout,
            AutomationEvent::RoundFinished(reason),
            round_service::complete_round(store.as_ref(), round_id, self.config.intermission()),
        )
        .await;

        match outcome {
            Ok((round, _)) => {
                info!(
                    game_id = %self.game_id,
                    round = round.round_number,
                    reason = reason.as_str(),
                    draws = self.run.draws_executed,
                    winners = self.run.winners.len(),
                    "round completed"
                );
                self.run.clear_round();
                self.run.intermission_deadline = Some(Instant::now() + self.config.intermission());
                sse_events::broadcast_round_completed(&self.app, &round, reason);
            }
            Err(err) => self.retry_finish(&err),
        }
    }

    fn retry_finish(&mut self, err: &ServiceError) {
        self.record_error("complete round", err);
        self.run.draw_deadline = Some(Instant::now() + RETRY_DELAY);
    }

    /// Record the champion and end the game; runs at most once per controller.
    async fn select_champion(&mut self) {
        if self.run.champion_selected {
            return;
        }
        self.run.champion_selected = true;
        self.run.cancel_timers();

        let store = match self.store().await {
            Ok(store) => store,
            Err(err) => return self.abandon_champion(&err),
        };
        let outcome = run_transition(
            &mut self.machine,
            self.transition_timeout,
            AutomationEvent::ChampionSelected,
            scoring_service::crown_champion(store.as_ref(), self.game_id),
        )
        .await;

        match outcome {
            Ok((result, _)) => {
                info!(game_id = %self.game_id, "all rounds played; game ended");
                sse_events::broadcast_champion_selected(&self.app, self.game_id, result.as_ref());
            }
            Err(err) => self.abandon_champion(&err),
        }
    }

    fn abandon_champion(&mut self, err: &ServiceError) {
        error!(game_id = %self.game_id, error = %err, "champion selection failed; halting automation");
        self.run.last_error = Some(err.to_string());
        self.machine.halt();
    }

    /// Cancel both timers and halt; safe in any phase.
    fn stop(&mut self, reason: &str) {
        if self.run.shutting_down {
            return;
        }
        self.run.shutting_down = true;
        self.run.cancel_timers();
        self.run.clear_round();
        self.machine.halt();
        info!(game_id = %self.game_id, reason, "strategy automation stopped");
        sse_events::broadcast_automation_stopped(&self.app, self.game_id, reason);
    }

    fn retry_later(&mut self, action: &str, err: &ServiceError) {
        self.record_error(action, err);
        self.run.intermission_deadline = Some(Instant::now() + RETRY_DELAY);
    }

    fn record_error(&mut self, action: &str, err: &ServiceError) {
        warn!(game_id = %self.game_id, action, error = %err, "automation step failed");
        self.run.last_error = Some(format!("{action}: {err}"));
    }

    fn publish(&self) {
        let machine = self.machine.snapshot();
        self.snapshot_tx.send_replace(ControllerSnapshot {
            phase: machine.phase,
            transitions: machine.version,
            initialized: self.run.initialized,
            active_round_number: self.run.active_round_number,
            active_round_id: self.run.active_round_id,
            draws_this_round: self.run.draws_executed,
            draw_cap: self.run.draw_cap,
            winners_this_round: self.run.winners.iter().copied().collect(),
            last_error: self.run.last_error.clone(),
        });
    }
}

/// Plan `event`, run the storage work under the transition timeout, then apply
/// the plan, or abort it when the work fails.
async fn run_transition<T, Fut>(
    machine: &mut AutomationStateMachine,
    limit: Duration,
    event: AutomationEvent,
    work: Fut,
) -> Result<(T, AutomationPhase), ServiceError>
where
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let Plan { id: plan_id, .. } = machine.plan(event)?;

    let outcome = match timeout(limit, work).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Timeout),
    };

    match outcome {
        Ok(value) => {
            let next = machine.apply(plan_id)?;
            Ok((value, next))
        }
        Err(err) => {
            if let Err(abort_err) = machine.abort(plan_id) {
                warn!(
                    event = ?event,
                    plan_id = %plan_id,
                    error = ?abort_err,
                    "failed to abort transition after work error"
                );
            }
            Err(err)
        }
    }
}

async fn recv_result(feed: &mut Option<broadcast::Receiver<ResultEntity>>) -> Option<ResultEntity> {
    let Some(receiver) = feed.as_mut() else {
        return std::future::pending().await;
    };
    loop {
        match receiver.recv().await {
            Ok(result) => return Some(result),
            Err(RecvError::Lagged(skipped)) => {
                warn!(skipped, "results feed lagged; missed wins are caught by card polling");
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Spawn the controller of `game_id`; a second start while one runs is a no-op.
pub async fn start_automation(
    app: &SharedState,
    game_id: Uuid,
) -> Result<StartOutcome, ServiceError> {
    let _gate = app.start_gate().lock().await;
    if app.controllers().contains_key(&game_id) {
        info!(game_id = %game_id, "strategy automation already running");
        return Ok(StartOutcome::AlreadyRunning);
    }

    let (controller, feed) = StrategyController::load(app.clone(), game_id).await?;
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_CAPACITY);
    let handle = ControllerHandle::new(commands_tx, controller.subscribe_snapshots());
    let instance_id = handle.instance_id();
    app.controllers().insert(game_id, handle);

    tokio::spawn(controller.run(commands_rx, feed, instance_id));
    Ok(StartOutcome::Started)
}

/// Stop the controller of `game_id` and drop it from the registry.
///
/// Waits for a start already holding the gate, so a stop issued while the
/// controller is still loading reaches it. Returns `false` when no controller
/// was running.
pub async fn stop_automation(app: &SharedState, game_id: Uuid, reason: &str) -> bool {
    let _gate = app.start_gate().lock().await;
    let Some(handle) = app
        .controllers()
        .get(&game_id)
        .map(|entry| entry.value().clone())
    else {
        return false;
    };

    let stopped = handle.stop(reason).await;
    app.controllers()
        .remove_if(&game_id, |_, current| current.instance_id() == handle.instance_id());
    stopped
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;
    use crate::{
        dao::{
            game_store::{ScoreQuery, memory::MemoryStore},
            models::{RoundStatus, ScoreMetadata},
        },
        services::test_fixtures::{contestant, memory_state, seed_game, strategy_game},
        state::game::ComboRule,
    };

    async fn loaded(state: &SharedState, game_id: Uuid) -> StrategyController {
        let (controller, _feed) = StrategyController::load(state.clone(), game_id)
            .await
            .unwrap();
        controller
    }

    /// Wait until the controller task published a snapshot matching `ready`.
    async fn wait_for(
        state: &SharedState,
        game_id: Uuid,
        ready: impl Fn(&ControllerSnapshot) -> bool,
    ) -> ControllerSnapshot {
        for _ in 0..2_000 {
            if let Some(snapshot) = state.controllers().get(&game_id).map(|h| h.snapshot()) {
                if ready(&snapshot) {
                    return snapshot;
                }
            }
            time::sleep(Duration::from_millis(100)).await;
        }
        panic!("controller never reached the expected state");
    }

    async fn wait_until_gone(state: &SharedState, game_id: Uuid) {
        for _ in 0..2_000 {
            if !state.controllers().contains_key(&game_id) {
                return;
            }
            time::sleep(Duration::from_millis(100)).await;
        }
        panic!("controller never exited");
    }

    fn win(game_id: Uuid, contestant_id: Uuid) -> ResultEntity {
        ResultEntity {
            id: Uuid::new_v4(),
            game_id,
            contestant_id: Some(contestant_id),
            card_id: None,
            username: None,
            payout: 0,
            kind: ResultKind::Win,
            created_at: SystemTime::now(),
        }
    }

    #[tokio::test]
    async fn loading_rejects_unknown_classic_and_ended_games() {
        let (state, store) = memory_state().await;
        let missing = Uuid::new_v4();
        assert!(matches!(
            StrategyController::load(state.clone(), missing).await,
            Err(ServiceError::Configuration(ConfigurationError::GameNotFound(id))) if id == missing
        ));

        let mut classic = strategy_game();
        classic.mode = crate::dao::models::GameMode::Classic;
        store.save_game(classic.clone()).await.unwrap();
        assert!(matches!(
            StrategyController::load(state.clone(), classic.id).await,
            Err(ServiceError::Configuration(ConfigurationError::InvalidMode { .. }))
        ));
        assert!(store.list_rounds(classic.id).await.unwrap().is_empty());

        let mut ended = strategy_game();
        ended.status = GameStatus::Ended;
        store.save_game(ended.clone()).await.unwrap();
        assert!(matches!(
            StrategyController::load(state.clone(), ended.id).await,
            Err(ServiceError::Configuration(ConfigurationError::GameEnded(_)))
        ));
    }

    #[tokio::test]
    async fn loading_seeds_rounds_and_opens_the_game() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        store.save_game(game.clone()).await.unwrap();

        let controller = loaded(&state, game.id).await;
        assert!(controller.run.initialized);
        assert_eq!(store.list_rounds(game.id).await.unwrap().len(), 3);
        let stored = store.find_game(game.id).await.unwrap().unwrap();
        assert_eq!(stored.status, GameStatus::Active);
    }

    #[tokio::test]
    async fn second_win_of_a_contestant_writes_one_placement() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;

        let first = controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert!(matches!(first, WinOutcome::Awarded { order: 1, .. }));
        let second = controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert_eq!(second, WinOutcome::Duplicate);

        let placements = store
            .list_scores(ScoreQuery::game(game.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|entry| !entry.is_bonus)
            .count();
        assert_eq!(placements, 1);
    }

    #[tokio::test]
    async fn reaching_required_winners_completes_the_round_early() {
        let (state, store) = memory_state().await;
        let mut game = strategy_game();
        game.strategy_required_winners = Some(2);
        let (ann, bob) = (contestant(game.id, "ann"), contestant(game.id, "bob"));
        seed_game(&store, &game, &[&ann, &bob]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        let round_id = controller.run.active_round_id.unwrap();

        controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert_eq!(
            store.find_round(round_id).await.unwrap().unwrap().status,
            RoundStatus::Active
        );

        let second = controller
            .handle_win(bob.id, WinContext::default())
            .await
            .unwrap();
        assert!(matches!(second, WinOutcome::Awarded { order: 2, .. }));

        let round = store.find_round(round_id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Completed);
        assert!(round.ended_at.is_some());
        assert!(controller.run.active_round_id.is_none());
        assert!(controller.run.intermission_deadline.is_some());
        assert!(controller.run.draw_deadline.is_none());
    }

    #[tokio::test]
    async fn wins_outside_a_round_are_ignored() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut controller = loaded(&state, game.id).await;
        let outcome = controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert_eq!(outcome, WinOutcome::NoActiveRound);
        assert!(
            store
                .list_scores(ScoreQuery::game(game.id))
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn failed_award_lets_the_contestant_win_again() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;

        store.fail_next_writes(1);
        assert!(
            controller
                .handle_win(ann.id, WinContext::default())
                .await
                .is_err()
        );
        assert!(controller.run.winners.is_empty());

        let retried = controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert!(matches!(retried, WinOutcome::Awarded { order: 1, .. }));
    }

    #[tokio::test]
    async fn fourth_winner_is_counted_but_not_paid() {
        let (state, store) = memory_state().await;
        let mut game = strategy_game();
        game.strategy_required_winners = Some(5);
        let players: Vec<_> = ["ann", "bob", "cid", "dee"]
            .into_iter()
            .map(|name| contestant(game.id, name))
            .collect();
        let refs: Vec<&_> = players.iter().collect();
        seed_game(&store, &game, &refs).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        for player in &players[..3] {
            controller
                .handle_win(player.id, WinContext::default())
                .await
                .unwrap();
        }
        let fourth = controller
            .handle_win(players[3].id, WinContext::default())
            .await
            .unwrap();

        assert_eq!(fourth, WinOutcome::Unranked { order: 4 });
        assert_eq!(controller.run.winners.len(), 4);
        let paid = store
            .list_scores(ScoreQuery::game(game.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|entry| entry.contestant_id == players[3].id)
            .count();
        assert_eq!(paid, 0);
    }

    #[tokio::test]
    async fn pattern_bonuses_follow_the_placement_entry() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        let grid = BingoGrid {
            numbers: vec![vec![0; 5]; 5],
            marked: vec![vec![true; 5]; 5],
        };
        let outcome = controller
            .handle_win(
                ann.id,
                WinContext {
                    card_id: None,
                    grid: Some(grid),
                },
            )
            .await
            .unwrap();

        let WinOutcome::Awarded { entries, .. } = outcome else {
            panic!("expected an award");
        };
        let totals: Vec<i32> = entries.iter().map(|e| e.total_after_round).collect();
        assert_eq!(totals, vec![10, 15, 30]);
        assert!(matches!(entries[1].metadata, ScoreMetadata::Pattern { .. }));
    }

    #[tokio::test]
    async fn combo_applies_within_the_window_only() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.config.bonus_rules.patterns.clear();
        controller.config.bonus_rules.combo = Some(ComboRule {
            points: 7,
            window: 1,
            label: "Back-to-back".into(),
        });

        controller.start_next_round().await;
        controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert!(
            controller
                .compute_combo_bonus(store_ref(&store), ann.id, 1)
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            controller
                .compute_combo_bonus(store_ref(&store), ann.id, 2)
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            controller
                .compute_combo_bonus(store_ref(&store), ann.id, 3)
                .await
                .unwrap()
                .is_none()
        );
    }

    fn store_ref(store: &MemoryStore) -> &dyn BingoStore {
        store
    }

    #[tokio::test]
    async fn stop_cancels_timers_and_later_ticks_do_nothing() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        seed_game(&store, &game, &[]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        assert!(controller.run.draw_deadline.is_some());

        controller.stop("test teardown");
        assert!(controller.run.draw_deadline.is_none());
        assert!(controller.run.intermission_deadline.is_none());
        assert_eq!(controller.machine.phase(), AutomationPhase::Stopped);

        controller.on_draw_tick().await;
        controller.start_next_round().await;
        assert!(store.list_draws(game.id).await.unwrap().is_empty());
        controller.stop("again");
    }

    #[tokio::test]
    async fn exhausted_pool_completes_the_round() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        seed_game(&store, &game, &[]).await;
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..draw_service::POOL_SIZE {
            draw_service::draw_next(&store, game.id, &mut rng)
                .await
                .unwrap();
        }

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        let round_id = controller.run.active_round_id.unwrap();
        controller.on_draw_tick().await;

        let round = store.find_round(round_id).await.unwrap().unwrap();
        assert_eq!(round.status, RoundStatus::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn single_round_game_runs_to_a_champion() {
        let (state, store) = memory_state().await;
        let mut game = strategy_game();
        game.total_rounds = 1;
        game.strategy_draw_limit_enabled = true;
        game.strategy_draws_per_round = Some(10);
        game.strategy_required_winners = Some(1);
        game.strategy_bonus_rules = Some(Default::default());
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        assert_eq!(
            start_automation(&state, game.id).await.unwrap(),
            StartOutcome::Started
        );
        assert_eq!(
            start_automation(&state, game.id).await.unwrap(),
            StartOutcome::AlreadyRunning
        );
        wait_until_gone(&state, game.id).await;

        let rounds = store.list_rounds(game.id).await.unwrap();
        assert_eq!(rounds.len(), 1);
        assert_eq!(rounds[0].status, RoundStatus::Completed);
        assert!(rounds[0].ended_at.is_some());

        let scores = store.list_scores(ScoreQuery::game(game.id)).await.unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores[0].points_awarded, 10);
        assert_eq!(scores[0].contestant_id, ann.id);

        let results = store.results().await;
        let champion = results
            .iter()
            .find(|result| result.kind == ResultKind::Champion)
            .unwrap();
        assert_eq!(champion.contestant_id, Some(ann.id));
        let ended = store.find_game(game.id).await.unwrap().unwrap();
        assert_eq!(ended.status, GameStatus::Ended);
    }

    #[tokio::test(start_paused = true)]
    async fn win_rows_from_the_feed_reach_the_controller() {
        let (state, store) = memory_state().await;
        let mut game = strategy_game();
        game.strategy_draw_interval_seconds = 3_600;
        game.strategy_required_winners = Some(1);
        let ann = contestant(game.id, "ann");
        store.save_game(game.clone()).await.unwrap();
        store.save_contestant(ann.clone()).await.unwrap();

        start_automation(&state, game.id).await.unwrap();
        wait_for(&state, game.id, |s| s.active_round_number == Some(1)).await;

        store.insert_result(win(game.id, ann.id)).await.unwrap();
        let snapshot = wait_for(&state, game.id, |s| {
            matches!(
                s.phase,
                AutomationPhase::Running(crate::state::state_machine::RunningPhase::Intermission {
                    completed_round: 1
                })
            )
        })
        .await;
        assert!(snapshot.winners_this_round.is_empty());

        let scores = store.list_scores(ScoreQuery::game(game.id)).await.unwrap();
        assert_eq!(scores[0].contestant_id, ann.id);
        assert!(stop_automation(&state, game.id, "test teardown").await);
        assert!(!state.controllers().contains_key(&game.id));
    }

    #[tokio::test(start_paused = true)]
    async fn stopping_twice_is_harmless() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        seed_game(&store, &game, &[]).await;

        start_automation(&state, game.id).await.unwrap();
        wait_for(&state, game.id, |s| s.active_round_number == Some(1)).await;

        assert!(stop_automation(&state, game.id, "first").await);
        assert!(!stop_automation(&state, game.id, "second").await);
        time::sleep(Duration::from_secs(30)).await;
        assert!(store.list_draws(game.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn restart_mid_game_keeps_playing_the_open_round() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut first_run = loaded(&state, game.id).await;
        first_run.start_next_round().await;
        let round_id = first_run.run.active_round_id.unwrap();
        first_run
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        first_run.stop("restart");

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        assert_eq!(controller.run.active_round_id, Some(round_id));
        assert_eq!(controller.run.active_round_number, Some(1));
        assert!(controller.run.winners.contains(&ann.id));
        assert_eq!(
            controller
                .handle_win(ann.id, WinContext::default())
                .await
                .unwrap(),
            WinOutcome::Duplicate
        );

        let statuses: Vec<RoundStatus> = store
            .list_rounds(game.id)
            .await
            .unwrap()
            .iter()
            .map(|round| round.status)
            .collect();
        assert_eq!(
            statuses,
            vec![RoundStatus::Active, RoundStatus::Pending, RoundStatus::Pending]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn restart_plays_a_last_round_left_active_before_crowning() {
        let (state, store) = memory_state().await;
        let mut game = strategy_game();
        game.strategy_required_winners = Some(1);
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;
        drop(loaded(&state, game.id).await);

        let rounds = store.list_rounds(game.id).await.unwrap();
        for round in &rounds[..2] {
            let round = round_service::activate_round(&store, round.clone())
                .await
                .unwrap();
            round_service::complete_round(&store, round.id, Duration::ZERO)
                .await
                .unwrap();
        }
        let last = round_service::activate_round(&store, rounds[2].clone())
            .await
            .unwrap();

        start_automation(&state, game.id).await.unwrap();
        let snapshot = wait_for(&state, game.id, |s| s.active_round_number.is_some()).await;
        assert_eq!(snapshot.active_round_id, Some(last.id));
        assert!(
            store
                .results()
                .await
                .iter()
                .all(|result| result.kind != ResultKind::Champion)
        );

        wait_until_gone(&state, game.id).await;
        let rounds = store.list_rounds(game.id).await.unwrap();
        assert!(rounds.iter().all(|round| round.status == RoundStatus::Completed));

        let placements: Vec<ScoreEntity> = store
            .list_scores(ScoreQuery::game(game.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|entry| !entry.is_bonus)
            .collect();
        assert_eq!(placements.len(), 1);
        assert_eq!(placements[0].round_id, Some(last.id));

        let results = store.results().await;
        let champion = results
            .iter()
            .find(|result| result.kind == ResultKind::Champion)
            .unwrap();
        assert_eq!(champion.contestant_id, Some(ann.id));
    }

    #[tokio::test(start_paused = true)]
    async fn stop_issued_while_a_start_is_loading_still_lands() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let game_id = game.id;
        seed_game(&store, &game, &[]).await;

        let gate = state.start_gate().lock().await;
        let starting = tokio::spawn({
            let state = state.clone();
            async move { start_automation(&state, game_id).await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        let stopping = tokio::spawn({
            let state = state.clone();
            async move { stop_automation(&state, game_id, "stopped while starting").await }
        });
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        drop(gate);

        assert_eq!(starting.await.unwrap().unwrap(), StartOutcome::Started);
        assert!(stopping.await.unwrap());
        assert!(!state.controllers().contains_key(&game_id));

        time::sleep(Duration::from_secs(30)).await;
        assert!(store.list_draws(game_id).await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn draws_follow_the_round_interval() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        seed_game(&store, &game, &[]).await;

        let mut controller = loaded(&state, game.id).await;
        let mut first = store.list_rounds(game.id).await.unwrap().remove(0);
        first.draw_interval_seconds = 30;
        store.save_round(first).await.unwrap();

        controller.start_next_round().await;
        assert_eq!(controller.run.draw_interval, Duration::from_secs(30));
        let wait = controller.run.draw_deadline.unwrap() - Instant::now();
        assert_eq!(wait, Duration::from_secs(30));

        controller.on_draw_tick().await;
        assert_eq!(store.list_draws(game.id).await.unwrap().len(), 1);
        let wait = controller.run.draw_deadline.unwrap() - Instant::now();
        assert_eq!(wait, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn retried_win_after_a_failed_reply_writes_no_second_placement() {
        let (state, store) = memory_state().await;
        let game = strategy_game();
        let ann = contestant(game.id, "ann");
        seed_game(&store, &game, &[&ann]).await;

        let mut controller = loaded(&state, game.id).await;
        controller.start_next_round().await;
        controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        // The ledger took the rows but the caller saw an error.
        controller.run.winners.shift_remove(&ann.id);

        let retried = controller
            .handle_win(ann.id, WinContext::default())
            .await
            .unwrap();
        assert_eq!(
            retried,
            WinOutcome::Awarded {
                order: 1,
                entries: Vec::new()
            }
        );
        let placements = store
            .list_scores(ScoreQuery::game(game.id))
            .await
            .unwrap()
            .into_iter()
            .filter(|entry| !entry.is_bonus)
            .count();
        assert_eq!(placements, 1);
    }
}
