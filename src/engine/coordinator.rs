//! Host coordinator: the single authoritative resolver for phase
//! transitions.
//!
//! Exactly the client recognized as host (a stable, session-wide
//! designation) runs this loop, but every rule is idempotent and safe to run
//! redundantly: rules re-check their precondition against the latest
//! observed snapshot immediately before writing, and every write changes the
//! phase/stamp fields that make the precondition false for re-entries.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle, time::sleep};
use tracing::{debug, error, info, warn};

use crate::{
    clock::{Clock, UnixMillis},
    codec::{self, CodecError},
    engine::feed::FeedState,
    session::{
        model::SessionState,
        rules::{GameRules, PhaseProfile, Resolution, RoundAdvance},
    },
    store::{Patch, SessionStore},
};

/// Pause between retries once a deadline is already due, so a transiently
/// failing store write cannot spin the loop hot.
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Why the coordinator stopped. Never a transient failure: those are retried
/// in place.
#[derive(Debug)]
pub enum SessionEnd {
    /// The room document was deleted (or the feed closed); the session is
    /// over.
    RoomClosed,
    /// The session document stopped decoding; requires a manual retry/leave.
    Corrupt(Arc<CodecError>),
}

/// Reactive rule runner driving one game's phase machine for one room.
pub struct HostCoordinator<G: GameRules> {
    store: Arc<dyn SessionStore>,
    rules: Arc<G>,
    clock: Arc<dyn Clock>,
    room_id: String,
    rx: watch::Receiver<FeedState<G>>,
}

impl<G: GameRules> HostCoordinator<G> {
    /// Build a coordinator over an existing feed.
    pub fn new(
        store: Arc<dyn SessionStore>,
        rules: Arc<G>,
        clock: Arc<dyn Clock>,
        room_id: impl Into<String>,
        rx: watch::Receiver<FeedState<G>>,
    ) -> Self {
        Self {
            store,
            rules,
            clock,
            room_id: room_id.into(),
            rx,
        }
    }

    /// Run the coordinator on its own task.
    pub fn spawn(self) -> JoinHandle<SessionEnd> {
        tokio::spawn(self.run())
    }

    /// Drive the rules until the session ends. Every snapshot change and
    /// every deadline re-evaluates the rules against the latest state; both
    /// signals are serialized through this one loop.
    pub async fn run(mut self) -> SessionEnd {
        info!(room_id = %self.room_id, "host coordinator running");
        loop {
            let snapshot = self.rx.borrow_and_update().clone();
            let state = match snapshot {
                FeedState::Connecting => {
                    if self.rx.changed().await.is_err() {
                        return SessionEnd::RoomClosed;
                    }
                    continue;
                }
                FeedState::Ended => return SessionEnd::RoomClosed,
                FeedState::Corrupt(err) => return SessionEnd::Corrupt(err),
                FeedState::Live(state) => state,
            };

            self.evaluate(&state).await;

            let wake = self.next_wake(&state);
            let sleep_for = wake.map(|at| {
                let remaining = at - self.clock.now();
                if remaining <= 0 {
                    RETRY_DELAY
                } else {
                    Duration::from_millis(remaining as u64)
                }
            });

            tokio::select! {
                changed = self.rx.changed() => {
                    if changed.is_err() {
                        return SessionEnd::RoomClosed;
                    }
                }
                () = sleep(sleep_for.unwrap_or_default()), if sleep_for.is_some() => {}
            }
        }
    }

    /// Next instant at which a rule could fire without a snapshot change.
    fn next_wake(&self, state: &SessionState<G>) -> Option<UnixMillis> {
        let profile = self.rules.profile(state.phase);
        if state.phase_started_at.is_none() && !matches!(profile, PhaseProfile::Terminal) {
            return Some(self.clock.now());
        }
        match profile {
            PhaseProfile::Submission { window } => state.deadline_after(window),
            PhaseProfile::Rendezvous { backstop } => state.deadline_after(backstop),
            PhaseProfile::Resolution => Some(self.clock.now()),
            // A pending rematch reset still needs retry ticks in case its
            // write fails; otherwise the terminal phase has no deadline.
            PhaseProfile::Terminal => state.all_voted_rematch().then(|| self.clock.now()),
        }
    }

    /// A phase that was never entered through the engine (fresh or reseeded
    /// room) carries no entry stamp; write one so its deadlines are defined.
    async fn stamp_phase_entry(&mut self, state: &SessionState<G>) {
        let still_unstamped = self.rx.borrow().live().is_some_and(|latest| {
            latest.phase == state.phase && latest.phase_started_at.is_none()
        });
        if !still_unstamped {
            return;
        }

        let patch = Patch::new()
            .server_timestamp(format!("{}.phaseStartedAt", self.rules.game_key()));
        if let Err(err) = self.store.update(&self.room_id, patch).await {
            warn!(
                room_id = %self.room_id,
                error = %err,
                "failed to stamp phase entry; retrying on the next tick"
            );
        }
    }

    /// Re-run every rule against the given snapshot.
    async fn evaluate(&mut self, state: &Arc<SessionState<G>>) {
        let now = self.clock.now();
        let profile = self.rules.profile(state.phase);

        if state.phase_started_at.is_none() && !matches!(profile, PhaseProfile::Terminal) {
            self.stamp_phase_entry(state).await;
            return;
        }

        match profile {
            PhaseProfile::Submission { window } => {
                let expected = self.rules.expected_submitters(state);
                let all_submitted = !expected.is_empty()
                    && expected.iter().all(|uid| state.has_submitted(uid));
                let deadline_passed =
                    state.deadline_after(window).is_some_and(|at| now >= at);

                if all_submitted || deadline_passed {
                    let resolution = {
                        let mut rng = rand::rng();
                        self.rules.resolve(state, &mut rng)
                    };
                    self.commit(state, resolution).await;
                }
            }
            PhaseProfile::Resolution => {
                let resolution = {
                    let mut rng = rand::rng();
                    self.rules.resolve(state, &mut rng)
                };
                self.commit(state, resolution).await;
            }
            PhaseProfile::Rendezvous { backstop } => {
                let backstopped =
                    state.deadline_after(backstop).is_some_and(|at| now >= at);
                if state.all_ready() || backstopped {
                    let resolution = self.rules.after_rendezvous(state);
                    self.commit(state, resolution).await;
                }
            }
            PhaseProfile::Terminal => {
                if state.all_voted_rematch() {
                    let mut resolution = Resolution::to(self.rules.initial_phase());
                    resolution.round = RoundAdvance::Reset;
                    self.commit(state, resolution).await;
                }
            }
        }
    }

    /// Write a resolution, unless its precondition went stale.
    async fn commit(&mut self, observed: &Arc<SessionState<G>>, resolution: Resolution<G>) {
        if resolution.is_noop(observed.phase) {
            return;
        }

        // The snapshot that triggered this rule may already be superseded by
        // our own previous write or a racing client: abandon, don't retry.
        let stale = {
            match self.rx.borrow().live() {
                Some(latest) => {
                    latest.phase != observed.phase || latest.round_index != observed.round_index
                }
                None => true,
            }
        };
        if stale {
            debug!(room_id = %self.room_id, "transition precondition went stale; abandoning");
            return;
        }

        if resolution.to != observed.phase
            && !self.rules.can_transition(observed.phase, resolution.to)
        {
            warn!(
                room_id = %self.room_id,
                from = ?observed.phase,
                to = ?resolution.to,
                "resolver produced a transition outside the table; refusing to write"
            );
            return;
        }

        // The winner is written exactly once; only a rematch reset clears it.
        if observed.winner_id.is_some() && resolution.round != RoundAdvance::Reset {
            debug!(room_id = %self.room_id, "winner already recorded; abandoning write");
            return;
        }

        let patch = match codec::transition_patch(self.rules.as_ref(), observed, &resolution) {
            Ok(patch) => patch,
            Err(err) => {
                error!(room_id = %self.room_id, error = %err, "failed to encode transition");
                return;
            }
        };

        match self.store.update(&self.room_id, patch).await {
            Ok(()) => {
                debug!(
                    room_id = %self.room_id,
                    from = ?observed.phase,
                    to = ?resolution.to,
                    "phase transition committed"
                );
            }
            Err(err) => {
                // Transient: the next snapshot or retry tick re-runs the rule.
                warn!(
                    room_id = %self.room_id,
                    error = %err,
                    "transition write failed; retrying on the next tick"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::timeout;

    use crate::{
        clock::SimClock,
        codec::seed_document,
        config::{EngineConfig, Timings},
        engine::client::{SessionClient, SubmitOutcome},
        games::grid_battle::{
            GridBattleIntent, GridBattlePhase, GridBattleResult, GridBattleRules,
        },
        session::model::Player,
        store::{Document, Patch, memory::MemoryStore},
    };

    use super::*;

    fn timings() -> Timings {
        Timings {
            question_window: Duration::from_secs(10),
            move_window: Duration::from_secs(15),
            guess_window: Duration::from_secs(30),
            rendezvous_backstop: Duration::from_secs(5),
            stalled_grace: Duration::from_secs(12),
        }
    }

    fn roster() -> Vec<Player> {
        vec![
            Player {
                uid: "a".into(),
                display_name: "Ada".into(),
                symbol: Some("X".into()),
            },
            Player {
                uid: "b".into(),
                display_name: "Bix".into(),
                symbol: Some("O".into()),
            },
        ]
    }

    struct Harness {
        store: MemoryStore,
        rules: Arc<GridBattleRules>,
        a: SessionClient<GridBattleRules>,
        b: SessionClient<GridBattleRules>,
        host: JoinHandle<SessionEnd>,
    }

    impl Harness {
        fn start() -> Self {
            Self::start_with_doc(None)
        }

        fn start_with_doc(doc: Option<Document>) -> Self {
            let rules = Arc::new(GridBattleRules::new(timings()));
            let clock = Arc::new(SimClock::new(1_000_000));
            let store = MemoryStore::new(clock.clone());
            let doc =
                doc.unwrap_or_else(|| seed_document(rules.as_ref(), "r1", &roster()).unwrap());
            store.create_room("r1", doc);

            let config = EngineConfig {
                timings: timings(),
            };
            let shared: Arc<dyn crate::store::SessionStore> = Arc::new(store.clone());
            let a = SessionClient::join(
                Arc::clone(&shared),
                Arc::clone(&rules),
                clock.clone(),
                config.clone(),
                "r1",
                "a",
            );
            let b = SessionClient::join(
                Arc::clone(&shared),
                Arc::clone(&rules),
                clock.clone(),
                config,
                "r1",
                "b",
            );
            let host = a.host_coordinator().spawn();
            Self {
                store,
                rules,
                a,
                b,
                host,
            }
        }

        async fn wait_phase(&self, phase: GridBattlePhase) {
            let mut rx = self.a.watch();
            timeout(Duration::from_secs(120), async {
                loop {
                    if rx
                        .borrow_and_update()
                        .live()
                        .is_some_and(|state| state.phase == phase)
                    {
                        return;
                    }
                    rx.changed().await.expect("feed closed while waiting");
                }
            })
            .await
            .unwrap_or_else(|_| panic!("never reached phase {phase:?}"));
        }

        fn state(&self) -> Arc<SessionState<GridBattleRules>> {
            self.a
                .latest()
                .live()
                .cloned()
                .expect("session is not live")
        }

        /// Ready both players through a rendezvous phase.
        async fn both_ready(&self) {
            self.a.set_ready().await.unwrap();
            self.b.set_ready().await.unwrap();
        }

        /// Drive one full round where `first` answers correctly, then both
        /// players place at the given cells.
        async fn play_round(&self, a_cell: (u32, u32), b_cell: (u32, u32)) {
            self.wait_phase(GridBattlePhase::Question).await;
            self.a
                .submit_intent(GridBattleIntent::Answer {
                    choice: 0,
                    correct: true,
                })
                .await
                .unwrap();
            self.b
                .submit_intent(GridBattleIntent::Answer {
                    choice: 1,
                    correct: false,
                })
                .await
                .unwrap();

            self.wait_phase(GridBattlePhase::Reveal).await;
            self.both_ready().await;

            self.wait_phase(GridBattlePhase::MoveOne).await;
            self.a
                .submit_intent(GridBattleIntent::Place {
                    row: a_cell.0,
                    col: a_cell.1,
                })
                .await
                .unwrap();

            self.wait_phase(GridBattlePhase::MoveTwo).await;
            let placed = self
                .b
                .submit_intent(GridBattleIntent::Place {
                    row: b_cell.0,
                    col: b_cell.1,
                })
                .await
                .unwrap();
            assert_eq!(placed, SubmitOutcome::Accepted);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn grid_match_ends_with_instant_win_on_fourth_in_a_row() {
        let h = Harness::start();

        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        h.both_ready().await;

        h.play_round((5, 5), (0, 0)).await;
        h.play_round((5, 6), (0, 1)).await;
        h.play_round((5, 7), (0, 2)).await;

        // Fourth round: the winning placement commits FINISHED directly,
        // bypassing the second move of the round.
        h.wait_phase(GridBattlePhase::Question).await;
        h.a.submit_intent(GridBattleIntent::Answer {
            choice: 0,
            correct: true,
        })
        .await
        .unwrap();
        h.b.submit_intent(GridBattleIntent::Answer {
            choice: 3,
            correct: false,
        })
        .await
        .unwrap();
        h.wait_phase(GridBattlePhase::Reveal).await;
        h.both_ready().await;
        h.wait_phase(GridBattlePhase::MoveOne).await;
        h.a.submit_intent(GridBattleIntent::Place { row: 5, col: 8 })
            .await
            .unwrap();

        h.wait_phase(GridBattlePhase::Finished).await;
        let state = h.state();
        assert_eq!(state.winner_id.as_deref(), Some("a"));

        // No further moves are accepted once the match is decided.
        let late = h
            .b
            .submit_intent(GridBattleIntent::Place { row: 9, col: 9 })
            .await
            .unwrap();
        assert_eq!(late, SubmitOutcome::Dropped);

        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn quiz_window_resolves_at_deadline_with_silent_player() {
        let h = Harness::start();
        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        h.both_ready().await;
        h.wait_phase(GridBattlePhase::Question).await;

        tokio::time::sleep(Duration::from_secs(2)).await;
        h.a.submit_intent(GridBattleIntent::Answer {
            choice: 2,
            correct: true,
        })
        .await
        .unwrap();
        // Player b never answers; the 10 second window must close on its own.

        h.wait_phase(GridBattlePhase::Reveal).await;
        let state = h.state();
        match state.round_result.as_ref().expect("round result recorded") {
            GridBattleResult::TurnOrder { first, randomized } => {
                assert_eq!(first.as_str(), "a");
                assert!(!*randomized);
            }
            other => panic!("unexpected round result: {other:?}"),
        }

        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn two_wrong_answers_resolve_to_a_randomized_first_mover() {
        let h = Harness::start();
        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        h.both_ready().await;
        h.wait_phase(GridBattlePhase::Question).await;

        h.a.submit_intent(GridBattleIntent::Answer {
            choice: 0,
            correct: false,
        })
        .await
        .unwrap();
        h.b.submit_intent(GridBattleIntent::Answer {
            choice: 1,
            correct: false,
        })
        .await
        .unwrap();

        h.wait_phase(GridBattlePhase::Reveal).await;
        let state = h.state();
        match state.round_result.as_ref().expect("round result recorded") {
            GridBattleResult::TurnOrder { first, randomized } => {
                assert!(*randomized, "no correct answer must disclose randomization");
                assert!(first.as_str() == "a" || first.as_str() == "b");
            }
            other => panic!("unexpected round result: {other:?}"),
        }

        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn rendezvous_advances_early_when_everyone_is_ready() {
        let h = Harness::start();
        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        h.both_ready().await;

        // Well inside the 5 second backstop.
        timeout(Duration::from_secs(2), h.wait_phase(GridBattlePhase::Question))
            .await
            .expect("barrier did not advance early");

        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn rendezvous_backstop_advances_despite_a_missing_player() {
        let h = Harness::start();
        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        h.a.set_ready().await.unwrap();
        // Player b never readies; the backstop must advance the group.

        h.wait_phase(GridBattlePhase::Question).await;
        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn unanimous_rematch_votes_reset_the_session() {
        let rules = GridBattleRules::new(timings());
        let mut doc = seed_document(&rules, "r1", &roster()).unwrap();
        Patch::new()
            .set("grid_battle.phase", serde_json::json!("finished"))
            .set("grid_battle.winnerId", serde_json::json!("b"))
            .set("grid_battle.roundIndex", serde_json::json!(7))
            .apply_to(&mut doc, 1);
        let h = Harness::start_with_doc(Some(doc));

        h.wait_phase(GridBattlePhase::Finished).await;
        h.a.vote_rematch().await.unwrap();
        h.b.vote_rematch().await.unwrap();

        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        let state = h.state();
        assert_eq!(state.round_index, 0);
        assert!(state.winner_id.is_none());
        assert!(state.pending_intents.is_empty());
        assert!(state.readiness.is_empty());
        assert!(state.round_result.is_none());
        assert!(state.rematch_votes.is_empty());
        assert_eq!(state.players, roster(), "roster survives the reset");
        assert!(state.shared.board.cells.is_empty());

        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_and_out_of_turn_submissions_are_noops() {
        let h = Harness::start();
        h.wait_phase(GridBattlePhase::WaitingForReady).await;
        h.both_ready().await;
        h.wait_phase(GridBattlePhase::Question).await;

        let first = h
            .a
            .submit_intent(GridBattleIntent::Answer {
                choice: 0,
                correct: true,
            })
            .await
            .unwrap();
        let second = h
            .a
            .submit_intent(GridBattleIntent::Answer {
                choice: 1,
                correct: false,
            })
            .await
            .unwrap();
        assert_eq!(first, SubmitOutcome::Accepted);
        assert_eq!(second, SubmitOutcome::Dropped);

        // A board move is illegal while the question is open.
        let misplaced = h
            .b
            .submit_intent(GridBattleIntent::Place { row: 1, col: 1 })
            .await
            .unwrap();
        assert_eq!(misplaced, SubmitOutcome::Dropped);

        let snapshot = h.store.room_snapshot("r1").unwrap();
        let state = crate::codec::decode_session(h.rules.as_ref(), &snapshot).unwrap();
        assert_eq!(state.pending_intents.len(), 1);
        match &state.intent_of("a").unwrap().payload {
            GridBattleIntent::Answer { choice, correct } => {
                assert_eq!(*choice, 0, "idempotent re-submission must not overwrite");
                assert!(*correct);
            }
            other => panic!("unexpected payload: {other:?}"),
        }

        h.host.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn coordinator_stops_when_the_room_is_deleted() {
        let h = Harness::start();
        h.wait_phase(GridBattlePhase::WaitingForReady).await;

        h.store.delete_room("r1");
        let end = timeout(Duration::from_secs(5), h.host)
            .await
            .expect("coordinator did not stop")
            .expect("coordinator panicked");
        assert!(matches!(end, SessionEnd::RoomClosed));
    }
}
