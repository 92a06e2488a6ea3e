//! Trivia tic-tac-toe: each round a timed question decides who gets to place
//! one mark on a 3×3 board; three in a row wins the match.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    config::Timings,
    resolve::{
        grid::{GridBoard, wins_through},
        tiebreak::{self, AnswerStamp},
    },
    session::{
        model::{PlayerId, SessionState},
        rules::{GameRules, PhaseProfile, Resolution},
    },
};

/// Phases of the trivia tic-tac-toe flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizGridPhase {
    /// Readiness barrier before each round; the previous answer is on
    /// display here.
    WaitingForReady,
    /// Timed question; the earliest correct answer earns the placement.
    Question,
    /// The question winner places a single mark.
    Place,
    /// Host-side resolution step closing the round.
    CheckWin,
    /// Terminal phase.
    Finished,
}

/// Player intents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuizGridIntent {
    /// Free-text answer, graded by the question provider before submission.
    Answer {
        /// The submitted answer text.
        answer: String,
        /// Whether it was accepted as correct.
        correct: bool,
    },
    /// Mark placement.
    Mark {
        /// Target row.
        row: u32,
        /// Target column.
        col: u32,
    },
}

/// Round outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QuizGridResult {
    /// Quiz outcome for the round.
    TurnOrder {
        /// Player who earned the placement.
        first: PlayerId,
        /// True when the outcome was drawn at random.
        randomized: bool,
    },
    /// The board filled with no run; it was cleared and play continues.
    BoardExhausted,
}

/// Game-owned shared document fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizGridShared {
    /// Current board.
    #[serde(default)]
    pub board: GridBoard,
    /// Player who earned this round's placement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placer: Option<PlayerId>,
}

/// Rule set for trivia tic-tac-toe.
#[derive(Debug, Clone)]
pub struct QuizGridRules {
    /// Board dimension.
    pub size: u32,
    /// Run length required to win.
    pub target_run: u32,
    timings: Timings,
}

impl QuizGridRules {
    /// Classic 3×3 board, three in a row.
    pub fn new(timings: Timings) -> Self {
        Self {
            size: 3,
            target_run: 3,
            timings,
        }
    }

    fn symbol_for(state: &SessionState<Self>, uid: &PlayerId) -> String {
        state
            .player(uid)
            .and_then(|player| player.symbol.clone())
            .unwrap_or_else(|| {
                match state.seat_index(uid) {
                    Some(0) => "X",
                    _ => "O",
                }
                .to_owned()
            })
    }
}

impl GameRules for QuizGridRules {
    type Phase = QuizGridPhase;
    type Intent = QuizGridIntent;
    type RoundResult = QuizGridResult;
    type SharedData = QuizGridShared;

    fn game_key(&self) -> &'static str {
        "quiz_grid"
    }

    fn initial_phase(&self) -> QuizGridPhase {
        QuizGridPhase::WaitingForReady
    }

    fn profile(&self, phase: QuizGridPhase) -> PhaseProfile {
        match phase {
            QuizGridPhase::WaitingForReady => PhaseProfile::Rendezvous {
                backstop: self.timings.rendezvous_backstop,
            },
            QuizGridPhase::Question => PhaseProfile::Submission {
                window: self.timings.question_window,
            },
            QuizGridPhase::Place => PhaseProfile::Submission {
                window: self.timings.move_window,
            },
            QuizGridPhase::CheckWin => PhaseProfile::Resolution,
            QuizGridPhase::Finished => PhaseProfile::Terminal,
        }
    }

    fn expected_submitters(&self, state: &SessionState<Self>) -> Vec<PlayerId> {
        match state.phase {
            QuizGridPhase::Question => state.seated().cloned().collect(),
            QuizGridPhase::Place => state.shared.placer.iter().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn is_legal_intent(
        &self,
        state: &SessionState<Self>,
        uid: &PlayerId,
        intent: &QuizGridIntent,
    ) -> bool {
        match (state.phase, intent) {
            (QuizGridPhase::Question, QuizGridIntent::Answer { .. }) => state.is_seated(uid),
            (QuizGridPhase::Place, QuizGridIntent::Mark { row, col }) => {
                state.shared.placer.as_ref() == Some(uid)
                    && *row < self.size
                    && *col < self.size
                    && !state.shared.board.is_occupied(*row, *col)
            }
            _ => false,
        }
    }

    fn can_transition(&self, from: QuizGridPhase, to: QuizGridPhase) -> bool {
        use QuizGridPhase::*;
        matches!(
            (from, to),
            (WaitingForReady, Question)
                | (Question, Place)
                | (Place, CheckWin)
                | (Place, Finished)
                | (CheckWin, WaitingForReady)
                | (Finished, WaitingForReady)
        )
    }

    fn resolve(&self, state: &SessionState<Self>, rng: &mut dyn RngCore) -> Resolution<Self> {
        match state.phase {
            QuizGridPhase::Question => {
                let answers: Vec<AnswerStamp> = state
                    .pending_intents
                    .iter()
                    .filter_map(|(uid, record)| match record.payload {
                        QuizGridIntent::Answer { correct, .. } => Some(AnswerStamp {
                            uid: uid.clone(),
                            submitted_at: record.submitted_at,
                            correct,
                        }),
                        QuizGridIntent::Mark { .. } => None,
                    })
                    .collect();
                let seated: Vec<PlayerId> = state.seated().cloned().collect();

                match tiebreak::first_correct_or_random(&answers, &seated, rng) {
                    Some(outcome) => {
                        let mut shared = state.shared.clone();
                        shared.placer = Some(outcome.winner.clone());
                        // Answers are consumed here; the placement window
                        // must open empty.
                        Resolution::to(QuizGridPhase::Place)
                            .with_result(QuizGridResult::TurnOrder {
                                first: outcome.winner,
                                randomized: outcome.randomized,
                            })
                            .with_shared(shared)
                            .clearing_intents()
                    }
                    None => Resolution::to(QuizGridPhase::Place).clearing_intents(),
                }
            }
            QuizGridPhase::Place => {
                let mut shared = state.shared.clone();
                if let Some(placer) = shared.placer.clone() {
                    if let Some(record) = state.intent_of(&placer) {
                        if let QuizGridIntent::Mark { row, col } = record.payload {
                            if row < self.size
                                && col < self.size
                                && !shared.board.is_occupied(row, col)
                            {
                                let symbol = Self::symbol_for(state, &placer);
                                shared.board.place(row, col, symbol.clone());
                                if wins_through(
                                    &shared.board,
                                    self.size,
                                    row,
                                    col,
                                    &symbol,
                                    self.target_run,
                                ) {
                                    return Resolution::to(QuizGridPhase::Finished)
                                        .with_winner(placer)
                                        .with_shared(shared);
                                }
                            }
                        }
                    }
                    shared.placer = None;
                }
                Resolution::to(QuizGridPhase::CheckWin)
                    .with_shared(shared)
                    .clearing_intents()
            }
            QuizGridPhase::CheckWin => {
                if state.shared.board.is_full(self.size) {
                    let mut shared = state.shared.clone();
                    shared.board = GridBoard::default();
                    Resolution::to(QuizGridPhase::WaitingForReady)
                        .with_result(QuizGridResult::BoardExhausted)
                        .with_shared(shared)
                } else {
                    Resolution::to(QuizGridPhase::WaitingForReady)
                }
            }
            other => Resolution::to(other),
        }
    }

    fn after_rendezvous(&self, state: &SessionState<Self>) -> Resolution<Self> {
        match state.phase {
            QuizGridPhase::WaitingForReady => {
                Resolution::to(QuizGridPhase::Question).advancing_round()
            }
            other => Resolution::to(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::timeout;

    use crate::{
        clock::SimClock,
        codec::seed_document,
        config::EngineConfig,
        engine::client::SessionClient,
        session::model::Player,
        store::memory::MemoryStore,
    };

    use super::*;

    fn timings() -> Timings {
        Timings {
            question_window: Duration::from_secs(8),
            move_window: Duration::from_secs(8),
            guess_window: Duration::from_secs(8),
            rendezvous_backstop: Duration::from_secs(4),
            stalled_grace: Duration::from_secs(10),
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

    async fn wait_phase(client: &SessionClient<QuizGridRules>, phase: QuizGridPhase) {
        let mut rx = client.watch();
        timeout(Duration::from_secs(120), async {
            loop {
                if rx
                    .borrow_and_update()
                    .live()
                    .is_some_and(|state| state.phase == phase)
                {
                    return;
                }
                rx.changed().await.expect("feed closed");
            }
        })
        .await
        .unwrap_or_else(|_| panic!("never reached {phase:?}"));
    }

    /// Full match: player a wins three questions and marks a diagonal.
    #[tokio::test(start_paused = true)]
    async fn diagonal_of_three_wins_the_match() {
        let rules = Arc::new(QuizGridRules::new(timings()));
        let clock = Arc::new(SimClock::new(2_000_000));
        let store = MemoryStore::new(clock.clone());
        store.create_room("q1", seed_document(rules.as_ref(), "q1", &roster()).unwrap());

        let shared: Arc<dyn crate::store::SessionStore> = Arc::new(store.clone());
        let config = EngineConfig { timings: timings() };
        let a = SessionClient::join(
            Arc::clone(&shared),
            Arc::clone(&rules),
            clock.clone(),
            config.clone(),
            "q1",
            "a",
        );
        let b = SessionClient::join(
            Arc::clone(&shared),
            Arc::clone(&rules),
            clock.clone(),
            config,
            "q1",
            "b",
        );
        let host = a.host_coordinator().spawn();

        for cell in [(0u32, 0u32), (1, 1), (2, 2)] {
            wait_phase(&a, QuizGridPhase::WaitingForReady).await;
            a.set_ready().await.unwrap();
            b.set_ready().await.unwrap();

            wait_phase(&a, QuizGridPhase::Question).await;
            a.submit_intent(QuizGridIntent::Answer {
                answer: "right".into(),
                correct: true,
            })
            .await
            .unwrap();
            b.submit_intent(QuizGridIntent::Answer {
                answer: "wrong".into(),
                correct: false,
            })
            .await
            .unwrap();

            wait_phase(&a, QuizGridPhase::Place).await;
            a.submit_intent(QuizGridIntent::Mark {
                row: cell.0,
                col: cell.1,
            })
            .await
            .unwrap();
        }

        wait_phase(&a, QuizGridPhase::Finished).await;
        let state = a.latest().live().cloned().unwrap();
        assert_eq!(state.winner_id.as_deref(), Some("a"));

        host.abort();
    }

    #[test]
    fn question_winner_becomes_the_placer_and_answers_are_consumed() {
        use indexmap::IndexMap;
        use rand::{SeedableRng, rngs::StdRng};

        use crate::session::model::IntentRecord;

        let rules = QuizGridRules::new(timings());
        let mut state = SessionState {
            room_id: "q1".into(),
            players: roster(),
            phase: QuizGridPhase::Question,
            phase_started_at: Some(1_000),
            round_index: 1,
            pending_intents: IndexMap::new(),
            readiness: IndexMap::new(),
            round_result: None,
            winner_id: None,
            rematch_votes: IndexMap::new(),
            shared: QuizGridShared::default(),
        };
        state.pending_intents.insert(
            "b".into(),
            IntentRecord {
                payload: QuizGridIntent::Answer {
                    answer: "yes".into(),
                    correct: true,
                },
                submitted_at: 1_500,
            },
        );

        let mut rng = StdRng::seed_from_u64(11);
        let resolution = rules.resolve(&state, &mut rng);

        assert_eq!(resolution.to, QuizGridPhase::Place);
        assert!(resolution.clear_intents, "placement window must open empty");
        assert_eq!(
            resolution.shared.expect("placer recorded").placer.as_deref(),
            Some("b")
        );
    }
}
