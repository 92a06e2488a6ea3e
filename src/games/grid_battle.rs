//! Grid battle: a timed quiz decides who moves first, then the two players
//! place one symbol each per round on an N×N board. Four in a row — in any
//! axis direction — wins the match on the spot.

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

/// Phases of the grid battle flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridBattlePhase {
    /// Readiness barrier before each round.
    WaitingForReady,
    /// Timed quiz question; the earliest correct answer moves first.
    Question,
    /// Quiz outcome on display; players confirm before moves begin.
    Reveal,
    /// First placement of the round, by the turn holder.
    MoveOne,
    /// Second placement, by the other player.
    MoveTwo,
    /// Host-side resolution step closing the round.
    CheckWin,
    /// Terminal phase; the winner is recorded.
    Finished,
}

/// Player intents: a quiz answer or a board placement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridBattleIntent {
    /// Answer to the current question, graded by the question provider
    /// before submission. The question content itself never reaches the
    /// engine.
    Answer {
        /// Index of the selected choice.
        choice: u32,
        /// Whether the choice was correct.
        correct: bool,
    },
    /// Placement at the given cell.
    Place {
        /// Target row.
        row: u32,
        /// Target column.
        col: u32,
    },
}

/// Round outcomes recorded for the UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GridBattleResult {
    /// Who won the quiz tie-break, and whether the outcome was randomized
    /// because nobody answered correctly.
    TurnOrder {
        /// Player who moves first this round.
        first: PlayerId,
        /// True when the first mover was drawn at random.
        randomized: bool,
    },
    /// The board filled without a winning run; it was cleared and play
    /// continues.
    BoardExhausted,
}

/// Game-owned shared document fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridBattleShared {
    /// Current board.
    #[serde(default)]
    pub board: GridBoard,
    /// Player expected to place during the current move phase.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn_holder: Option<PlayerId>,
}

/// Rule set for a two-player grid battle.
#[derive(Debug, Clone)]
pub struct GridBattleRules {
    /// Board dimension (`size` × `size`).
    pub size: u32,
    /// Run length required to win.
    pub target_run: u32,
    timings: Timings,
}

impl GridBattleRules {
    /// Standard 12×12 board, four in a row.
    pub fn new(timings: Timings) -> Self {
        Self {
            size: 12,
            target_run: 4,
            timings,
        }
    }

    /// Override board dimension and winning run length.
    #[must_use]
    pub fn with_board(mut self, size: u32, target_run: u32) -> Self {
        self.size = size;
        self.target_run = target_run;
        self
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

    fn other_player(state: &SessionState<Self>, uid: &PlayerId) -> Option<PlayerId> {
        state
            .players
            .iter()
            .map(|player| &player.uid)
            .find(|other| *other != uid)
            .cloned()
    }

    /// Apply the turn holder's placement (if any), run the win check
    /// synchronously with it, and otherwise hand the turn over.
    fn resolve_move(
        &self,
        state: &SessionState<Self>,
        next: GridBattlePhase,
    ) -> Resolution<Self> {
        let mut shared = state.shared.clone();
        if let Some(holder) = shared.turn_holder.clone() {
            if let Some(record) = state.intent_of(&holder) {
                if let GridBattleIntent::Place { row, col } = record.payload {
                    if row < self.size && col < self.size && !shared.board.is_occupied(row, col)
                    {
                        let symbol = Self::symbol_for(state, &holder);
                        shared.board.place(row, col, symbol.clone());
                        // Evaluated before any further state mutation: a
                        // winning placement commits the terminal phase
                        // directly and the round never reaches `next`.
                        if wins_through(
                            &shared.board,
                            self.size,
                            row,
                            col,
                            &symbol,
                            self.target_run,
                        ) {
                            return Resolution::to(GridBattlePhase::Finished)
                                .with_winner(holder)
                                .with_shared(shared);
                        }
                    }
                }
            }
            // Timed-out or illegal placements skip the move; the turn still
            // passes.
            shared.turn_holder = Self::other_player(state, &holder);
        }
        Resolution::to(next).with_shared(shared).clearing_intents()
    }
}

impl GameRules for GridBattleRules {
    type Phase = GridBattlePhase;
    type Intent = GridBattleIntent;
    type RoundResult = GridBattleResult;
    type SharedData = GridBattleShared;

    fn game_key(&self) -> &'static str {
        "grid_battle"
    }

    fn initial_phase(&self) -> GridBattlePhase {
        GridBattlePhase::WaitingForReady
    }

    fn profile(&self, phase: GridBattlePhase) -> PhaseProfile {
        match phase {
            GridBattlePhase::WaitingForReady | GridBattlePhase::Reveal => {
                PhaseProfile::Rendezvous {
                    backstop: self.timings.rendezvous_backstop,
                }
            }
            GridBattlePhase::Question => PhaseProfile::Submission {
                window: self.timings.question_window,
            },
            GridBattlePhase::MoveOne | GridBattlePhase::MoveTwo => PhaseProfile::Submission {
                window: self.timings.move_window,
            },
            GridBattlePhase::CheckWin => PhaseProfile::Resolution,
            GridBattlePhase::Finished => PhaseProfile::Terminal,
        }
    }

    fn expected_submitters(&self, state: &SessionState<Self>) -> Vec<PlayerId> {
        match state.phase {
            GridBattlePhase::Question => state.seated().cloned().collect(),
            GridBattlePhase::MoveOne | GridBattlePhase::MoveTwo => {
                state.shared.turn_holder.iter().cloned().collect()
            }
            _ => Vec::new(),
        }
    }

    fn is_legal_intent(
        &self,
        state: &SessionState<Self>,
        uid: &PlayerId,
        intent: &GridBattleIntent,
    ) -> bool {
        match (state.phase, intent) {
            (GridBattlePhase::Question, GridBattleIntent::Answer { .. }) => state.is_seated(uid),
            (
                GridBattlePhase::MoveOne | GridBattlePhase::MoveTwo,
                GridBattleIntent::Place { row, col },
            ) => {
                state.shared.turn_holder.as_ref() == Some(uid)
                    && *row < self.size
                    && *col < self.size
                    && !state.shared.board.is_occupied(*row, *col)
            }
            _ => false,
        }
    }

    fn can_transition(&self, from: GridBattlePhase, to: GridBattlePhase) -> bool {
        use GridBattlePhase::*;
        matches!(
            (from, to),
            (WaitingForReady, Question)
                | (Question, Reveal)
                | (Reveal, MoveOne)
                | (MoveOne, MoveTwo)
                | (MoveOne, Finished)
                | (MoveTwo, CheckWin)
                | (MoveTwo, Finished)
                | (CheckWin, WaitingForReady)
                | (Finished, WaitingForReady)
        )
    }

    fn resolve(&self, state: &SessionState<Self>, rng: &mut dyn RngCore) -> Resolution<Self> {
        match state.phase {
            GridBattlePhase::Question => {
                let answers: Vec<AnswerStamp> = state
                    .pending_intents
                    .iter()
                    .filter_map(|(uid, record)| match record.payload {
                        GridBattleIntent::Answer { correct, .. } => Some(AnswerStamp {
                            uid: uid.clone(),
                            submitted_at: record.submitted_at,
                            correct,
                        }),
                        GridBattleIntent::Place { .. } => None,
                    })
                    .collect();
                let seated: Vec<PlayerId> = state.seated().cloned().collect();

                match tiebreak::first_correct_or_random(&answers, &seated, rng) {
                    Some(outcome) => {
                        let mut shared = state.shared.clone();
                        shared.turn_holder = Some(outcome.winner.clone());
                        Resolution::to(GridBattlePhase::Reveal)
                            .with_result(GridBattleResult::TurnOrder {
                                first: outcome.winner,
                                randomized: outcome.randomized,
                            })
                            .with_shared(shared)
                    }
                    None => Resolution::to(GridBattlePhase::Reveal),
                }
            }
            GridBattlePhase::MoveOne => self.resolve_move(state, GridBattlePhase::MoveTwo),
            GridBattlePhase::MoveTwo => self.resolve_move(state, GridBattlePhase::CheckWin),
            GridBattlePhase::CheckWin => {
                if state.shared.board.is_full(self.size) {
                    let mut shared = state.shared.clone();
                    shared.board = GridBoard::default();
                    Resolution::to(GridBattlePhase::WaitingForReady)
                        .with_result(GridBattleResult::BoardExhausted)
                        .with_shared(shared)
                } else {
                    Resolution::to(GridBattlePhase::WaitingForReady)
                }
            }
            other => Resolution::to(other),
        }
    }

    fn after_rendezvous(&self, state: &SessionState<Self>) -> Resolution<Self> {
        match state.phase {
            GridBattlePhase::WaitingForReady => {
                Resolution::to(GridBattlePhase::Question).advancing_round()
            }
            GridBattlePhase::Reveal => {
                Resolution::to(GridBattlePhase::MoveOne).clearing_intents()
            }
            other => Resolution::to(other),
        }
    }
}
