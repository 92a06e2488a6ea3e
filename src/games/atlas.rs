//! Atlas: a map/year guessing game. Every round all players drop a pin and
//! pick a year within a timed window; closeness to the target earns points,
//! and the highest cumulative score after the last round wins.

use indexmap::IndexMap;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{
    config::Timings,
    resolve::scoring::closeness_score,
    session::{
        model::{PlayerId, SessionState},
        rules::{GameRules, PhaseProfile, Resolution},
    },
};

/// Mean earth radius, kilometres.
const EARTH_RADIUS_KM: f64 = 6_371.0;

/// Phases of the atlas flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AtlasPhase {
    /// Readiness barrier before the first round.
    Lobby,
    /// Timed guessing window; every player submits a pin and a year.
    Guessing,
    /// The target location is on display; players confirm.
    MapReveal,
    /// Per-round scores are on display; players confirm.
    Results,
    /// Cumulative standings are on display; players confirm.
    Leaderboard,
    /// Terminal phase after the final round.
    Finished,
}

/// One round's target, supplied by the content layer when the rules are
/// built. Target content is external to the engine, like question text.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtlasTarget {
    /// Latitude, degrees.
    pub lat: f64,
    /// Longitude, degrees.
    pub lon: f64,
    /// Year of the pictured event.
    pub year: i32,
}

/// A player's guess for the current round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AtlasGuess {
    /// Guessed latitude, degrees.
    pub lat: f64,
    /// Guessed longitude, degrees.
    pub lon: f64,
    /// Guessed year.
    pub year: i32,
}

/// Per-player scoring breakdown for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasScore {
    /// Points for the location sub-objective.
    pub location: u32,
    /// Points for the year sub-objective.
    pub year: u32,
    /// Sum of the sub-objectives.
    pub total: u32,
    /// The player missed the deadline entirely. Distinct from a submitted
    /// bad-but-honest guess.
    pub timed_out: bool,
}

/// Outcome of one guessing round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasRoundResult {
    /// The revealed target.
    pub target: AtlasTarget,
    /// Score breakdown per player.
    pub entries: IndexMap<PlayerId, AtlasScore>,
}

/// Game-owned shared document fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtlasShared {
    /// Cumulative scores across rounds.
    #[serde(default)]
    pub scores: IndexMap<PlayerId, i64>,
}

/// Rule set for an atlas session with a fixed round list.
#[derive(Debug, Clone)]
pub struct AtlasRules {
    /// Maximum points per sub-objective.
    pub max_score: u32,
    /// Distance at which the location score reaches zero, kilometres.
    pub distance_threshold_km: f64,
    /// Year error at which the year score reaches zero.
    pub year_threshold: f64,
    rounds: Vec<AtlasTarget>,
    timings: Timings,
}

impl AtlasRules {
    /// Build a session over the given targets, one round per target.
    pub fn new(timings: Timings, rounds: Vec<AtlasTarget>) -> Self {
        Self {
            max_score: 100,
            distance_threshold_km: 5_000.0,
            year_threshold: 100.0,
            rounds,
            timings,
        }
    }

    /// Number of rounds in the session.
    pub fn total_rounds(&self) -> u32 {
        self.rounds.len() as u32
    }

    /// Target of the given 1-based round.
    fn target_for(&self, round_index: u32) -> Option<&AtlasTarget> {
        round_index
            .checked_sub(1)
            .and_then(|index| self.rounds.get(index as usize))
    }

    fn score_guess(&self, guess: &AtlasGuess, target: &AtlasTarget) -> AtlasScore {
        let distance =
            haversine_km(guess.lat, guess.lon, target.lat, target.lon);
        let location = closeness_score(self.max_score, distance, self.distance_threshold_km);
        let year_error = f64::from((guess.year - target.year).abs());
        let year = closeness_score(self.max_score, year_error, self.year_threshold);
        AtlasScore {
            location,
            year,
            total: location + year,
            timed_out: false,
        }
    }

    fn standings_winner(state: &SessionState<Self>) -> Option<PlayerId> {
        state
            .players
            .iter()
            .enumerate()
            .max_by_key(|(index, player)| {
                (
                    state.shared.scores.get(&player.uid).copied().unwrap_or(0),
                    // Seating order breaks score ties deterministically.
                    std::cmp::Reverse(*index),
                )
            })
            .map(|(_, player)| player.uid.clone())
    }
}

/// Great-circle distance between two coordinates, kilometres.
fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();
    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

impl GameRules for AtlasRules {
    type Phase = AtlasPhase;
    type Intent = AtlasGuess;
    type RoundResult = AtlasRoundResult;
    type SharedData = AtlasShared;

    fn game_key(&self) -> &'static str {
        "atlas"
    }

    fn initial_phase(&self) -> AtlasPhase {
        AtlasPhase::Lobby
    }

    fn profile(&self, phase: AtlasPhase) -> PhaseProfile {
        match phase {
            AtlasPhase::Lobby
            | AtlasPhase::MapReveal
            | AtlasPhase::Results
            | AtlasPhase::Leaderboard => PhaseProfile::Rendezvous {
                backstop: self.timings.rendezvous_backstop,
            },
            AtlasPhase::Guessing => PhaseProfile::Submission {
                window: self.timings.guess_window,
            },
            AtlasPhase::Finished => PhaseProfile::Terminal,
        }
    }

    fn expected_submitters(&self, state: &SessionState<Self>) -> Vec<PlayerId> {
        match state.phase {
            AtlasPhase::Guessing => state.seated().cloned().collect(),
            _ => Vec::new(),
        }
    }

    fn is_legal_intent(
        &self,
        state: &SessionState<Self>,
        uid: &PlayerId,
        intent: &AtlasGuess,
    ) -> bool {
        state.phase == AtlasPhase::Guessing
            && state.is_seated(uid)
            && intent.lat.is_finite()
            && intent.lon.is_finite()
            && (-90.0..=90.0).contains(&intent.lat)
            && (-180.0..=180.0).contains(&intent.lon)
    }

    fn can_transition(&self, from: AtlasPhase, to: AtlasPhase) -> bool {
        use AtlasPhase::*;
        matches!(
            (from, to),
            (Lobby, Guessing)
                | (Guessing, MapReveal)
                | (MapReveal, Results)
                | (Results, Leaderboard)
                | (Leaderboard, Guessing)
                | (Leaderboard, Finished)
                | (Finished, Lobby)
        )
    }

    fn resolve(&self, state: &SessionState<Self>, _rng: &mut dyn RngCore) -> Resolution<Self> {
        match state.phase {
            AtlasPhase::Guessing => {
                let Some(target) = self.target_for(state.round_index).copied() else {
                    // No target configured for this round; nothing to score.
                    return Resolution::to(AtlasPhase::MapReveal);
                };

                let mut entries = IndexMap::new();
                let mut shared = state.shared.clone();
                for player in &state.players {
                    let score = match state.intent_of(&player.uid) {
                        Some(record) => self.score_guess(&record.payload, &target),
                        // Missing the deadline zeroes every sub-objective,
                        // flagged apart from a bad guess.
                        None => AtlasScore {
                            location: 0,
                            year: 0,
                            total: 0,
                            timed_out: true,
                        },
                    };
                    *shared.scores.entry(player.uid.clone()).or_insert(0) +=
                        i64::from(score.total);
                    entries.insert(player.uid.clone(), score);
                }

                Resolution::to(AtlasPhase::MapReveal)
                    .with_result(AtlasRoundResult { target, entries })
                    .with_shared(shared)
            }
            other => Resolution::to(other),
        }
    }

    fn after_rendezvous(&self, state: &SessionState<Self>) -> Resolution<Self> {
        match state.phase {
            AtlasPhase::Lobby => Resolution::to(AtlasPhase::Guessing).advancing_round(),
            AtlasPhase::MapReveal => Resolution::to(AtlasPhase::Results),
            AtlasPhase::Results => Resolution::to(AtlasPhase::Leaderboard),
            AtlasPhase::Leaderboard => {
                if state.round_index >= self.total_rounds() {
                    let mut resolution = Resolution::to(AtlasPhase::Finished);
                    if let Some(winner) = Self::standings_winner(state) {
                        resolution = resolution.with_winner(winner);
                    }
                    resolution
                } else {
                    Resolution::to(AtlasPhase::Guessing).advancing_round()
                }
            }
            other => Resolution::to(other),
        }
    }
}
