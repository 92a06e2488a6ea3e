//! Tie-break on simultaneous answers: who moves first after a timed quiz
//! question.

use rand::{RngCore, seq::IndexedRandom};

use crate::{clock::UnixMillis, session::model::PlayerId};

/// One answer considered by the tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerStamp {
    /// Player who answered.
    pub uid: PlayerId,
    /// Server timestamp assigned to the submission. The only ordering
    /// authority; arrival order is never consulted.
    pub submitted_at: UnixMillis,
    /// Whether the answer was correct.
    pub correct: bool,
}

/// Outcome of the tie-break.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TieBreak {
    /// Selected player.
    pub winner: PlayerId,
    /// True when the outcome was not skill-based: no correct answer existed
    /// and the winner was drawn uniformly at random. Recorded so the UI can
    /// disclose it.
    pub randomized: bool,
}

/// Select the earliest-timestamped correct answer. When no answer is correct,
/// or none was submitted, draw uniformly among the submitters (if any), else
/// among all seated players. Equal timestamps fall back to seating order so
/// the resolver stays deterministic.
///
/// Returns `None` only when nobody is seated.
pub fn first_correct_or_random(
    answers: &[AnswerStamp],
    seated: &[PlayerId],
    rng: &mut dyn RngCore,
) -> Option<TieBreak> {
    let seat_of =
        |uid: &PlayerId| seated.iter().position(|s| s == uid).unwrap_or(usize::MAX);

    if let Some(best) = answers
        .iter()
        .filter(|answer| answer.correct)
        .min_by_key(|answer| (answer.submitted_at, seat_of(&answer.uid)))
    {
        return Some(TieBreak {
            winner: best.uid.clone(),
            randomized: false,
        });
    }

    let pool: Vec<&PlayerId> = if answers.is_empty() {
        seated.iter().collect()
    } else {
        answers.iter().map(|answer| &answer.uid).collect()
    };

    pool.choose(rng).map(|uid| TieBreak {
        winner: (*uid).clone(),
        randomized: true,
    })
}
