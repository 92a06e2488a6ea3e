//! Pure resolver algorithms shared by the game rule sets: tie-breaking
//! simultaneous submissions, grid win detection, and closeness scoring.

pub mod grid;
pub mod scoring;
pub mod tiebreak;

pub use grid::{GridBoard, wins_through};
pub use scoring::closeness_score;
pub use tiebreak::{AnswerStamp, TieBreak, first_correct_or_random};
