//! Typed session data model, the per-game rules trait, and the client view
//! reducer.

pub mod model;
pub mod rules;
pub mod view;

pub use model::{IntentRecord, Player, PlayerId, SessionState};
pub use rules::{GameRules, PhaseProfile, Resolution, RoundAdvance};
pub use view::{SessionView, project};
