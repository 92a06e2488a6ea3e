//! Typed model of one game's slice of the shared room document.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{clock::UnixMillis, session::rules::GameRules};

/// Stable player identifier, as assigned by the identity layer.
pub type PlayerId = String;

/// One seated player as read from the room roster.
///
/// The roster is room-level state owned outside this engine: it is read here
/// but never written. Seating order is significant — the first player is the
/// tie-break authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    /// Stable uid.
    pub uid: PlayerId,
    /// Display name chosen at join time.
    #[serde(default)]
    pub display_name: String,
    /// Grid symbol assigned to this player, when the game uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
}

/// A submitted intent together with its server-assigned submission timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRecord<I> {
    /// Game-specific payload (move, answer, or guess). Opaque to the engine
    /// beyond what the game's resolver reads from it.
    pub payload: I,
    /// Server timestamp assigned when the intent landed in the store. This is
    /// the only ordering authority for tie-breaking; client clocks and
    /// arrival order are never consulted.
    #[serde(default)]
    pub submitted_at: UnixMillis,
}

/// The single source of truth for one game instance.
#[derive(Debug, Clone)]
pub struct SessionState<G: GameRules> {
    /// Immutable room identifier, assigned at creation.
    pub room_id: String,
    /// Currently seated players, in seating order.
    pub players: Vec<Player>,
    /// The one current phase.
    pub phase: G::Phase,
    /// Server timestamp of the last phase change; basis for every deadline.
    pub phase_started_at: Option<UnixMillis>,
    /// Monotonically increasing round counter, reset only on rematch.
    pub round_index: u32,
    /// The current round's submitted intents, at most one per player.
    pub pending_intents: IndexMap<PlayerId, IntentRecord<G::Intent>>,
    /// Rendezvous barrier entries, cleared at entry of every barrier phase.
    pub readiness: IndexMap<PlayerId, bool>,
    /// Outcome of the current round, computed once by the resolver.
    pub round_result: Option<G::RoundResult>,
    /// Winner of the match; set exactly once, only in the terminal phase.
    pub winner_id: Option<PlayerId>,
    /// Rematch votes collected in the terminal phase.
    pub rematch_votes: IndexMap<PlayerId, bool>,
    /// Game-owned shared fields (board, turn holder, cumulative scores, ...).
    pub shared: G::SharedData,
}

impl<G: GameRules> SessionState<G> {
    /// Uids of the currently seated players, in seating order.
    pub fn seated(&self) -> impl Iterator<Item = &PlayerId> {
        self.players.iter().map(|player| &player.uid)
    }

    /// Whether `uid` is currently seated.
    pub fn is_seated(&self, uid: &str) -> bool {
        self.players.iter().any(|player| player.uid == uid)
    }

    /// Seating position of `uid`, if seated.
    pub fn seat_index(&self, uid: &str) -> Option<usize> {
        self.players.iter().position(|player| player.uid == uid)
    }

    /// Player record for `uid`, if seated.
    pub fn player(&self, uid: &str) -> Option<&Player> {
        self.players.iter().find(|player| player.uid == uid)
    }

    /// Whether `uid` has an intent recorded for the current round.
    pub fn has_submitted(&self, uid: &str) -> bool {
        self.pending_intents.contains_key(uid)
    }

    /// Submitted intent of `uid`, if any.
    pub fn intent_of(&self, uid: &str) -> Option<&IntentRecord<G::Intent>> {
        self.pending_intents.get(uid)
    }

    /// Whether `uid` has flipped the readiness barrier.
    pub fn is_ready(&self, uid: &str) -> bool {
        self.readiness.get(uid).copied().unwrap_or(false)
    }

    /// The barrier is satisfied only by an explicit `true` from every
    /// currently-seated player. A player who left is never silently treated
    /// as ready, and an empty roster never satisfies the barrier.
    pub fn all_ready(&self) -> bool {
        !self.players.is_empty() && self.players.iter().all(|player| self.is_ready(&player.uid))
    }

    /// Whether every seated player voted for a rematch.
    pub fn all_voted_rematch(&self) -> bool {
        !self.players.is_empty()
            && self
                .players
                .iter()
                .all(|player| self.rematch_votes.get(&player.uid).copied().unwrap_or(false))
    }

    /// Deadline of the current phase given its window, when the phase entry
    /// was stamped.
    pub fn deadline_after(&self, window: std::time::Duration) -> Option<UnixMillis> {
        self.phase_started_at
            .map(|started| started + window.as_millis() as UnixMillis)
    }
}
