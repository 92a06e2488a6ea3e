//! The per-game parameterization of the generic engine.
//!
//! Each mini-game supplies its phase enum, its payload schemas, and a
//! resolver; the engine owns windows, barriers, idempotent transitions, and
//! the rematch reset.

use std::{fmt::Debug, time::Duration};

use rand::RngCore;
use serde::{Serialize, de::DeserializeOwned};

use crate::session::model::{PlayerId, SessionState};

/// Bound bundle for types that cross the codec boundary.
pub trait WireData: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> WireData for T where T: Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// How the engine drives a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseProfile {
    /// Players write intents; the window closes on the earlier of
    /// all-expected-submitted and `phase_started_at + window`.
    Submission {
        /// Maximum open duration of the submission window.
        window: Duration,
    },
    /// Host-side resolution step with no player input; resolved immediately
    /// on entry.
    Resolution,
    /// Readiness barrier: advances when every seated player is ready, or when
    /// the backstop elapses so one disconnected player cannot stall the
    /// group.
    Rendezvous {
        /// Backstop deadline measured from phase entry.
        backstop: Duration,
    },
    /// Terminal phase; only rematch votes are observed.
    Terminal,
}

/// What happens to the per-round fields when a transition applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RoundAdvance {
    /// Same round continues.
    #[default]
    Keep,
    /// A new round starts: intents, readiness, and the round result are
    /// cleared and the round counter increments.
    Next,
    /// Full rematch reset: everything round-scoped plus the winner, the
    /// rematch votes, and the game-owned shared data are cleared, and the
    /// round counter returns to zero. The roster is untouched.
    Reset,
}

/// The authoritative outcome of one resolver invocation.
#[derive(Debug, Clone)]
pub struct Resolution<G: GameRules> {
    /// Phase to transition into.
    pub to: G::Phase,
    /// Round result to record, if the round just closed.
    pub round_result: Option<G::RoundResult>,
    /// Match winner, set only when transitioning into the terminal phase.
    pub winner: Option<PlayerId>,
    /// Replacement for the game-owned shared data, when it changed.
    pub shared: Option<G::SharedData>,
    /// Round bookkeeping applied together with the phase write.
    pub round: RoundAdvance,
    /// Clear `pending_intents` on entry even when the round continues
    /// (submission phases whose inputs were consumed by this resolution).
    pub clear_intents: bool,
}

impl<G: GameRules> Resolution<G> {
    /// Transition into `to` with no side effects beyond the phase stamp.
    pub fn to(to: G::Phase) -> Self {
        Self {
            to,
            round_result: None,
            winner: None,
            shared: None,
            round: RoundAdvance::Keep,
            clear_intents: false,
        }
    }

    /// Record a round result.
    #[must_use]
    pub fn with_result(mut self, result: G::RoundResult) -> Self {
        self.round_result = Some(result);
        self
    }

    /// Declare the match winner.
    #[must_use]
    pub fn with_winner(mut self, winner: PlayerId) -> Self {
        self.winner = Some(winner);
        self
    }

    /// Replace the game-owned shared data.
    #[must_use]
    pub fn with_shared(mut self, shared: G::SharedData) -> Self {
        self.shared = Some(shared);
        self
    }

    /// Start the next round on entry.
    #[must_use]
    pub fn advancing_round(mut self) -> Self {
        self.round = RoundAdvance::Next;
        self
    }

    /// Clear submitted intents on entry.
    #[must_use]
    pub fn clearing_intents(mut self) -> Self {
        self.clear_intents = true;
        self
    }

    /// Whether this resolution would change nothing: same phase, no payload.
    /// The coordinator skips committing these.
    pub fn is_noop(&self, current: G::Phase) -> bool {
        self.to == current
            && self.round_result.is_none()
            && self.winner.is_none()
            && self.shared.is_none()
            && self.round == RoundAdvance::Keep
            && !self.clear_intents
    }
}

/// Per-game parameterization of the engine.
///
/// Implementations must be pure with respect to the passed state: the same
/// snapshot must always produce the same resolution (modulo the injected
/// RNG), because the host re-runs resolvers redundantly on every observed
/// snapshot.
pub trait GameRules: Clone + Debug + Send + Sync + Sized + 'static {
    /// Closed set of named phases; exactly one is current.
    type Phase: Copy + Eq + WireData;
    /// Game-specific intent payload (move, answer, or guess).
    type Intent: WireData;
    /// Game-specific round outcome.
    type RoundResult: WireData;
    /// Game-owned shared document fields (board, turn holder, scores, ...).
    type SharedData: Default + WireData;

    /// Namespace key of this game's section inside the room document.
    fn game_key(&self) -> &'static str;

    /// Phase a fresh (or rematch-reset) session starts in.
    fn initial_phase(&self) -> Self::Phase;

    /// How the engine drives the given phase.
    fn profile(&self, phase: Self::Phase) -> PhaseProfile;

    /// Players whose intents are awaited in the given submission phase.
    fn expected_submitters(&self, state: &SessionState<Self>) -> Vec<PlayerId>;

    /// Client-side legality precondition. Illegal intents are silently
    /// dropped at the point of submission, never partially applied.
    fn is_legal_intent(&self, state: &SessionState<Self>, uid: &PlayerId, intent: &Self::Intent)
    -> bool;

    /// Direction-only transition table; the engine refuses writes that are
    /// not in it.
    fn can_transition(&self, from: Self::Phase, to: Self::Phase) -> bool;

    /// Resolve a closed submission window or a resolution step. Called only
    /// for phases whose profile is [`PhaseProfile::Submission`] or
    /// [`PhaseProfile::Resolution`].
    fn resolve(&self, state: &SessionState<Self>, rng: &mut dyn RngCore) -> Resolution<Self>;

    /// Next state once a rendezvous barrier is satisfied or backstopped.
    fn after_rendezvous(&self, state: &SessionState<Self>) -> Resolution<Self>;

    /// Whether the given phase is terminal.
    fn is_terminal(&self, phase: Self::Phase) -> bool {
        matches!(self.profile(phase), PhaseProfile::Terminal)
    }
}
