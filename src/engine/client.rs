//! Per-player session client: the write path for intents, readiness, and
//! rematch votes, plus read access to the live session state.
//!
//! A client only ever writes its own entries (`pendingIntents[self]`,
//! `readiness[self]`, `rematchVotes[self]`); phase-transition fields belong
//! exclusively to the host coordinator. This single-writer-per-field-class
//! discipline is the concurrency control substitute for transactions.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::debug;

use crate::{
    clock::Clock,
    codec,
    config::EngineConfig,
    engine::{
        coordinator::HostCoordinator,
        feed::{FeedState, SessionFeed},
    },
    error::EngineError,
    session::{
        model::{PlayerId, SessionState},
        rules::{GameRules, PhaseProfile},
        view::{SessionView, project},
    },
    store::SessionStore,
};

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The write was accepted by the store.
    Accepted,
    /// A precondition failed and the submission was dropped without a write.
    /// Not an error: out-of-turn, duplicate, or late submissions are no-ops.
    Dropped,
}

/// Long-lived handle for one player in one room, constructed at session join
/// and torn down (dropped) at session leave.
pub struct SessionClient<G: GameRules> {
    store: Arc<dyn SessionStore>,
    rules: Arc<G>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    room_id: String,
    self_uid: PlayerId,
    feed: SessionFeed<G>,
}

impl<G: GameRules> SessionClient<G> {
    /// Join a room: subscribe and start decoding snapshots.
    pub fn join(
        store: Arc<dyn SessionStore>,
        rules: Arc<G>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
        room_id: impl Into<String>,
        self_uid: impl Into<PlayerId>,
    ) -> Self {
        let room_id = room_id.into();
        let feed = SessionFeed::spawn(Arc::clone(&store), Arc::clone(&rules), room_id.clone());
        Self {
            store,
            rules,
            clock,
            config,
            room_id,
            self_uid: self_uid.into(),
            feed,
        }
    }

    /// Uid this client writes as.
    pub fn uid(&self) -> &PlayerId {
        &self.self_uid
    }

    /// Build the host coordinator over this client's feed. Run it only on
    /// the client recognized as host; it is nonetheless idempotent and safe
    /// to run redundantly.
    pub fn host_coordinator(&self) -> HostCoordinator<G> {
        HostCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.rules),
            Arc::clone(&self.clock),
            self.room_id.clone(),
            self.feed.watch(),
        )
    }

    /// Room this client is joined to.
    pub fn room_id(&self) -> &str {
        &self.room_id
    }

    /// Watch receiver over the latest feed state.
    pub fn watch(&self) -> watch::Receiver<FeedState<G>> {
        self.feed.watch()
    }

    /// Latest observed feed state.
    pub fn latest(&self) -> FeedState<G> {
        self.feed.latest()
    }

    /// UI projection of the latest live state, if the session is live.
    pub fn view(&self) -> Option<SessionView> {
        self.feed.latest().live().map(|state| {
            project(
                self.rules.as_ref(),
                state,
                &self.self_uid,
                self.clock.now(),
                self.config.timings.stalled_grace,
            )
        })
    }

    /// Latest live state, distinguishing the terminal session-ended signal
    /// from a not-yet-connected feed.
    fn live_state(&self) -> Result<Option<Arc<SessionState<G>>>, EngineError> {
        match self.feed.latest() {
            FeedState::Live(state) => Ok(Some(state)),
            FeedState::Ended => Err(EngineError::SessionEnded),
            FeedState::Connecting | FeedState::Corrupt(_) => Ok(None),
        }
    }

    /// Submit this round's intent (move, answer, or guess).
    ///
    /// Illegal intents — wrong phase, not this player's turn, duplicate
    /// submission, or a payload the game rejects — are silently dropped.
    pub async fn submit_intent(&self, payload: G::Intent) -> Result<SubmitOutcome, EngineError> {
        let Some(state) = self.live_state()? else {
            return Ok(SubmitOutcome::Dropped);
        };

        let legal = matches!(
            self.rules.profile(state.phase),
            PhaseProfile::Submission { .. }
        ) && self
            .rules
            .expected_submitters(&state)
            .contains(&self.self_uid)
            && !state.has_submitted(&self.self_uid)
            && self.rules.is_legal_intent(&state, &self.self_uid, &payload);

        if !legal {
            debug!(
                room_id = %self.room_id,
                uid = %self.self_uid,
                "dropping illegal intent"
            );
            return Ok(SubmitOutcome::Dropped);
        }

        let patch = codec::intent_patch(self.rules.as_ref(), &self.self_uid, &payload)?;
        self.store.update(&self.room_id, patch).await?;
        Ok(SubmitOutcome::Accepted)
    }

    /// Flip this player's readiness barrier entry for the current phase.
    pub async fn set_ready(&self) -> Result<SubmitOutcome, EngineError> {
        let Some(state) = self.live_state()? else {
            return Ok(SubmitOutcome::Dropped);
        };

        let relevant = matches!(
            self.rules.profile(state.phase),
            PhaseProfile::Rendezvous { .. }
        ) && state.is_seated(&self.self_uid)
            && !state.is_ready(&self.self_uid);

        if !relevant {
            return Ok(SubmitOutcome::Dropped);
        }

        let patch = codec::readiness_patch(self.rules.as_ref(), &self.self_uid);
        self.store.update(&self.room_id, patch).await?;
        Ok(SubmitOutcome::Accepted)
    }

    /// Vote for a rematch from the terminal phase.
    pub async fn vote_rematch(&self) -> Result<SubmitOutcome, EngineError> {
        let Some(state) = self.live_state()? else {
            return Ok(SubmitOutcome::Dropped);
        };

        let relevant = self.rules.is_terminal(state.phase)
            && state.is_seated(&self.self_uid)
            && !state.rematch_votes.get(&self.self_uid).copied().unwrap_or(false);

        if !relevant {
            return Ok(SubmitOutcome::Dropped);
        }

        let patch = codec::rematch_vote_patch(self.rules.as_ref(), &self.self_uid);
        self.store.update(&self.room_id, patch).await?;
        Ok(SubmitOutcome::Accepted)
    }
}
