//! Subscription feed: one task per client that turns the raw document stream
//! into a level-triggered watch of decoded session state.
//!
//! Subscription callbacks and timer ticks are consumed from a single logical
//! task, so the engine never observes interleaved partial reads of the
//! session state.

use std::sync::Arc;

use futures::StreamExt;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use crate::{
    codec::{self, CodecError},
    session::{model::SessionState, rules::GameRules},
    store::{DocEvent, SessionStore},
};

/// Latest knowledge about the session document.
#[derive(Debug, Clone)]
pub enum FeedState<G: GameRules> {
    /// No snapshot observed yet.
    Connecting,
    /// Latest merged snapshot.
    Live(Arc<SessionState<G>>),
    /// The room document was deleted; the session is over. Terminal.
    Ended,
    /// The document stopped decoding; unrecoverable without a manual
    /// retry/leave from the UI layer. Terminal.
    Corrupt(Arc<CodecError>),
}

impl<G: GameRules> FeedState<G> {
    /// Latest live state, if any.
    pub fn live(&self) -> Option<&Arc<SessionState<G>>> {
        match self {
            FeedState::Live(state) => Some(state),
            _ => None,
        }
    }

    /// Whether the feed reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, FeedState::Ended | FeedState::Corrupt(_))
    }
}

/// Handle to the background decode task. Dropping the feed aborts the task,
/// which is how a session teardown unsubscribes.
pub struct SessionFeed<G: GameRules> {
    rx: watch::Receiver<FeedState<G>>,
    task: JoinHandle<()>,
}

impl<G: GameRules> SessionFeed<G> {
    /// Subscribe to `room_id` and start decoding snapshots into a watch
    /// channel.
    pub fn spawn(store: Arc<dyn SessionStore>, rules: Arc<G>, room_id: String) -> Self {
        let (tx, rx) = watch::channel(FeedState::Connecting);

        let task = tokio::spawn(async move {
            let mut stream = store.subscribe(&room_id);
            while let Some(event) = stream.next().await {
                match event {
                    DocEvent::Snapshot(doc) => {
                        match codec::decode_session(rules.as_ref(), &doc) {
                            Ok(state) => {
                                tx.send_replace(FeedState::Live(Arc::new(state)));
                            }
                            Err(err) => {
                                warn!(%room_id, error = %err, "session document failed to decode");
                                tx.send_replace(FeedState::Corrupt(Arc::new(err)));
                                return;
                            }
                        }
                    }
                    DocEvent::Deleted => {
                        debug!(%room_id, "room document deleted; session ended");
                        tx.send_replace(FeedState::Ended);
                        return;
                    }
                }
            }
            // A backend that closes the stream without a tombstone is treated
            // the same as a deletion: the session is over for this client.
            tx.send_replace(FeedState::Ended);
        });

        Self { rx, task }
    }

    /// Watch receiver over the latest feed state.
    pub fn watch(&self) -> watch::Receiver<FeedState<G>> {
        self.rx.clone()
    }

    /// Latest observed state.
    pub fn latest(&self) -> FeedState<G> {
        self.rx.borrow().clone()
    }
}

impl<G: GameRules> Drop for SessionFeed<G> {
    fn drop(&mut self) {
        self.task.abort();
    }
}
