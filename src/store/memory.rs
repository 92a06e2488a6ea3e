//! In-process session store used by tests, the simulation harness, and
//! embedded deployments.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use async_stream::stream;
use dashmap::DashMap;
use futures::{future::BoxFuture, stream::BoxStream};
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    clock::{Clock, UnixMillis},
    store::{DocEvent, Document, Patch, SessionStore, StoreError, StoreResult},
};

const ROOM_CHANNEL_CAPACITY: usize = 32;

/// Shared in-memory store with broadcast fan-out per room.
///
/// Server timestamps come from the injected [`Clock`] and are forced strictly
/// monotonic, so two writes landing within the same millisecond still have a
/// total order.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    rooms: DashMap<String, RoomSlot>,
    clock: Arc<dyn Clock>,
    last_ts: AtomicI64,
}

struct RoomSlot {
    doc: Document,
    tx: broadcast::Sender<DocEvent>,
}

impl MemoryStore {
    /// Build an empty store drawing server timestamps from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                rooms: DashMap::new(),
                clock,
                last_ts: AtomicI64::new(0),
            }),
        }
    }

    /// Seed a room document. Room lifecycle belongs to the app layer; the
    /// engine itself only ever transitions existing documents.
    pub fn create_room(&self, room_id: impl Into<String>, doc: Document) {
        let (tx, _rx) = broadcast::channel(ROOM_CHANNEL_CAPACITY);
        self.inner.rooms.insert(room_id.into(), RoomSlot { doc, tx });
    }

    /// Delete a room document, signalling every subscriber that the session
    /// ended. Returns whether the room existed.
    pub fn delete_room(&self, room_id: &str) -> bool {
        match self.inner.rooms.remove(room_id) {
            Some((_, slot)) => {
                let _ = slot.tx.send(DocEvent::Deleted);
                true
            }
            None => false,
        }
    }

    /// Current document for a room, if it exists. Test/diagnostic helper.
    pub fn room_snapshot(&self, room_id: &str) -> Option<Document> {
        self.inner.rooms.get(room_id).map(|slot| slot.doc.clone())
    }

    /// Next server timestamp: the clock value, bumped past the previous
    /// assignment when the clock has not advanced since the last write.
    fn next_server_ts(&self) -> UnixMillis {
        let now = self.inner.clock.now();
        loop {
            let prev = self.inner.last_ts.load(Ordering::SeqCst);
            let candidate = now.max(prev + 1);
            if self
                .inner
                .last_ts
                .compare_exchange(prev, candidate, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return candidate;
            }
        }
    }
}

impl SessionStore for MemoryStore {
    fn subscribe(&self, room_id: &str) -> BoxStream<'static, DocEvent> {
        let store = self.clone();
        let room_id = room_id.to_owned();

        Box::pin(stream! {
            // Initial snapshot plus a receiver registered under the same
            // lookup, so no update between the two can be missed.
            let subscription = store.inner.rooms.get(&room_id).map(|slot| {
                (slot.doc.clone(), slot.tx.subscribe())
            });

            let Some((initial, mut rx)) = subscription else {
                yield DocEvent::Deleted;
                return;
            };
            yield DocEvent::Snapshot(initial);

            loop {
                match rx.recv().await {
                    Ok(DocEvent::Snapshot(doc)) => yield DocEvent::Snapshot(doc),
                    Ok(DocEvent::Deleted) => {
                        yield DocEvent::Deleted;
                        return;
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // At-least-once: a lagged subscriber re-syncs from the
                        // latest merged snapshot instead of erroring.
                        debug!(%room_id, skipped, "subscriber lagged; re-syncing");
                        match store.inner.rooms.get(&room_id) {
                            Some(slot) => {
                                let doc = slot.doc.clone();
                                drop(slot);
                                yield DocEvent::Snapshot(doc);
                            }
                            None => {
                                yield DocEvent::Deleted;
                                return;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        yield DocEvent::Deleted;
                        return;
                    }
                }
            }
        })
    }

    fn update(&self, room_id: &str, patch: Patch) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let room_id = room_id.to_owned();

        Box::pin(async move {
            let server_ts = store.next_server_ts();
            let Some(mut slot) = store.inner.rooms.get_mut(&room_id) else {
                return Err(StoreError::MissingRoom { room_id });
            };

            patch.apply_to(&mut slot.doc, server_ts);
            let merged = slot.doc.clone();
            // Broadcast while holding the entry so snapshots go out in the
            // same order the merges applied.
            let _ = slot.tx.send(DocEvent::Snapshot(merged));
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::json;

    use crate::clock::SimClock;

    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(Arc::new(SimClock::new(1_000)))
    }

    fn doc(value: serde_json::Value) -> Document {
        match value {
            serde_json::Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[tokio::test]
    async fn subscribe_yields_initial_snapshot_then_updates() {
        let store = store();
        store.create_room("r1", doc(json!({"roomId": "r1"})));

        let mut stream = store.subscribe("r1");
        let first = stream.next().await;
        assert_eq!(first, Some(DocEvent::Snapshot(doc(json!({"roomId": "r1"})))));

        store
            .update("r1", Patch::new().set("game.roundIndex", json!(1)))
            .await
            .unwrap();

        match stream.next().await {
            Some(DocEvent::Snapshot(merged)) => {
                assert_eq!(merged["game"]["roundIndex"], json!(1));
                assert_eq!(merged["roomId"], json!("r1"));
            }
            other => panic!("expected merged snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn subscribe_to_missing_room_terminates_immediately() {
        let store = store();
        let mut stream = store.subscribe("ghost");
        assert_eq!(stream.next().await, Some(DocEvent::Deleted));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn delete_room_terminates_subscribers() {
        let store = store();
        store.create_room("r1", Document::new());

        let mut stream = store.subscribe("r1");
        let _ = stream.next().await;

        assert!(store.delete_room("r1"));
        assert_eq!(stream.next().await, Some(DocEvent::Deleted));
        assert_eq!(stream.next().await, None);
    }

    #[tokio::test]
    async fn update_on_missing_room_fails() {
        let store = store();
        let err = store
            .update("ghost", Patch::new().set("x", json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::MissingRoom { .. }));
    }

    #[tokio::test]
    async fn server_timestamps_are_strictly_monotonic() {
        let store = store();
        store.create_room("r1", Document::new());

        for _ in 0..5 {
            store
                .update("r1", Patch::new().server_timestamp("stamp"))
                .await
                .unwrap();
        }

        // All five writes landed in the same paused-time millisecond; the
        // store must still have assigned increasing stamps.
        let a = store.next_server_ts();
        let b = store.next_server_ts();
        assert!(b > a);
    }
}
