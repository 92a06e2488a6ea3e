//! Shared session store client: the only network-facing interface of the
//! engine.
//!
//! The store holds one mutable document per room with last-write-wins
//! field-level merge semantics and server-assigned timestamps for ordering.
//! Everything submitted in one [`Patch`] lands together; no atomicity is
//! guaranteed across separate `update` calls.

mod error;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::{future::BoxFuture, stream::BoxStream};
use indexmap::IndexMap;
use serde_json::Value;

use crate::clock::UnixMillis;

pub use error::{StoreError, StoreResult};

/// Wire representation of one room document: untyped nested maps.
pub type Document = serde_json::Map<String, Value>;

/// One element of a room subscription stream.
#[derive(Debug, Clone, PartialEq)]
pub enum DocEvent {
    /// A merged snapshot of the room document, delivered at-least-once and in
    /// server-timestamp order.
    Snapshot(Document),
    /// The room document was deleted. Terminal: the stream ends after this.
    /// Callers must treat it as a distinct end-of-session signal, not as a
    /// transient failure.
    Deleted,
}

/// A single write applied to one field path.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldWrite {
    /// Set the field to the given value, replacing whatever was there.
    Set(Value),
    /// Set the field to the server-assigned timestamp of this update.
    ServerTimestamp,
    /// Remove the field if present.
    Delete,
}

/// A field-level merge submitted in one atomic `update` call.
///
/// Paths are dot-separated (`"grid_battle.pendingIntents.uid_a.payload"`);
/// intermediate objects are created as needed. Writing the same path twice in
/// one patch keeps the last write.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Patch {
    fields: IndexMap<String, FieldWrite>,
}

impl Patch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `path` to `value`.
    #[must_use]
    pub fn set(mut self, path: impl Into<String>, value: Value) -> Self {
        self.fields.insert(path.into(), FieldWrite::Set(value));
        self
    }

    /// Set `path` to the server timestamp assigned to this update.
    #[must_use]
    pub fn server_timestamp(mut self, path: impl Into<String>) -> Self {
        self.fields.insert(path.into(), FieldWrite::ServerTimestamp);
        self
    }

    /// Remove `path` from the document.
    #[must_use]
    pub fn delete(mut self, path: impl Into<String>) -> Self {
        self.fields.insert(path.into(), FieldWrite::Delete);
        self
    }

    /// Whether the patch carries no writes.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over the writes in insertion order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &FieldWrite)> {
        self.fields.iter().map(|(path, write)| (path.as_str(), write))
    }

    /// Merge this patch into `doc`, resolving server-timestamp sentinels to
    /// `server_ts`. This is the reference merge semantics every backend must
    /// match.
    pub fn apply_to(&self, doc: &mut Document, server_ts: UnixMillis) {
        for (path, write) in self.fields() {
            let mut segments: Vec<&str> = path.split('.').collect();
            let Some(leaf) = segments.pop() else {
                continue;
            };

            let mut current = &mut *doc;
            for segment in segments {
                current = ensure_object(current, segment);
            }

            match write {
                FieldWrite::Set(value) => {
                    current.insert(leaf.to_owned(), value.clone());
                }
                FieldWrite::ServerTimestamp => {
                    current.insert(leaf.to_owned(), Value::from(server_ts));
                }
                FieldWrite::Delete => {
                    current.remove(leaf);
                }
            }
        }
    }
}

/// Walk into `map[key]`, replacing any non-object value with a fresh map.
fn ensure_object<'a>(map: &'a mut Document, key: &str) -> &'a mut Document {
    let entry = map
        .entry(key.to_owned())
        .or_insert_with(|| Value::Object(Document::new()));
    if !entry.is_object() {
        *entry = Value::Object(Document::new());
    }
    match entry {
        Value::Object(inner) => inner,
        _ => unreachable!("entry was just replaced with an object"),
    }
}

/// Thin capability over the remote document store.
///
/// Implementations must deliver subscription snapshots at-least-once and in
/// server-timestamp order, and must guarantee that a client's own writes are
/// visible to its own next read in the order issued.
pub trait SessionStore: Send + Sync {
    /// Produce a lazy, infinite, restartable stream of document snapshots for
    /// `room_id`, terminating (not erroring) after [`DocEvent::Deleted`] once
    /// the document is gone.
    fn subscribe(&self, room_id: &str) -> BoxStream<'static, DocEvent>;

    /// Apply a field-level merge to the room document. Callers must not
    /// assume the write applied unless this returns `Ok`.
    fn update(&self, room_id: &str, patch: Patch) -> BoxFuture<'static, StoreResult<()>>;
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn apply_creates_nested_objects() {
        let mut doc = Document::new();
        Patch::new()
            .set("game.readiness.alice", json!(true))
            .apply_to(&mut doc, 7);

        assert_eq!(
            Value::Object(doc),
            json!({"game": {"readiness": {"alice": true}}})
        );
    }

    #[test]
    fn apply_resolves_server_timestamp_and_delete() {
        let mut doc = Document::new();
        Patch::new()
            .set("game.phase", json!("question"))
            .server_timestamp("game.phaseStartedAt")
            .apply_to(&mut doc, 1234);
        Patch::new()
            .delete("game.phase")
            .apply_to(&mut doc, 1300);

        assert_eq!(
            Value::Object(doc),
            json!({"game": {"phaseStartedAt": 1234}})
        );
    }

    #[test]
    fn apply_replaces_scalar_with_object_on_deeper_write() {
        let mut doc = Document::new();
        Patch::new().set("game", json!(42)).apply_to(&mut doc, 1);
        Patch::new()
            .set("game.roundIndex", json!(3))
            .apply_to(&mut doc, 2);

        assert_eq!(Value::Object(doc), json!({"game": {"roundIndex": 3}}));
    }

    #[test]
    fn last_write_wins_within_one_patch() {
        let mut doc = Document::new();
        Patch::new()
            .set("game.roundResult", json!({"kind": "old"}))
            .delete("game.roundResult")
            .apply_to(&mut doc, 1);

        assert_eq!(Value::Object(doc), json!({"game": {}}));
    }
}
