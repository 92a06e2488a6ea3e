use std::sync::Arc;

use async_stream::stream;
use futures::{future::BoxFuture, stream::BoxStream};
use mongodb::{
    Client, Collection, Database,
    bson::{
        Bson, Document as BsonDocument, doc, serialize_to_bson as to_bson,
        serialize_to_document as to_document,
    },
};
use serde_json::Value;
use tokio::{
    sync::RwLock,
    time::{MissedTickBehavior, interval},
};
use tracing::warn;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoResult, MongoStoreError},
};
use crate::store::{DocEvent, Document, FieldWrite, Patch, SessionStore, StoreError, StoreResult};

const ROOM_COLLECTION_NAME: &str = "rooms";

/// Session store backed by a MongoDB room collection.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoSessionStore {
    /// Establish a connection and verify it with a ping.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        Ok(Self {
            inner: Arc::new(MongoInner {
                state: RwLock::new(MongoState { client, database }),
                config,
            }),
        })
    }

    /// Verify the connection is alive.
    pub async fn ping(&self) -> MongoResult<()> {
        let database = self.database().await;
        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoStoreError::HealthPing { source })?;
        Ok(())
    }

    /// Re-establish the connection after a health failure.
    pub async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) = establish_connection(
            &self.inner.config.options,
            &self.inner.config.database_name,
        )
        .await?;
        let mut guard = self.inner.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }

    /// Seed a room document. Room lifecycle belongs to the app layer.
    pub async fn create_room(&self, room_id: &str, doc: Document) -> MongoResult<()> {
        let mut bson_doc =
            to_document(&doc).map_err(|source| MongoStoreError::Encode {
                path: "<root>".into(),
                source,
            })?;
        bson_doc.insert("_id", room_id);

        self.collection()
            .await
            .replace_one(doc! { "_id": room_id }, &bson_doc)
            .upsert(true)
            .await
            .map_err(|source| MongoStoreError::Update {
                room_id: room_id.to_owned(),
                source,
            })?;
        Ok(())
    }

    /// Delete a room document; subscribers observe the deletion on their
    /// next poll. Returns whether the room existed.
    pub async fn delete_room(&self, room_id: &str) -> MongoResult<bool> {
        let result = self
            .collection()
            .await
            .delete_one(doc! { "_id": room_id })
            .await
            .map_err(|source| MongoStoreError::Update {
                room_id: room_id.to_owned(),
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn collection(&self) -> Collection<BsonDocument> {
        let guard = self.inner.state.read().await;
        guard
            .database
            .collection::<BsonDocument>(ROOM_COLLECTION_NAME)
    }

    async fn fetch_room(&self, room_id: &str) -> MongoResult<Option<BsonDocument>> {
        self.collection()
            .await
            .find_one(doc! { "_id": room_id })
            .await
            .map_err(|source| MongoStoreError::Fetch {
                room_id: room_id.to_owned(),
                source,
            })
    }
}

impl SessionStore for MongoSessionStore {
    fn subscribe(&self, room_id: &str) -> BoxStream<'static, DocEvent> {
        let store = self.clone();
        let room_id = room_id.to_owned();

        Box::pin(stream! {
            let mut ticker = interval(store.inner.config.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last: Option<Document> = None;

            loop {
                ticker.tick().await;
                match store.fetch_room(&room_id).await {
                    Ok(Some(bson_doc)) => {
                        let wire = bson_doc_to_wire(bson_doc);
                        if last.as_ref() != Some(&wire) {
                            last = Some(wire.clone());
                            yield DocEvent::Snapshot(wire);
                        }
                    }
                    Ok(None) => {
                        yield DocEvent::Deleted;
                        return;
                    }
                    Err(err) => {
                        // Transient read failure: keep polling; subscribers
                        // only ever see merged snapshots or the tombstone.
                        warn!(%room_id, error = %err, "room poll failed; retrying");
                    }
                }
            }
        })
    }

    fn update(&self, room_id: &str, patch: Patch) -> BoxFuture<'static, StoreResult<()>> {
        let store = self.clone();
        let room_id = room_id.to_owned();

        Box::pin(async move {
            let mut set_doc = BsonDocument::new();
            let mut unset_doc = BsonDocument::new();
            let mut current_date = BsonDocument::new();

            for (path, write) in patch.fields() {
                match write {
                    FieldWrite::Set(value) => {
                        let encoded =
                            to_bson(value).map_err(|source| MongoStoreError::Encode {
                                path: path.to_owned(),
                                source,
                            })?;
                        set_doc.insert(path, encoded);
                    }
                    FieldWrite::ServerTimestamp => {
                        current_date.insert(path, true);
                    }
                    FieldWrite::Delete => {
                        unset_doc.insert(path, "");
                    }
                }
            }

            let mut update = BsonDocument::new();
            if !set_doc.is_empty() {
                update.insert("$set", set_doc);
            }
            if !unset_doc.is_empty() {
                update.insert("$unset", unset_doc);
            }
            if !current_date.is_empty() {
                update.insert("$currentDate", current_date);
            }
            if update.is_empty() {
                return Ok(());
            }

            let result = store
                .collection()
                .await
                .update_one(doc! { "_id": &room_id }, update)
                .await
                .map_err(|source| MongoStoreError::Update {
                    room_id: room_id.clone(),
                    source,
                })?;

            if result.matched_count == 0 {
                return Err(StoreError::MissingRoom { room_id });
            }
            Ok(())
        })
    }
}

/// Convert a stored BSON room document into the wire representation,
/// flattening BSON dates (from `$currentDate`) into epoch milliseconds.
fn bson_doc_to_wire(mut doc: BsonDocument) -> Document {
    doc.remove("_id");
    doc.into_iter()
        .map(|(key, value)| (key, bson_to_value(value)))
        .collect()
}

fn bson_to_value(bson: Bson) -> Value {
    match bson {
        Bson::Double(v) => Value::from(v),
        Bson::String(v) => Value::String(v),
        Bson::Array(items) => Value::Array(items.into_iter().map(bson_to_value).collect()),
        Bson::Document(doc) => Value::Object(
            doc.into_iter()
                .map(|(key, value)| (key, bson_to_value(value)))
                .collect(),
        ),
        Bson::Boolean(v) => Value::Bool(v),
        Bson::Int32(v) => Value::from(v),
        Bson::Int64(v) => Value::from(v),
        Bson::DateTime(dt) => Value::from(dt.timestamp_millis()),
        // Session documents only ever contain the JSON-compatible types
        // above plus dates; anything else decodes as absent.
        _ => Value::Null,
    }
}
