use std::time::Duration;

use mongodb::options::ClientOptions;

use super::error::{MongoResult, MongoStoreError};

const DEFAULT_DB: &str = "roomsync";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(400);

/// Connection settings for the MongoDB-backed store.
#[derive(Clone)]
pub struct MongoConfig {
    /// Parsed client options.
    pub options: ClientOptions,
    /// Database holding the room collection.
    pub database_name: String,
    /// How often subscriptions poll the room document for changes.
    pub poll_interval: Duration,
}

impl MongoConfig {
    /// Build a configuration from a connection string.
    pub async fn from_uri(uri: &str, db_name: Option<&str>) -> MongoResult<Self> {
        let database_name = db_name.unwrap_or(DEFAULT_DB).to_owned();
        let options = ClientOptions::parse(uri)
            .await
            .map_err(|source| MongoStoreError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        Ok(Self {
            options,
            database_name,
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Build a configuration from `MONGO_URI` / `MONGO_DB`.
    pub async fn from_env() -> MongoResult<Self> {
        let uri = std::env::var("MONGO_URI")
            .map_err(|_| MongoStoreError::MissingEnvVar { var: "MONGO_URI" })?;
        let db = std::env::var("MONGO_DB").ok();
        Self::from_uri(&uri, db.as_deref()).await
    }

    /// Override the subscription poll interval.
    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}
