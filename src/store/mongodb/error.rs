use thiserror::Error;

/// Result alias for the MongoDB store.
pub type MongoResult<T> = Result<T, MongoStoreError>;

/// Failures specific to the MongoDB backend.
#[derive(Debug, Error)]
pub enum MongoStoreError {
    /// The connection string did not parse.
    #[error("invalid MongoDB uri `{uri}`")]
    InvalidUri {
        /// Offending connection string.
        uri: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A required environment variable is missing.
    #[error("missing environment variable `{var}`")]
    MissingEnvVar {
        /// Name of the variable.
        var: &'static str,
    },
    /// The client could not be constructed.
    #[error("failed to construct MongoDB client")]
    ClientConstruction {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// The initial ping never succeeded.
    #[error("MongoDB unreachable after {attempts} attempts")]
    InitialPing {
        /// Number of attempts made.
        attempts: u32,
        /// Last driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A room document read failed.
    #[error("failed to load room `{room_id}`")]
    Fetch {
        /// Targeted room.
        room_id: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A room document write failed.
    #[error("failed to update room `{room_id}`")]
    Update {
        /// Targeted room.
        room_id: String,
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
    /// A patch value did not serialize to BSON.
    #[error("failed to encode `{path}` as BSON")]
    Encode {
        /// Field path being written.
        path: String,
        /// Serializer error.
        #[source]
        source: mongodb::bson::error::Error,
    },
    /// The health ping failed.
    #[error("MongoDB health ping failed")]
    HealthPing {
        /// Driver error.
        #[source]
        source: mongodb::error::Error,
    },
}
