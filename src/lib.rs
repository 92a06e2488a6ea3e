//! roomsync: host-authoritative session synchronization for turn-based
//! mini-games whose only communication channel is a shared, eventually
//! consistent room document.
//!
//! Clients write intents (moves, answers, guesses) and readiness flags into
//! the shared document; the store fans the merged document out to every
//! subscriber; the one client elected host turns intents into phase
//! advancement; and every client re-derives its view from the latest
//! document. There is no game server and no lock — idempotent,
//! precondition-guarded writes are the whole concurrency story.

pub mod clock;
pub mod codec;
pub mod config;
pub mod engine;
mod error;
pub mod games;
pub mod resolve;
pub mod session;
pub mod store;

pub use error::EngineError;
