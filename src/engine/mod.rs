//! Reactive runtime: the subscription feed, the per-player session client,
//! and the host-only coordinator.

pub mod client;
pub mod coordinator;
pub mod feed;

pub use client::{SessionClient, SubmitOutcome};
pub use coordinator::{HostCoordinator, SessionEnd};
pub use feed::{FeedState, SessionFeed};
