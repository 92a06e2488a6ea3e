//! Clock sources used for deadline arithmetic and local countdowns.

use std::time::UNIX_EPOCH;

use tokio::time::Instant;

/// Milliseconds since the Unix epoch, as assigned by the store on writes.
pub type UnixMillis = i64;

/// Source of "now" for deadline computation.
///
/// Deadlines are always recomputed from scratch against this clock on every
/// tick, so a client that was suspended and resumes late converges to the
/// correct remaining time instead of drifting.
pub trait Clock: Send + Sync + 'static {
    /// Current wall-clock time in milliseconds since the Unix epoch.
    fn now(&self) -> UnixMillis;
}

/// System wall clock used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixMillis {
        UNIX_EPOCH.elapsed().map_or(0, |elapsed| elapsed.as_millis() as UnixMillis)
    }
}

/// Clock anchored to the tokio timer.
///
/// Advances in lockstep with `tokio::time`, so tests running with a paused
/// runtime see the same "now" that their sleeping timers see.
#[derive(Debug, Clone)]
pub struct SimClock {
    epoch_base: UnixMillis,
    started: Instant,
}

impl SimClock {
    /// Anchor the clock so that `now()` equals `epoch_base` at construction.
    pub fn new(epoch_base: UnixMillis) -> Self {
        Self {
            epoch_base,
            started: Instant::now(),
        }
    }
}

impl Clock for SimClock {
    fn now(&self) -> UnixMillis {
        self.epoch_base + self.started.elapsed().as_millis() as UnixMillis
    }
}
