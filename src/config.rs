//! Engine configuration: per-phase windows, barrier backstops, and the
//! user-facing stall grace period.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/roomsync.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "ROOMSYNC_CONFIG_PATH";

/// Durations driving the phase machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timings {
    /// Submission window for quiz question phases.
    pub question_window: Duration,
    /// Submission window for a single board move.
    pub move_window: Duration,
    /// Submission window for map/year guessing phases.
    pub guess_window: Duration,
    /// Backstop deadline for readiness barriers, so one disconnected player
    /// cannot permanently stall the group.
    pub rendezvous_backstop: Duration,
    /// Extra grace beyond the expected resolution time before the UI surfaces
    /// the "still waiting, the other player may have a problem" affordance.
    pub stalled_grace: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        Self {
            question_window: Duration::from_secs(10),
            move_window: Duration::from_secs(15),
            guess_window: Duration::from_secs(30),
            rendezvous_backstop: Duration::from_secs(20),
            stalled_grace: Duration::from_secs(12),
        }
    }
}

/// Immutable runtime configuration shared across the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    /// Phase machine durations.
    pub timings: Timings,
}

impl EngineConfig {
    /// Load the configuration from disk, falling back to built-in defaults
    /// when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded engine timings from config");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

/// JSON representation of the configuration file. Every field is optional;
/// absent fields keep their defaults.
#[derive(Debug, Deserialize)]
struct RawConfig {
    question_window_ms: Option<u64>,
    move_window_ms: Option<u64>,
    guess_window_ms: Option<u64>,
    rendezvous_backstop_ms: Option<u64>,
    stalled_grace_ms: Option<u64>,
}

impl From<RawConfig> for EngineConfig {
    fn from(raw: RawConfig) -> Self {
        let defaults = Timings::default();
        let millis =
            |field: Option<u64>, fallback: Duration| field.map_or(fallback, Duration::from_millis);
        Self {
            timings: Timings {
                question_window: millis(raw.question_window_ms, defaults.question_window),
                move_window: millis(raw.move_window_ms, defaults.move_window),
                guess_window: millis(raw.guess_window_ms, defaults.guess_window),
                rendezvous_backstop: millis(
                    raw.rendezvous_backstop_ms,
                    defaults.rendezvous_backstop,
                ),
                stalled_grace: millis(raw.stalled_grace_ms, defaults.stalled_grace),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into
/// account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
