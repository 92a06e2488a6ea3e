//! Session document codec: the single place where the untyped room document
//! is translated to and from the typed [`SessionState`] model.
//!
//! Decoding applies explicit defaulting rules (absent sections and fields
//! fall back to an empty initial state) so that a freshly created room and a
//! fully played one go through the same path. Encoding happens exclusively
//! through patch builders, so every engine write names exactly the fields it
//! owns and nothing else.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use serde_with::skip_serializing_none;
use thiserror::Error;

use crate::{
    clock::UnixMillis,
    session::{
        model::{IntentRecord, Player, PlayerId, SessionState},
        rules::{GameRules, PhaseProfile, Resolution, RoundAdvance},
    },
    store::{Document, Patch},
};

/// Error raised when the session document cannot be decoded or an engine
/// value cannot be encoded. Decode failures are hard errors: the engine
/// surfaces them upward instead of guessing at corrupted state.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A field in the document does not match the expected shape.
    #[error("malformed `{path}` in session document")]
    Decode {
        /// Dotted path of the offending field.
        path: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
    /// An engine-side value failed to serialize.
    #[error("failed to encode `{path}` for the session document")]
    Encode {
        /// Dotted path of the field being written.
        path: String,
        /// Underlying serde failure.
        #[source]
        source: serde_json::Error,
    },
}

/// Wire shape of one game's section inside the room document.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound = "G: GameRules")]
struct SessionSection<G: GameRules> {
    phase: Option<G::Phase>,
    phase_started_at: Option<UnixMillis>,
    #[serde(default)]
    round_index: u32,
    #[serde(default)]
    pending_intents: IndexMap<PlayerId, IntentRecord<G::Intent>>,
    #[serde(default)]
    readiness: IndexMap<PlayerId, bool>,
    round_result: Option<G::RoundResult>,
    winner_id: Option<PlayerId>,
    #[serde(default)]
    rematch_votes: IndexMap<PlayerId, bool>,
    shared: Option<G::SharedData>,
}

impl<G: GameRules> Default for SessionSection<G> {
    fn default() -> Self {
        Self {
            phase: None,
            phase_started_at: None,
            round_index: 0,
            pending_intents: IndexMap::new(),
            readiness: IndexMap::new(),
            round_result: None,
            winner_id: None,
            rematch_votes: IndexMap::new(),
            shared: None,
        }
    }
}

/// Decode the typed session state for one game out of a room document.
pub fn decode_session<G: GameRules>(
    rules: &G,
    doc: &Document,
) -> Result<SessionState<G>, CodecError> {
    let room_id = doc
        .get("roomId")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();

    let players: Vec<Player> = match doc.get("players") {
        Some(value) => serde_json::from_value(value.clone()).map_err(|source| {
            CodecError::Decode {
                path: "players".into(),
                source,
            }
        })?,
        None => Vec::new(),
    };

    let key = rules.game_key();
    let section: SessionSection<G> = match doc.get(key) {
        Some(value) => {
            serde_json::from_value(value.clone()).map_err(|source| CodecError::Decode {
                path: key.into(),
                source,
            })?
        }
        None => SessionSection::default(),
    };

    Ok(SessionState {
        room_id,
        players,
        phase: section.phase.unwrap_or_else(|| rules.initial_phase()),
        phase_started_at: section.phase_started_at,
        round_index: section.round_index,
        pending_intents: section.pending_intents,
        readiness: section.readiness,
        round_result: section.round_result,
        winner_id: section.winner_id,
        rematch_votes: section.rematch_votes,
        shared: section.shared.unwrap_or_default(),
    })
}

/// Build the initial room document for a fresh session. Room creation is an
/// app-layer concern; this helper only fixes the wire shape.
pub fn seed_document<G: GameRules>(
    rules: &G,
    room_id: &str,
    players: &[Player],
) -> Result<Document, CodecError> {
    let key = rules.game_key();
    let phase = encode(&rules.initial_phase(), &format!("{key}.phase"))?;
    let players = encode(&players, "players")?;

    let mut doc = Document::new();
    doc.insert("roomId".into(), json!(room_id));
    doc.insert("players".into(), players);
    doc.insert(key.into(), json!({ "phase": phase, "roundIndex": 0 }));
    Ok(doc)
}

/// Patch recording one player's intent for the current round. The payload and
/// its server-assigned submission stamp land together in one update.
pub fn intent_patch<G: GameRules>(
    rules: &G,
    uid: &PlayerId,
    payload: &G::Intent,
) -> Result<Patch, CodecError> {
    let key = rules.game_key();
    let path = format!("{key}.pendingIntents.{uid}.payload");
    let value = encode(payload, &path)?;
    Ok(Patch::new()
        .set(path, value)
        .server_timestamp(format!("{key}.pendingIntents.{uid}.submittedAt")))
}

/// Patch flipping one player's readiness barrier entry.
pub fn readiness_patch<G: GameRules>(rules: &G, uid: &PlayerId) -> Patch {
    Patch::new().set(format!("{}.readiness.{uid}", rules.game_key()), json!(true))
}

/// Patch recording one player's rematch vote.
pub fn rematch_vote_patch<G: GameRules>(rules: &G, uid: &PlayerId) -> Patch {
    Patch::new().set(
        format!("{}.rematchVotes.{uid}", rules.game_key()),
        json!(true),
    )
}

/// Patch committing a resolution: the phase write, the fresh phase stamp, and
/// all round bookkeeping, in one update so they land together.
///
/// Every transition stamps `phaseStartedAt` and changes `phase`, which is
/// what makes the coordinator's precondition false for redundant re-entries.
pub fn transition_patch<G: GameRules>(
    rules: &G,
    state: &SessionState<G>,
    resolution: &Resolution<G>,
) -> Result<Patch, CodecError> {
    let key = rules.game_key();
    let mut patch = Patch::new()
        .set(
            format!("{key}.phase"),
            encode(&resolution.to, &format!("{key}.phase"))?,
        )
        .server_timestamp(format!("{key}.phaseStartedAt"));

    match resolution.round {
        RoundAdvance::Keep => {
            if resolution.clear_intents {
                patch = patch.set(format!("{key}.pendingIntents"), json!({}));
            }
        }
        RoundAdvance::Next => {
            patch = patch
                .set(format!("{key}.roundIndex"), json!(state.round_index + 1))
                .set(format!("{key}.pendingIntents"), json!({}))
                .set(format!("{key}.readiness"), json!({}))
                .delete(format!("{key}.roundResult"));
        }
        RoundAdvance::Reset => {
            patch = patch
                .set(format!("{key}.roundIndex"), json!(0))
                .set(format!("{key}.pendingIntents"), json!({}))
                .set(format!("{key}.readiness"), json!({}))
                .set(format!("{key}.rematchVotes"), json!({}))
                .delete(format!("{key}.roundResult"))
                .delete(format!("{key}.winnerId"))
                .set(
                    format!("{key}.shared"),
                    encode(&G::SharedData::default(), &format!("{key}.shared"))?,
                );
        }
    }

    // A fresh barrier: entering any rendezvous phase clears stale readiness.
    if matches!(rules.profile(resolution.to), PhaseProfile::Rendezvous { .. }) {
        patch = patch.set(format!("{key}.readiness"), json!({}));
    }

    if let Some(result) = &resolution.round_result {
        let path = format!("{key}.roundResult");
        let value = encode(result, &path)?;
        patch = patch.set(path, value);
    }
    if let Some(winner) = &resolution.winner {
        patch = patch.set(format!("{key}.winnerId"), json!(winner));
    }
    if let Some(shared) = &resolution.shared {
        let path = format!("{key}.shared");
        let value = encode(shared, &path)?;
        patch = patch.set(path, value);
    }

    Ok(patch)
}

fn encode<T: Serialize>(value: &T, path: &str) -> Result<Value, CodecError> {
    serde_json::to_value(value).map_err(|source| CodecError::Encode {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        config::Timings,
        games::grid_battle::{GridBattlePhase, GridBattleRules},
        session::rules::RoundAdvance,
    };

    use super::*;

    fn rules() -> GridBattleRules {
        GridBattleRules::new(Timings::default())
    }

    fn player(uid: &str) -> Player {
        Player {
            uid: uid.into(),
            display_name: uid.to_uppercase(),
            symbol: None,
        }
    }

    #[test]
    fn decode_empty_document_defaults_to_initial_state() {
        let rules = rules();
        let state = decode_session(&rules, &Document::new()).unwrap();

        assert_eq!(state.phase, GridBattlePhase::WaitingForReady);
        assert_eq!(state.round_index, 0);
        assert!(state.players.is_empty());
        assert!(state.pending_intents.is_empty());
        assert!(state.winner_id.is_none());
        assert!(state.phase_started_at.is_none());
    }

    #[test]
    fn decode_reads_roster_and_section() {
        let rules = rules();
        let mut doc = seed_document(&rules, "r1", &[player("a"), player("b")]).unwrap();
        Patch::new()
            .set("grid_battle.phase", json!("question"))
            .server_timestamp("grid_battle.phaseStartedAt")
            .set("grid_battle.roundIndex", json!(2))
            .apply_to(&mut doc, 5_000);

        let state = decode_session(&rules, &doc).unwrap();
        assert_eq!(state.room_id, "r1");
        assert_eq!(state.players.len(), 2);
        assert_eq!(state.players[0].uid, "a");
        assert_eq!(state.phase, GridBattlePhase::Question);
        assert_eq!(state.phase_started_at, Some(5_000));
        assert_eq!(state.round_index, 2);
    }

    #[test]
    fn malformed_section_is_a_hard_error() {
        let rules = rules();
        let mut doc = Document::new();
        doc.insert("grid_battle".into(), json!({"phase": ["not", "a", "phase"]}));

        let err = decode_session(&rules, &doc).unwrap_err();
        assert!(matches!(err, CodecError::Decode { .. }));
    }

    #[test]
    fn intent_patch_round_trips_through_merge() {
        let rules = rules();
        let mut doc = seed_document(&rules, "r1", &[player("a"), player("b")]).unwrap();

        let payload = crate::games::grid_battle::GridBattleIntent::Place { row: 3, col: 4 };
        intent_patch(&rules, &"a".to_owned(), &payload)
            .unwrap()
            .apply_to(&mut doc, 42);

        let state = decode_session(&rules, &doc).unwrap();
        let record = state.intent_of("a").unwrap();
        assert_eq!(record.submitted_at, 42);
        assert_eq!(
            record.payload,
            crate::games::grid_battle::GridBattleIntent::Place { row: 3, col: 4 }
        );
    }

    #[test]
    fn transition_patch_next_round_clears_round_fields() {
        let rules = rules();
        let mut doc = seed_document(&rules, "r1", &[player("a"), player("b")]).unwrap();
        readiness_patch(&rules, &"a".to_owned()).apply_to(&mut doc, 1);
        readiness_patch(&rules, &"b".to_owned()).apply_to(&mut doc, 2);

        let state = decode_session(&rules, &doc).unwrap();
        let resolution =
            Resolution::<GridBattleRules>::to(GridBattlePhase::Question).advancing_round();
        transition_patch(&rules, &state, &resolution)
            .unwrap()
            .apply_to(&mut doc, 10);

        let next = decode_session(&rules, &doc).unwrap();
        assert_eq!(next.phase, GridBattlePhase::Question);
        assert_eq!(next.phase_started_at, Some(10));
        assert_eq!(next.round_index, 1);
        assert!(next.pending_intents.is_empty());
        assert!(next.readiness.is_empty());
        assert!(next.round_result.is_none());
    }

    #[test]
    fn transition_patch_reset_clears_everything_but_roster() {
        let rules = rules();
        let mut doc = seed_document(&rules, "r1", &[player("a"), player("b")]).unwrap();
        Patch::new()
            .set("grid_battle.phase", json!("finished"))
            .set("grid_battle.winnerId", json!("a"))
            .set("grid_battle.roundIndex", json!(6))
            .set("grid_battle.rematchVotes", json!({"a": true, "b": true}))
            .apply_to(&mut doc, 50);

        let state = decode_session(&rules, &doc).unwrap();
        let mut resolution = Resolution::<GridBattleRules>::to(GridBattlePhase::WaitingForReady);
        resolution.round = RoundAdvance::Reset;
        transition_patch(&rules, &state, &resolution)
            .unwrap()
            .apply_to(&mut doc, 60);

        let next = decode_session(&rules, &doc).unwrap();
        assert_eq!(next.phase, GridBattlePhase::WaitingForReady);
        assert_eq!(next.round_index, 0);
        assert!(next.winner_id.is_none());
        assert!(next.rematch_votes.is_empty());
        assert!(next.pending_intents.is_empty());
        assert!(next.readiness.is_empty());
        assert_eq!(next.players.len(), 2, "roster must survive a rematch reset");
    }
}
