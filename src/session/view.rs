//! Client view reducer: every client, host or not, derives its UI-relevant
//! flags purely from the latest [`SessionState`] plus the local clock —
//! never from locally mutated game state.

use std::time::Duration;

use crate::{
    clock::UnixMillis,
    session::{
        model::{PlayerId, SessionState},
        rules::{GameRules, PhaseProfile},
    },
};

/// Read-only projection of the session for the render layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionView {
    /// Current round counter.
    pub round_index: u32,
    /// Whether this client is expected to submit an intent right now.
    pub my_turn: bool,
    /// Whether this client should confirm readiness to advance.
    pub should_confirm: bool,
    /// Whole seconds left on the current window or backstop, if any. Derived
    /// from the server-stamped deadline, so a client that resumes from
    /// suspension converges instead of drifting. When this reaches zero in a
    /// submission phase the UI should auto-submit its current selection as a
    /// best-effort intent, ahead of the host's deadline write.
    pub seconds_left: Option<u64>,
    /// This client already acted; the phase is waiting on someone else.
    pub awaiting_others: bool,
    /// The session reached its terminal phase.
    pub game_over: bool,
    /// Winner recorded in the terminal phase.
    pub winner_id: Option<PlayerId>,
    /// Resolution is overdue well past its deadline; the UI should offer the
    /// manual retry/leave escape hatch.
    pub stalled: bool,
}

/// Compute the view for `self_uid` at local time `now`.
pub fn project<G: GameRules>(
    rules: &G,
    state: &SessionState<G>,
    self_uid: &PlayerId,
    now: UnixMillis,
    stalled_grace: Duration,
) -> SessionView {
    let profile = rules.profile(state.phase);

    let deadline = match profile {
        PhaseProfile::Submission { window } => state.deadline_after(window),
        PhaseProfile::Rendezvous { backstop } => state.deadline_after(backstop),
        // Resolution steps carry no player-visible countdown, but they can
        // still stall if the host is gone; measure from phase entry.
        PhaseProfile::Resolution => state.phase_started_at,
        PhaseProfile::Terminal => None,
    };

    let seconds_left = deadline
        .filter(|_| !matches!(profile, PhaseProfile::Resolution))
        .map(|at| ((at - now).max(0) as u64).div_ceil(1_000));

    let my_turn = matches!(profile, PhaseProfile::Submission { .. })
        && rules
            .expected_submitters(state)
            .iter()
            .any(|uid| uid == self_uid)
        && !state.has_submitted(self_uid);

    let should_confirm = matches!(profile, PhaseProfile::Rendezvous { .. })
        && state.is_seated(self_uid)
        && !state.is_ready(self_uid);

    let awaiting_others = match profile {
        PhaseProfile::Submission { .. } => {
            state.has_submitted(self_uid) || (state.is_seated(self_uid) && !my_turn)
        }
        PhaseProfile::Rendezvous { .. } => state.is_ready(self_uid) && !state.all_ready(),
        PhaseProfile::Resolution | PhaseProfile::Terminal => false,
    };

    let stalled = deadline
        .is_some_and(|at| now > at + stalled_grace.as_millis() as UnixMillis);

    SessionView {
        round_index: state.round_index,
        my_turn,
        should_confirm,
        seconds_left,
        awaiting_others,
        game_over: rules.is_terminal(state.phase),
        winner_id: state.winner_id.clone(),
        stalled,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::{
        codec,
        config::Timings,
        games::grid_battle::{GridBattleIntent, GridBattleRules},
        session::model::Player,
        store::Patch,
    };

    use super::*;

    fn fixture() -> (GridBattleRules, crate::store::Document) {
        let rules = GridBattleRules::new(Timings::default());
        let players = vec![
            Player {
                uid: "a".into(),
                display_name: "A".into(),
                symbol: Some("X".into()),
            },
            Player {
                uid: "b".into(),
                display_name: "B".into(),
                symbol: Some("O".into()),
            },
        ];
        let doc = codec::seed_document(&rules, "r1", &players).unwrap();
        (rules, doc)
    }

    #[test]
    fn question_phase_counts_down_and_flags_my_turn() {
        let (rules, mut doc) = fixture();
        Patch::new()
            .set("grid_battle.phase", json!("question"))
            .server_timestamp("grid_battle.phaseStartedAt")
            .apply_to(&mut doc, 10_000);
        let state = codec::decode_session(&rules, &doc).unwrap();

        let view = project(&rules, &state, &"a".into(), 13_500, Duration::from_secs(12));
        assert!(view.my_turn);
        assert_eq!(view.seconds_left, Some(7));
        assert!(!view.game_over);
        assert!(!view.stalled);
    }

    #[test]
    fn submitting_hands_the_wait_to_the_others() {
        let (rules, mut doc) = fixture();
        Patch::new()
            .set("grid_battle.phase", json!("question"))
            .server_timestamp("grid_battle.phaseStartedAt")
            .apply_to(&mut doc, 10_000);
        codec::intent_patch(
            &rules,
            &"a".to_owned(),
            &GridBattleIntent::Answer {
                choice: 1,
                correct: true,
            },
        )
        .unwrap()
        .apply_to(&mut doc, 12_000);
        let state = codec::decode_session(&rules, &doc).unwrap();

        let view = project(&rules, &state, &"a".into(), 12_500, Duration::from_secs(12));
        assert!(!view.my_turn);
        assert!(view.awaiting_others);
    }

    #[test]
    fn rendezvous_asks_for_confirmation_until_ready() {
        let (rules, doc) = fixture();
        let state = codec::decode_session(&rules, &doc).unwrap();

        let view = project(&rules, &state, &"b".into(), 0, Duration::from_secs(12));
        assert!(view.should_confirm);
        assert!(!view.my_turn);
    }

    #[test]
    fn overdue_resolution_surfaces_the_stall_affordance() {
        let (rules, mut doc) = fixture();
        Patch::new()
            .set("grid_battle.phase", json!("question"))
            .server_timestamp("grid_battle.phaseStartedAt")
            .apply_to(&mut doc, 10_000);
        let state = codec::decode_session(&rules, &doc).unwrap();

        // Window 10s + grace 12s: stalled only after 32s.
        let grace = Duration::from_secs(12);
        assert!(!project(&rules, &state, &"a".into(), 30_000, grace).stalled);
        assert!(project(&rules, &state, &"a".into(), 32_500, grace).stalled);
        assert_eq!(
            project(&rules, &state, &"a".into(), 32_500, grace).seconds_left,
            Some(0)
        );
    }

    #[test]
    fn terminal_phase_reports_winner() {
        let (rules, mut doc) = fixture();
        Patch::new()
            .set("grid_battle.phase", json!("finished"))
            .set("grid_battle.winnerId", json!("a"))
            .apply_to(&mut doc, 99_000);
        let state = codec::decode_session(&rules, &doc).unwrap();

        let view = project(&rules, &state, &"b".into(), 100_000, Duration::from_secs(12));
        assert!(view.game_over);
        assert_eq!(view.winner_id.as_deref(), Some("a"));
        assert_eq!(view.seconds_left, None);
    }
}
