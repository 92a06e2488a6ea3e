//! Local two-client simulation: plays a full grid-battle match over the
//! in-process store, host coordinator included. Useful for eyeballing the
//! phase flow with `RUST_LOG=debug`.

use std::{sync::Arc, time::Duration};

use anyhow::Context;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use roomsync::{
    clock::SystemClock,
    codec::seed_document,
    config::{EngineConfig, Timings},
    engine::client::SessionClient,
    engine::feed::FeedState,
    games::grid_battle::{GridBattleIntent, GridBattlePhase, GridBattleRules},
    session::model::Player,
    store::memory::MemoryStore,
};

/// Scripted placements: Ada builds a row, Bix scatters.
const ADA_MOVES: [(u32, u32); 4] = [(5, 5), (5, 6), (5, 7), (5, 8)];
const BIX_MOVES: [(u32, u32); 4] = [(0, 0), (1, 0), (2, 0), (3, 0)];

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let timings = Timings {
        question_window: Duration::from_secs(2),
        move_window: Duration::from_secs(2),
        guess_window: Duration::from_secs(2),
        rendezvous_backstop: Duration::from_secs(2),
        stalled_grace: Duration::from_secs(5),
    };
    let config = EngineConfig {
        timings: timings.clone(),
    };
    let rules = Arc::new(GridBattleRules::new(timings));
    let clock = Arc::new(SystemClock);
    let store = MemoryStore::new(clock.clone());

    let room_id = uuid::Uuid::new_v4().to_string();
    let roster = vec![
        Player {
            uid: "ada".into(),
            display_name: "Ada".into(),
            symbol: Some("X".into()),
        },
        Player {
            uid: "bix".into(),
            display_name: "Bix".into(),
            symbol: Some("O".into()),
        },
    ];
    store.create_room(
        room_id.clone(),
        seed_document(rules.as_ref(), &room_id, &roster).context("seeding room")?,
    );
    info!(%room_id, "room created");

    let shared: Arc<dyn roomsync::store::SessionStore> = Arc::new(store.clone());
    let ada = SessionClient::join(
        Arc::clone(&shared),
        Arc::clone(&rules),
        clock.clone(),
        config.clone(),
        room_id.clone(),
        "ada",
    );
    let bix = SessionClient::join(
        Arc::clone(&shared),
        Arc::clone(&rules),
        clock.clone(),
        config,
        room_id.clone(),
        "bix",
    );

    // Ada is the host: her client also runs the coordinator.
    let host = ada.host_coordinator().spawn();

    let ada_task = tokio::spawn(run_player(ada, ADA_MOVES, true));
    let bix_task = tokio::spawn(run_player(bix, BIX_MOVES, false));

    let winner = ada_task.await.context("ada task")?;
    bix_task.await.context("bix task")?;
    info!(winner = winner.as_deref().unwrap_or("nobody"), "match over");

    store.delete_room(&room_id);
    let end = host.await.context("host task")?;
    info!(?end, "host coordinator stopped");
    Ok(())
}

/// Reactive player loop: ready up in barriers, answer questions, and place
/// scripted moves whenever the view says it is our turn.
async fn run_player(
    client: SessionClient<GridBattleRules>,
    moves: [(u32, u32); 4],
    answers_correctly: bool,
) -> Option<String> {
    let mut rx = client.watch();
    let mut next_move = 0usize;

    loop {
        let snapshot = rx.borrow_and_update().clone();
        let state = match snapshot {
            FeedState::Live(state) => state,
            FeedState::Connecting => {
                if rx.changed().await.is_err() {
                    return None;
                }
                continue;
            }
            FeedState::Ended | FeedState::Corrupt(_) => return None,
        };

        let Some(view) = client.view() else {
            if rx.changed().await.is_err() {
                return None;
            }
            continue;
        };
        if view.game_over {
            info!(
                uid = %client.uid(),
                winner = view.winner_id.as_deref().unwrap_or("nobody"),
                "game over"
            );
            return view.winner_id;
        }

        if view.should_confirm {
            let _ = client.set_ready().await;
        } else if view.my_turn {
            match state.phase {
                GridBattlePhase::Question => {
                    let _ = client
                        .submit_intent(GridBattleIntent::Answer {
                            choice: 0,
                            correct: answers_correctly,
                        })
                        .await;
                }
                GridBattlePhase::MoveOne | GridBattlePhase::MoveTwo => {
                    if let Some(&(row, col)) = moves.get(next_move) {
                        let _ = client
                            .submit_intent(GridBattleIntent::Place { row, col })
                            .await;
                        next_move += 1;
                    }
                }
                _ => {}
            }
        }

        if rx.changed().await.is_err() {
            return None;
        }
    }
}

/// Configure tracing subscribers so phase transitions are visible.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,roomsync=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
