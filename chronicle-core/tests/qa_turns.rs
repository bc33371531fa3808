//! QA tests for turn resolution using the in-memory harness.
//!
//! These tests verify the turn pipeline end to end:
//! - Session creation and the initial game state
//! - Structured trailer extraction and the dice trust boundary
//! - Append-only narrative and turn-number monotonicity
//! - Best-effort enrichment (memory, web canon) never failing a turn
//!
//! Run with: `cargo test -p chronicle-core --test qa_turns`

use chronicle_core::canon::CanonSnippet;
use chronicle_core::dice::{roll_stat_check, DiceError};
use chronicle_core::memory::ChapterMemory;
use chronicle_core::model::ModelError;
use chronicle_core::store::{SessionKey, SessionRecord, SessionRepository};
use chronicle_core::testing::{
    assert_narrative_extends, assert_stat_check_consistent, with_trailer, FailingCanon,
    FailingEmbedder, FailingSessionRepository, ScriptedModel, StaticCanon, TestHarness,
};
use chronicle_core::{
    CampaignCatalog, EngineConfig, InMemorySessionRepository, InMemoryVectorIndex, NarrativeKind,
    SessionStore, StoreError, TurnEngine, TurnError, TurnRequest,
};
use futures::future::join_all;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

async fn session_seed(harness: &TestHarness) -> u32 {
    harness
        .sessions
        .find(&SessionKey::new("t1", "u1"))
        .await
        .unwrap()
        .expect("session exists")
        .rng_seed
}

// =============================================================================
// END-TO-END SCENARIO
// =============================================================================

#[tokio::test]
async fn test_new_session_initial_state() {
    let store = SessionStore::new(
        Arc::new(chronicle_core::InMemorySessionRepository::new()),
        Arc::new(CampaignCatalog::builtin()),
    );
    let (handle, state) = store
        .get_or_create("t1", "u1", "baldurs-gate-3", "Tav")
        .await
        .unwrap();

    assert_eq!(handle.last_turn_number, 0);
    assert_eq!(state.current_location, "nautiloid");
    assert_eq!(state.stats["strength"], 10);
    assert_eq!(state.stats.len(), 6);
    assert_eq!(state.narrative.len(), 1);
    assert_eq!(state.narrative[0].kind, NarrativeKind::Narration);
}

#[tokio::test]
async fn test_search_the_wreckage() {
    let harness = TestHarness::new();
    let reply = with_trailer(
        "Twisted metal and ichor surround you.",
        json!({"statCheck": {"stat": "Perception", "difficulty": 12}}),
    );

    let response = harness
        .turn_with_reply("I search the wreckage", &reply)
        .await
        .unwrap();

    assert_eq!(response.turn_number, 1);
    assert_eq!(response.game_state.narrative.len(), 3);
    assert_eq!(harness.last_turn_number().await, Some(1));

    let seed = session_seed(&harness).await;
    let sc = response.output.stat_check.clone().expect("stat check resolved");
    assert_eq!(sc.stat, "Perception");
    assert_eq!(sc.difficulty, 12);
    assert_eq!(sc.result, roll_stat_check(seed, 1, "Perception", 12));
    assert_stat_check_consistent(&response);

    let stored = harness.game_state().await.unwrap();
    assert_eq!(stored, response.game_state);
    assert_eq!(stored.narrative[1].content, "Player: I search the wreckage");
    assert_eq!(stored.narrative[1].kind, NarrativeKind::Choice);
    assert_eq!(stored.narrative[2].content, "Twisted metal and ichor surround you.");
    assert_eq!(stored.narrative[2].kind, NarrativeKind::Narration);
    assert_eq!(stored.choices, vec!["I search the wreckage"]);

    let turns = harness.engine.turns("t1", "u1").await.unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].stat_check, Some(sc));
}

#[tokio::test]
async fn test_trailer_choices_round_trip() {
    let harness = TestHarness::new();
    let reply = with_trailer(
        "The grove is tense.",
        json!({
            "choices": ["Help the druids", "Join the goblins"],
            "statCheck": {"stat": "Perception", "difficulty": 12}
        }),
    );

    let response = harness.turn_with_reply("look around", &reply).await.unwrap();

    assert_eq!(
        response.output.choices,
        Some(vec!["Help the druids".to_string(), "Join the goblins".to_string()])
    );
    assert_eq!(response.output.narration, "The grove is tense.");
    assert!(!response.game_state.narrative[2].content.contains("engine-struct"));
}

#[tokio::test]
async fn test_heuristics_without_trailer() {
    let harness = TestHarness::new();
    let reply = "Drums echo in the dark.\n\n1. Fight\n2. Flee\n\nMake a Wisdom check (DC 14).";

    let response = harness.turn_with_reply("listen", reply).await.unwrap();

    assert_eq!(
        response.output.choices,
        Some(vec!["Fight".to_string(), "Flee".to_string()])
    );
    let sc = response.output.stat_check.clone().unwrap();
    assert_eq!((sc.stat.as_str(), sc.difficulty), ("Wisdom", 14));
    assert!(!response.output.narration.contains("DC 14"));
    assert_eq!(response.output.narration, "Drums echo in the dark.");
    assert!(response.output.combat.is_none());
}

// =============================================================================
// TRUST BOUNDARY
// =============================================================================

#[tokio::test]
async fn test_model_asserted_roll_is_discarded() {
    let harness = TestHarness::new();
    let reply = with_trailer(
        "You strain against the door.",
        json!({"statCheck": {"stat": "X", "difficulty": 10, "result": 20, "success": true}}),
    );

    let response = harness.turn_with_reply("force the door", &reply).await.unwrap();
    let seed = session_seed(&harness).await;
    let expected = roll_stat_check(seed, 1, "X", 10);

    let sc = response.output.stat_check.clone().unwrap();
    assert_eq!(sc.result, expected);
    assert_eq!(sc.success, i32::from(expected) >= 10);
}

#[tokio::test]
async fn test_rolls_follow_turn_number() {
    let harness = TestHarness::new();
    let reply = || {
        with_trailer(
            "Again.",
            json!({"statCheck": {"stat": "Dexterity", "difficulty": 11}}),
        )
    };

    let mut results = Vec::new();
    for _ in 0..3 {
        let response = harness.turn_with_reply("dodge", &reply()).await.unwrap();
        results.push((response.turn_number, response.output.stat_check.unwrap().result));
    }

    let seed = session_seed(&harness).await;
    for (turn, result) in results {
        assert_eq!(result, roll_stat_check(seed, turn, "Dexterity", 11));
    }
}

#[tokio::test]
async fn test_unknown_rng_version_fails_before_model_call() {
    let harness = TestHarness::new();
    let state = CampaignCatalog::builtin()
        .create_initial_game_state("baldurs-gate-3", "Tav")
        .unwrap();
    let now = chrono::Utc::now();
    harness
        .sessions
        .insert_if_absent(SessionRecord {
            key: SessionKey::new("t1", "u1"),
            id: "legacy".into(),
            campaign_id: "baldurs-gate-3".into(),
            player_name: "Tav".into(),
            rng_seed: 7,
            rng_version: 99,
            last_turn_number: 0,
            game_state: state,
            created_at: now,
            updated_at: now,
        })
        .await
        .unwrap();

    let err = harness.turn("anything").await.unwrap_err();
    assert!(matches!(err, TurnError::Dice(DiceError::UnknownVersion(99))));
    assert_eq!(harness.model.call_count(), 0);
}

// =============================================================================
// NARRATIVE AND TURN COUNTER
// =============================================================================

#[tokio::test]
async fn test_narrative_is_append_only() {
    let harness = TestHarness::new();
    harness.turn_with_reply("begin", "It begins.").await.unwrap();
    let mut previous = harness.game_state().await.unwrap();

    for i in 0..5 {
        let response = harness
            .turn_with_reply(&format!("step {i}"), &format!("Step {i} happens."))
            .await
            .unwrap();
        assert_narrative_extends(&previous, &response.game_state, 2);
        previous = response.game_state;
    }

    assert_eq!(previous.narrative.len(), 1 + 2 * 6);
    assert_eq!(harness.last_turn_number().await, Some(6));
}

#[tokio::test]
async fn test_concurrent_turns_are_serialized() {
    let harness = TestHarness::with_model(
        ScriptedModel::default().with_delay(Duration::from_millis(5)),
        |engine| engine,
    );

    let requests = (0..20).map(|i| harness.engine.play_turn(harness.request(&format!("act {i}"))));
    let responses = join_all(requests).await;

    let numbers: BTreeSet<u64> = responses
        .into_iter()
        .map(|r| r.expect("turn succeeds").turn_number)
        .collect();
    assert_eq!(numbers, (1..=20).collect::<BTreeSet<u64>>());
    assert_eq!(harness.last_turn_number().await, Some(20));

    let turns = harness.engine.turns("t1", "u1").await.unwrap();
    let persisted: Vec<u64> = turns.iter().map(|t| t.turn_number).collect();
    assert_eq!(persisted, (1..=20).collect::<Vec<u64>>());
    assert_eq!(harness.game_state().await.unwrap().narrative.len(), 41);
}

#[tokio::test]
async fn test_sessions_are_independent() {
    let harness = TestHarness::new();
    let a = harness.engine.play_turn(harness.request("a"));
    let b = harness
        .engine
        .play_turn(chronicle_core::TurnRequest::new("t2", "u1", "b"));
    let (a, b) = futures::join!(a, b);
    assert_eq!(a.unwrap().turn_number, 1);
    assert_eq!(b.unwrap().turn_number, 1);
}

#[tokio::test]
async fn test_recent_narrative_window() {
    let harness = TestHarness::new();
    for i in 0..3 {
        harness.turn_with_reply(&format!("go {i}"), "Onward.").await.unwrap();
    }
    harness.turn_with_reply("final", "Done.").await.unwrap();

    let calls = harness.model.calls();
    // system + intro + user
    assert_eq!(calls[0].messages.len(), 3);
    // system + last five entries + user
    assert_eq!(calls[3].messages.len(), 7);
    assert!(calls[3].last_user().unwrap().starts_with("PLAYER INPUT: final"));
    assert_eq!(calls[3].options.temperature, 0.7);
    assert_eq!(calls[3].options.max_tokens, Some(2048));
}

// =============================================================================
// FAILURES
// =============================================================================

#[tokio::test]
async fn test_model_failure_mutates_nothing() {
    let harness = TestHarness::with_model(ScriptedModel::failing(), |engine| engine);

    let err = harness.turn("anything").await.unwrap_err();
    assert!(matches!(err, TurnError::Model(_)));
    assert!(!err.is_config());

    assert_eq!(harness.last_turn_number().await, Some(0));
    assert_eq!(harness.game_state().await.unwrap().narrative.len(), 1);
    assert!(harness.engine.turns("t1", "u1").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_failed_commit_fails_turn_and_records_nothing() {
    let sessions = Arc::new(InMemorySessionRepository::new());
    let model = Arc::new(ScriptedModel::new([with_trailer(
        "You pry at the wreckage.",
        json!({"statCheck": {"stat": "Strength", "difficulty": 10}}),
    )]));
    let engine = TurnEngine::new(
        Arc::new(CampaignCatalog::builtin()),
        model.clone(),
        Arc::new(FailingSessionRepository::new(sessions.clone())),
    );

    let err = engine
        .play_turn(TurnRequest::new("t1", "u1", "pry it open").with_player_name("Tav"))
        .await
        .unwrap_err();
    assert!(matches!(err, TurnError::Store(StoreError::Io(_))));
    assert!(!err.is_config());
    assert_eq!(model.call_count(), 1);

    // The session exists from get-or-create, but the turn never landed.
    let key = SessionKey::new("t1", "u1");
    let record = sessions.find(&key).await.unwrap().expect("session exists");
    assert_eq!(record.last_turn_number, 0);
    assert_eq!(record.game_state.narrative.len(), 1);
    assert!(sessions.turns(&key).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_model_timeout_fails_turn() {
    let harness = TestHarness::with_model(
        ScriptedModel::default().with_delay(Duration::from_millis(500)),
        |engine| {
            engine.with_config(EngineConfig::new().with_model_timeout(Duration::from_millis(20)))
        },
    );

    let err = harness.turn("wait").await.unwrap_err();
    assert!(matches!(err, TurnError::Model(ModelError::Timeout(_))));
    assert_eq!(harness.last_turn_number().await, Some(0));
}

#[tokio::test]
async fn test_memory_failure_is_best_effort() {
    let harness = TestHarness::with(|engine| {
        engine.with_memory(Arc::new(ChapterMemory::new(
            Arc::new(FailingEmbedder),
            Arc::new(InMemoryVectorIndex::new()),
        )))
    });

    let response = harness.turn_with_reply("look", "Stars.").await.unwrap();
    assert_eq!(response.turn_number, 1);
    assert!(!harness.last_system_prompt().unwrap().contains("Relevant prior chapters"));
}

#[tokio::test]
async fn test_canon_note_when_requested() {
    let canon = Arc::new(StaticCanon::new(vec![CanonSnippet {
        title: "Nautiloid".into(),
        url: Some("https://example.org/nautiloid".into()),
        snippet: "A mind flayer vessel.".into(),
    }]));
    let harness = TestHarness::with({
        let canon = canon.clone();
        move |engine| engine.with_canon(canon)
    });

    harness.turn_with_reply("look", "Stars.").await.unwrap();
    assert!(canon.queries().is_empty());
    assert!(!harness.last_system_prompt().unwrap().contains("Canon references"));

    harness.model.push_reply("Tentacles.");
    harness
        .engine
        .play_turn(harness.request("who built this ship").with_web_search(true))
        .await
        .unwrap();
    assert_eq!(canon.queries().len(), 1);
    assert!(canon.queries()[0].contains("who built this ship"));
    assert!(harness
        .last_system_prompt()
        .unwrap()
        .contains("Canon references (web):\n- Nautiloid: A mind flayer vessel."));
}

#[tokio::test]
async fn test_canon_failure_is_best_effort() {
    let harness = TestHarness::with(|engine| {
        engine
            .with_canon(Arc::new(FailingCanon))
            .with_config(EngineConfig::new().with_web_search(true))
    });

    let response = harness.turn_with_reply("look", "Stars.").await.unwrap();
    assert_eq!(response.turn_number, 1);
    assert!(!harness.last_system_prompt().unwrap().contains("Canon references"));
}
