//! End-to-end turns against the scripted engine and in-memory stores.

mod common;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::json;

use whatnext::agent::prompts::{
    FAILED_RUN_APOLOGY, LOOKUP_MISS_OUTPUT, NO_RESULTS_OUTPUT, SORTER_INSTRUCTIONS, TIMEOUT_APOLOGY,
    UNREGISTERED_TOOL_OUTPUT,
};
use whatnext::agent::{ChatContent, ChatReply, ChatRequest, ChatType};
use whatnext::reasoning::{RunScript, RunStatus, ScriptedEngine, ToolCallRequest};
use whatnext::tools::{LOOKUP_TOOL, NEARBY_TOOL};
use whatnext::WhatnextError;

fn chat(message: &str, session_id: Option<&str>) -> ChatRequest {
    ChatRequest {
        user_id: "user-0001".to_string(),
        session_id: session_id.map(str::to_string),
        message: message.to_string(),
        latitude: common::CENTER_LAT,
        longitude: common::CENTER_LON,
    }
}

fn location_ids(reply: &ChatReply) -> Vec<String> {
    match &reply.content {
        ChatContent::Locations(locations) => locations
            .iter()
            .map(|l| l.business_id().to_string())
            .collect(),
        ChatContent::Text(text) => panic!("expected locations, got text {:?}", text),
    }
}

fn text(reply: &ChatReply) -> &str {
    match &reply.content {
        ChatContent::Text(text) => text,
        ChatContent::Locations(_) => panic!("expected text reply"),
    }
}

#[tokio::test]
async fn test_new_session_search_is_ranked_into_locations() {
    let engine = Arc::new(ScriptedEngine::with_scripts([
        RunScript::new()
            .status(RunStatus::Queued)
            .requires_action(
                "call_1",
                NEARBY_TOOL,
                json!({"categories": "cafes", "tag": "coffee", "limit": "5", "cur_open": "1"}),
            )
            .completes_with("Found a couple of coffee spots!"),
        RunScript::new().completes_with("cafes-0001, cafes-0002"),
    ]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("find me coffee nearby", None))
        .await
        .unwrap();

    assert_eq!(reply.chat_type, ChatType::Locations);
    assert_eq!(reply.is_user_message, "false");
    assert_eq!(location_ids(&reply), vec!["cafes-0001", "cafes-0002"]);

    // Tool output lists candidate names, best reviewed first.
    let submitted = engine.submitted_outputs();
    assert_eq!(submitted.len(), 1);
    assert_eq!(submitted[0].1[0].tool_call_id, "call_1");
    assert_eq!(submitted[0].1[0].output, "cafes-0002 name, cafes-0001 name");

    // The new session got a thread and the bio preamble.
    assert_eq!(engine.threads_created(), 1);
    let history = services.sessions.recent_candidates(&reply.session_id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].len(), 2);

    let requests = engine.run_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].assistant_id, common::ASSISTANT_ID);
    assert_eq!(requests[0].tools, None);
    assert_eq!(requests[1].instructions.as_deref(), Some(SORTER_INSTRUCTIONS));
    assert_eq!(requests[1].tools, Some(vec![]));
}

#[tokio::test]
async fn test_bio_only_on_first_turn_of_a_session() {
    let engine = Arc::new(ScriptedEngine::with_scripts([
        RunScript::new().completes_with("Hey! What are you in the mood for?"),
        RunScript::new().completes_with("Sure, tell me more."),
    ]));
    let services = common::services(engine.clone());

    let first = services
        .controller
        .handle_turn(chat("hello", None))
        .await
        .unwrap();
    assert_eq!(first.chat_type, ChatType::Regular);
    assert_eq!(text(&first), "Hey! What are you in the mood for?");

    let second = services
        .controller
        .handle_turn(chat("something fun", Some(first.session_id.as_str())))
        .await
        .unwrap();
    assert_eq!(second.session_id, first.session_id);
    assert_eq!(text(&second), "Sure, tell me more.");
    assert_eq!(engine.threads_created(), 1);

    let thread = services
        .sessions
        .resolve(Some(first.session_id.as_str()))
        .await
        .unwrap()
        .session
        .thread_id;
    let messages = engine.messages(&thread);
    assert!(messages[0].starts_with("User bio: In terms of food and drinks, this user likes coffee."));
    assert!(messages[0].ends_with("User message: hello"));
    assert_eq!(messages[2], "User message: something fun");
}

#[tokio::test]
async fn test_empty_search_answers_conversationally() {
    let engine = Arc::new(ScriptedEngine::with_scripts([RunScript::new()
        .requires_action("call_1", NEARBY_TOOL, json!({"categories": "museums", "tag": ""}))
        .completes_with("Nothing open nearby. Want me to include closed places?")]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("any museums?", None))
        .await
        .unwrap();

    assert_eq!(reply.chat_type, ChatType::Regular);
    assert_eq!(text(&reply), "Nothing open nearby. Want me to include closed places?");
    assert_eq!(engine.submitted_outputs()[0].1[0].output, NO_RESULTS_OUTPUT);
    assert_eq!(engine.run_requests().len(), 1);
}

#[tokio::test]
async fn test_unmatched_tag_falls_back_to_category() {
    let engine = Arc::new(ScriptedEngine::with_scripts([
        RunScript::new()
            .requires_action("call_1", NEARBY_TOOL, json!({"categories": "bars", "tag": "vegan"}))
            .completes_with("One bar nearby."),
        RunScript::new().completes_with("bars-0001"),
    ]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("vegan drinks?", None))
        .await
        .unwrap();
    assert_eq!(location_ids(&reply), vec!["bars-0001"]);
}

#[tokio::test]
async fn test_failed_run_returns_fixed_apology() {
    let engine = Arc::new(ScriptedEngine::with_scripts([RunScript::new()
        .requires_action("call_1", NEARBY_TOOL, json!({"categories": "cafes", "tag": "coffee"}))
        .fails("rate_limit_exceeded")]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("coffee", None))
        .await
        .unwrap();

    assert_eq!(reply.chat_type, ChatType::Regular);
    assert_eq!(reply.content, ChatContent::Text(FAILED_RUN_APOLOGY.to_string()));
    // Partial tool results were computed but do not leak into the reply.
    assert_eq!(engine.submitted_outputs().len(), 1);
    assert!(engine.cancelled_runs().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_timeout_cancels_run_and_apologizes() {
    let engine = Arc::new(ScriptedEngine::with_scripts([RunScript::new().stays_in_progress()]));
    let services = common::services(engine.clone());

    let started = tokio::time::Instant::now();
    let reply = services
        .controller
        .handle_turn(chat("coffee", None))
        .await
        .unwrap();

    assert!(started.elapsed() >= std::time::Duration::from_secs(30));
    assert_eq!(reply.content, ChatContent::Text(TIMEOUT_APOLOGY.to_string()));
    assert_eq!(reply.chat_type, ChatType::Regular);
    assert_eq!(engine.cancelled_runs().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_ranking_shares_the_turn_deadline() {
    let engine = Arc::new(ScriptedEngine::with_scripts([
        RunScript::new()
            .requires_action("call_1", NEARBY_TOOL, json!({"categories": "cafes", "tag": "coffee"}))
            .completes_with("Coffee time."),
        RunScript::new().stays_in_progress(),
    ]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("coffee", None))
        .await
        .unwrap();

    assert_eq!(reply.content, ChatContent::Text(TIMEOUT_APOLOGY.to_string()));
    let requests = engine.run_requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(engine.cancelled_runs().len(), 1);
}

#[tokio::test]
async fn test_lookup_miss_skips_ranking() {
    let engine = Arc::new(ScriptedEngine::with_scripts([RunScript::new()
        .status(RunStatus::RequiresAction(vec![
            ToolCallRequest {
                id: "call_1".to_string(),
                name: NEARBY_TOOL.to_string(),
                arguments: json!({"categories": "cafes", "tag": "coffee"}).to_string(),
            },
            ToolCallRequest {
                id: "call_2".to_string(),
                name: LOOKUP_TOOL.to_string(),
                arguments: json!({"business_id": "cafes-9999"}).to_string(),
            },
        ]))
        .completes_with("Never heard of that one, but it sounds cozy.")]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("tell me about Cafe Nowhere", None))
        .await
        .unwrap();

    assert_eq!(reply.chat_type, ChatType::Regular);
    let outputs = &engine.submitted_outputs()[0].1;
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[1].tool_call_id, "call_2");
    assert_eq!(outputs[1].output, LOOKUP_MISS_OUTPUT);
    assert_eq!(engine.run_requests().len(), 1);
}

#[tokio::test]
async fn test_lookup_hit_returns_serialized_record() {
    let engine = Arc::new(ScriptedEngine::with_scripts([RunScript::new()
        .requires_action("call_1", LOOKUP_TOOL, json!({"business_id": "bars-0001"}))
        .completes_with("Great cocktails there.")]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("what about bars-0001?", None))
        .await
        .unwrap();

    assert_eq!(text(&reply), "Great cocktails there.");
    let output: serde_json::Value =
        serde_json::from_str(&engine.submitted_outputs()[0].1[0].output).unwrap();
    assert_eq!(output["business_id"], "bars-0001");
}

#[tokio::test]
async fn test_unregistered_tool_gets_explicit_output() {
    let engine = Arc::new(ScriptedEngine::with_scripts([RunScript::new()
        .requires_action("call_1", "book_table", json!({"party": 4}))
        .completes_with("I can't book tables, sorry!")]));
    let services = common::services(engine.clone());

    let reply = services
        .controller
        .handle_turn(chat("book a table for 4", None))
        .await
        .unwrap();

    assert_eq!(text(&reply), "I can't book tables, sorry!");
    assert_eq!(engine.submitted_outputs()[0].1[0].output, UNREGISTERED_TOOL_OUTPUT);
}

#[tokio::test]
async fn test_invalid_request_is_rejected_before_any_engine_call() {
    let engine = Arc::new(ScriptedEngine::new());
    let services = common::services(engine.clone());

    let err = services
        .controller
        .handle_turn(chat("  ", None))
        .await
        .unwrap_err();
    assert!(matches!(err, WhatnextError::Validation(_)));
    assert_eq!(engine.threads_created(), 0);
}
