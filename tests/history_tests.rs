//! History mutation tests: delete, retry, edit and title regeneration.

mod common;

use std::sync::Arc;
use std::time::Duration;

use colloquy::chat::{ResolveOutcome, RetryOutcome};
use colloquy::error::ColloquyError;
use colloquy::store::SessionStore;
use colloquy::turn::{TurnOutcome, TurnState};
use colloquy::types::*;
use common::*;
use pretty_assertions::assert_eq;
use tokio::task::JoinHandle;

/// Three exchanges: u1 a1 u2 a2 u3 a3.
async fn three_exchanges(h: &Harness) -> String {
    let sid = h.session().await;
    for (question, answer) in [("q1", "a1"), ("q2", "a2"), ("q3", "a3")] {
        h.endpoint.queue_text(&[answer]);
        h.chat.send(&sid, question).await.unwrap();
    }
    sid
}

fn contents(session: &Session) -> Vec<&str> {
    session.messages.iter().map(|m| m.content()).collect()
}

/// Start a send whose reply streams "partial" and then stalls.
async fn stalled_send(
    h: &Harness,
    sid: &str,
    question: &str,
) -> JoinHandle<Result<TurnOutcome, ColloquyError>> {
    h.endpoint.queue_hanging(vec![Fragment::text("partial")]);
    let chat = h.chat.clone();
    let (sid, question) = (sid.to_string(), question.to_string());
    let task = tokio::spawn(async move { chat.send(&sid, question).await });
    for _ in 0..200 {
        if h.events.latest_preview_text().as_deref() == Some("partial") {
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    task
}

async fn one_exchange(h: &Harness) -> String {
    let sid = h.session().await;
    h.endpoint.queue_text(&["a1"]);
    h.chat.send(&sid, "q1").await.unwrap();
    sid
}

#[tokio::test]
async fn edit_truncates_and_replays_from_the_edited_message() {
    let h = harness();
    let sid = three_exchanges(&h).await;
    let q2 = h.stored(&sid).await.messages[2].id.clone();
    h.endpoint.queue_text(&["a2 revised"]);

    let outcome = h.chat.edit(&sid, &q2, "q2 revised").await.unwrap();
    assert_eq!(outcome.state, TurnState::Completed);

    let session = h.stored(&sid).await;
    assert_eq!(contents(&session), vec!["q1", "a1", "q2 revised", "a2 revised"]);
    assert_ne!(session.messages[2].id, q2);

    let request = h.endpoint.last_request();
    let sent: Vec<&str> = request.messages.iter().map(|m| m.content()).collect();
    assert_eq!(sent, vec!["q1", "a1", "q2 revised"]);
}

#[tokio::test]
async fn edit_rejects_non_user_messages() {
    let h = harness();
    let sid = three_exchanges(&h).await;
    let a1 = h.stored(&sid).await.messages[1].id.clone();

    let err = h.chat.edit(&sid, &a1, "rewrite").await.unwrap_err();
    assert!(matches!(err, ColloquyError::InvalidOperation(_)));
    assert_eq!(h.stored(&sid).await.messages.len(), 6);
}

#[tokio::test]
async fn retry_on_assistant_regenerates_it() {
    let h = harness();
    let sid = three_exchanges(&h).await;
    let a2 = h.stored(&sid).await.messages[3].id.clone();
    h.endpoint.queue_text(&["a2 again"]);

    let outcome = h.chat.retry(&sid, &a2).await.unwrap();
    assert!(matches!(outcome, RetryOutcome::Regenerated(ref o) if o.state == TurnState::Completed));

    let session = h.stored(&sid).await;
    assert_eq!(contents(&session), vec!["q1", "a1", "q2", "a2 again"]);
}

#[tokio::test]
async fn retry_on_user_message_is_invalid() {
    let h = harness();
    let sid = three_exchanges(&h).await;
    let q1 = h.stored(&sid).await.messages[0].id.clone();

    let err = h.chat.retry(&sid, &q1).await.unwrap_err();
    assert!(matches!(err, ColloquyError::InvalidOperation(_)));
    assert!(!h.chat.is_turn_active(&sid));
}

#[tokio::test]
async fn retry_on_tool_result_reopens_only_discarded_calls() {
    let h = harness();
    let sid = h.session().await;
    h.endpoint.queue(weather_tool_calls());
    h.chat.send(&sid, "Weather in Paris and Rome?").await.unwrap();
    h.chat
        .resolve_tool_call(&sid, "c1", ToolOutcome::completed("rain"))
        .await
        .unwrap();
    h.endpoint.queue_text(&["Rain and sun."]);
    h.chat
        .resolve_tool_call(&sid, "c2", ToolOutcome::completed("sun"))
        .await
        .unwrap();

    let c2_result = h.stored(&sid).await.messages[3].id.clone();
    let outcome = h.chat.retry(&sid, &c2_result).await.unwrap();
    assert_eq!(
        outcome,
        RetryOutcome::AwaitingToolResults {
            reopened: vec!["c2".to_string()]
        }
    );

    let session = h.stored(&sid).await;
    assert_eq!(
        roles(&session),
        vec![Role::User, Role::Assistant, Role::ToolResult]
    );
    assert_eq!(session.pending_tool_calls(), 1);

    h.endpoint.queue_text(&["Rain and clouds."]);
    let resolved = h
        .chat
        .resolve_tool_call(&sid, "c2", ToolOutcome::completed("clouds"))
        .await
        .unwrap();
    assert!(matches!(resolved, ResolveOutcome::Continued(_)));

    let session = h.stored(&sid).await;
    assert_eq!(
        contents(&session)[2..].to_vec(),
        vec!["rain", "clouds", "Rain and clouds."]
    );
}

#[tokio::test]
async fn delete_removes_exactly_one_message() {
    let h = harness();
    let sid = three_exchanges(&h).await;
    let a2 = h.stored(&sid).await.messages[3].id.clone();

    let removed = h.chat.delete_message(&sid, &a2).await.unwrap();
    assert_eq!(removed.content(), "a2");

    let session = h.stored(&sid).await;
    assert_eq!(contents(&session), vec!["q1", "a1", "q2", "q3", "a3"]);

    let err = h.chat.delete_message(&sid, &a2).await.unwrap_err();
    assert!(matches!(err, ColloquyError::MessageNotFound(_)));
}

#[tokio::test]
async fn deleting_a_tool_result_keeps_the_transcript_paired() {
    let h = harness();
    let sid = h.session().await;
    h.endpoint.queue(weather_tool_calls());
    h.chat.send(&sid, "Weather?").await.unwrap();
    h.chat
        .resolve_tool_call(&sid, "c1", ToolOutcome::completed("rain"))
        .await
        .unwrap();
    h.endpoint.queue_text(&["Done."]);
    h.chat
        .resolve_tool_call(&sid, "c2", ToolOutcome::completed("sun"))
        .await
        .unwrap();

    let c1_result = h.stored(&sid).await.messages[2].id.clone();
    h.chat.delete_message(&sid, &c1_result).await.unwrap();

    h.endpoint.queue_text(&["ok"]);
    h.chat.send(&sid, "thanks").await.unwrap();
    let request = h.endpoint.last_request();
    let results: Vec<(&str, &str)> = request
        .messages
        .iter()
        .filter_map(|m| m.tool_result_call_id().map(|id| (id, m.content())))
        .collect();
    assert_eq!(
        results,
        vec![
            ("c1", colloquy::provider::sanitize::MISSING_TOOL_RESULT),
            ("c2", "sun")
        ]
    );
}

#[tokio::test]
async fn editing_the_first_message_regenerates_the_title() {
    let titles = Arc::new(MockTitles::new("Weather"));
    let generator = titles.clone();
    let h = harness_with(move |chat| chat.with_title_generator(generator));
    let sid = three_exchanges(&h).await;
    h.eventually(&sid, |s| s.title.is_some()).await;

    let q1 = h.stored(&sid).await.messages[0].id.clone();
    h.endpoint.queue_text(&["fresh"]);
    h.chat.edit(&sid, &q1, "new opener").await.unwrap();

    for _ in 0..100 {
        if titles.seeds().len() == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(titles.seeds(), vec!["q1".to_string(), "new opener".to_string()]);

    h.endpoint.queue_text(&["second"]);
    h.chat.send(&sid, "follow-up").await.unwrap();
    let follow_up = h.stored(&sid).await.messages[2].id.clone();
    h.endpoint.queue_text(&["third"]);
    h.chat.edit(&sid, &follow_up, "changed follow-up").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(titles.seeds().len(), 2);
}

#[tokio::test]
async fn generated_title_never_overwrites_a_rename() {
    let titles = Arc::new(MockTitles::new("Generated").with_delay(Duration::from_millis(100)));
    let generator = titles.clone();
    let h = harness_with(move |chat| chat.with_title_generator(generator));
    let sid = h.session().await;
    h.endpoint.queue_text(&["hi"]);
    h.chat.send(&sid, "hello").await.unwrap();

    let mut session = h.stored(&sid).await;
    session.title = Some("Renamed by user".into());
    h.store.save_session(&session).await.unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(titles.seeds(), vec!["hello".to_string()]);
    assert_eq!(h.stored(&sid).await.title.as_deref(), Some("Renamed by user"));
}

#[tokio::test]
async fn retry_supersedes_a_streaming_turn() {
    let h = harness();
    let sid = one_exchange(&h).await;
    let a1 = h.stored(&sid).await.messages[1].id.clone();
    let streaming = stalled_send(&h, &sid, "q2").await;
    h.endpoint.queue_text(&["a1 again"]);

    let outcome = h.chat.retry(&sid, &a1).await.unwrap();
    assert!(matches!(outcome, RetryOutcome::Regenerated(ref o) if o.state == TurnState::Completed));
    assert_eq!(streaming.await.unwrap().unwrap().state, TurnState::Aborted);

    let session = h.stored(&sid).await;
    assert_eq!(contents(&session), vec!["q1", "a1 again"]);
    let last_request = h.endpoint.last_request();
    let sent: Vec<&str> = last_request.messages.iter().map(|m| m.content()).collect();
    assert_eq!(sent, vec!["q1"]);
    assert!(!h.chat.is_turn_active(&sid));
}

#[tokio::test]
async fn edit_supersedes_a_streaming_turn() {
    let h = harness();
    let sid = one_exchange(&h).await;
    let q1 = h.stored(&sid).await.messages[0].id.clone();
    let streaming = stalled_send(&h, &sid, "q2").await;
    h.endpoint.queue_text(&["a1 revised"]);

    let outcome = h.chat.edit(&sid, &q1, "q1 revised").await.unwrap();
    assert_eq!(outcome.state, TurnState::Completed);
    assert_eq!(streaming.await.unwrap().unwrap().state, TurnState::Aborted);

    let session = h.stored(&sid).await;
    assert_eq!(contents(&session), vec!["q1 revised", "a1 revised"]);
    assert!(!h.chat.is_turn_active(&sid));
}

#[tokio::test]
async fn deleting_during_a_turn_is_not_undone_by_its_commit() {
    let h = harness();
    let sid = one_exchange(&h).await;
    let a1 = h.stored(&sid).await.messages[1].id.clone();
    let streaming = stalled_send(&h, &sid, "q2").await;

    h.chat.delete_message(&sid, &a1).await.unwrap();
    assert!(h.chat.is_turn_active(&sid));
    assert!(h.chat.cancel(&sid));
    assert_eq!(streaming.await.unwrap().unwrap().state, TurnState::Aborted);

    let session = h.stored(&sid).await;
    assert_eq!(contents(&session), vec!["q1", "q2", "partial"]);
    assert!(session.messages.iter().all(|m| m.id != a1));
    assert!(session.messages[2].as_assistant().unwrap().incomplete);
}
