use platform_core::headless_session::HistoryHandle;
use platform_core::model::{ContainerId, ConversationState, PromptSource, TaskId, TaskStatus};
use platform_core::monitoring_session::AutomationLogSink;

use super::HistoryStore;

fn store() -> HistoryStore {
    HistoryStore::open_in_memory().expect("open in-memory store")
}

#[tokio::test]
async fn create_and_fetch_conversation_round_trips() {
    let store = store();
    let created = store.create_conversation(ContainerId(1), None).await.unwrap();
    assert_eq!(created.state, ConversationState::Idle);

    let fetched = store.get_conversation_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(fetched.container_id, ContainerId(1));
    assert_eq!(fetched.state, ConversationState::Idle);
}

#[tokio::test]
async fn start_turn_allocates_sequential_indices() {
    let store = store();
    let conv = store.create_conversation(ContainerId(1), None).await.unwrap();

    let turn1 = store.start_turn(conv.id, "hello", PromptSource::User).await.unwrap();
    let turn2 = store.start_turn(conv.id, "again", PromptSource::User).await.unwrap();
    assert_ne!(turn1, turn2);

    let row1 = store.get_turn_by_id(turn1).await.unwrap().unwrap();
    let row2 = store.get_turn_by_id(turn2).await.unwrap().unwrap();
    assert_eq!(row1.turn_index, 0);
    assert_eq!(row2.turn_index, 1);
}

#[tokio::test]
async fn complete_turn_records_usage_and_response() {
    let store = store();
    let conv = store.create_conversation(ContainerId(1), None).await.unwrap();
    let turn_id = store.start_turn(conv.id, "hi", PromptSource::User).await.unwrap();

    store.append_event(turn_id, "assistant", None, serde_json::json!({"text": "partial"})).await.unwrap();
    store.complete_turn(turn_id, "full response", Some("claude-opus"), 10, 20, 0.001, 500).await.unwrap();

    let turn = store.get_turn_by_id(turn_id).await.unwrap().unwrap();
    assert_eq!(turn.assistant_response.as_deref(), Some("full response"));
    assert_eq!(turn.input_tokens, 10);
    assert_eq!(turn.output_tokens, 20);

    let events = store.get_turn_events(turn_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, "assistant");
}

#[tokio::test]
async fn get_recent_turns_paginates_with_has_more() {
    let store = store();
    let conv = store.create_conversation(ContainerId(1), None).await.unwrap();
    for i in 0..5 {
        store.start_turn(conv.id, &format!("turn {i}"), PromptSource::User).await.unwrap();
    }

    let (page, has_more) = store.get_recent_turns(conv.id, 2).await.unwrap();
    assert_eq!(page.len(), 2);
    assert!(has_more);
    assert_eq!(page[0].turn_index, 3);
    assert_eq!(page[1].turn_index, 4);

    let (older, has_more) = store.get_turns_before(conv.id, page[0].id, 2).await.unwrap();
    assert_eq!(older.len(), 2);
    assert!(has_more);
    assert_eq!(older[0].turn_index, 1);
    assert_eq!(older[1].turn_index, 2);
}

#[tokio::test]
async fn delete_conversation_cascades_turns_and_events() {
    let store = store();
    let conv = store.create_conversation(ContainerId(1), None).await.unwrap();
    let turn_id = store.start_turn(conv.id, "hi", PromptSource::User).await.unwrap();
    store.append_event(turn_id, "assistant", None, serde_json::json!({})).await.unwrap();

    store.delete_conversation(conv.id).await.unwrap();

    assert!(store.get_conversation_by_id(conv.id).await.unwrap().is_none());
    assert!(store.get_turn_by_id(turn_id).await.unwrap().is_none());
    assert!(store.get_turn_events(turn_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn task_crud_and_reorder() {
    let store = store();
    let a = store.add_task(ContainerId(1), "first").await.unwrap();
    let b = store.add_task(ContainerId(1), "second").await.unwrap();

    store.reorder_tasks(ContainerId(1), &[b.id, a.id]).await.unwrap();
    let tasks = store.list_tasks(ContainerId(1)).await.unwrap();
    assert_eq!(tasks[0].id, b.id);
    assert_eq!(tasks[1].id, a.id);

    store.set_task_status(a.id, TaskStatus::InProgress).await.unwrap();
    let pending = store.peek_pending_task(ContainerId(1)).await.unwrap().unwrap();
    assert_eq!(pending.id, b.id);

    store.remove_task(b.id).await.unwrap();
    assert_eq!(store.list_tasks(ContainerId(1)).await.unwrap().len(), 1);

    // a spurious id is a no-op, not an error.
    store.remove_task(TaskId(9999)).await.unwrap();
}

#[tokio::test]
async fn automation_log_sink_persists_entries() {
    let store = store();
    let entry = platform_core::model::AutomationLogEntry {
        container_id: ContainerId(1),
        session_id: platform_core::model::SessionId(1),
        strategy: "injection".into(),
        action: "inject".into(),
        command: Some("continue".into()),
        reason: None,
        success: true,
        created_at: platform_core::model::now_ms(),
    };
    AutomationLogSink::record(&store, entry).await;
    // record() swallows errors by design; absence of a panic here confirms
    // the insert path didn't error on a freshly initialized schema.
}
