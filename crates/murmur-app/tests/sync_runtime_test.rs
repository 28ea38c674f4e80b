//! Conversation sync runtime tests.
//!
//! The runtime is driven end to end over `SimTransport` on a paused tokio
//! clock. Transport latency is virtual, so in-flight windows can be observed
//! deterministically.

use std::{sync::Arc, time::Duration};

use chrono::TimeDelta;
use murmur_app::spawn_sync;
use murmur_client::{SyncError, SyncStatus};
use murmur_core::{SyncConfig, TransportError};
use murmur_harness::{InvariantRegistry, SimEnv, SimTransport, SystemSnapshot, TransportCall};
use murmur_proto::{Conversation, ConversationId, Message, MessageId, MessagePage, RawEvent};
use serde_json::json;

const LATENCY: Duration = Duration::from_millis(100);

fn config() -> SyncConfig {
    SyncConfig::for_user("alice")
}

fn c1() -> ConversationId {
    ConversationId::from("c1")
}

/// Let every spawned task run until idle.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

fn from_bob(env: &SimEnv, id: &str, conversation: &str) -> Message {
    Message::confirmed(id.into(), conversation.into(), "bob".into(), id, env.wall_origin())
}

#[tokio::test(start_paused = true)]
async fn send_is_visible_pending_then_reconciled_by_echo() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new().with_echo(env.clone(), "alice").with_latency(LATENCY));
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();

    let mut updates = sync.updates();
    let sender = sync.clone();
    let send = tokio::spawn(async move { sender.send_text("c1", "hi").await });

    // Oracle: the optimistic copy is published before the transport answers.
    let pending = updates.wait_for(|s| !s.messages(&c1()).is_empty()).await.unwrap().clone();
    let messages = pending.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].is_pending);
    assert_eq!(messages[0].id, None);
    let client_id = messages[0].client_id.clone().unwrap();

    send.await.unwrap().unwrap();
    settle().await;

    // Oracle: the echo replaced the pending copy in place.
    let state = sync.state();
    let messages = state.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, Some("srv-1".into()));
    assert_eq!(messages[0].client_id, Some(client_id));
    assert!(!messages[0].is_pending);
    assert!(!messages[0].has_failed);

    InvariantRegistry::standard().assert_all(&SystemSnapshot::from_sync(state), "after echo");
}

#[tokio::test(start_paused = true)]
async fn refused_send_stays_failed_until_retried() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new().with_echo(env.clone(), "alice"));
    transport.refuse_sends(true);
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();

    sync.send_text("c1", "hi").await.unwrap();
    tokio::time::sleep(Duration::from_secs(30)).await;

    let state = sync.state();
    let messages = state.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert!(messages[0].has_failed);
    assert!(!messages[0].is_pending);
    let client_id = messages[0].client_id.clone().unwrap();

    transport.refuse_sends(false);
    sync.retry_message("c1", client_id.clone()).await.unwrap();
    settle().await;

    let state = sync.state();
    let messages = state.messages(&c1());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].client_id, Some(client_id.clone()));
    assert!(messages[0].is_confirmed());

    let sends: Vec<_> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::Send(outgoing) => Some(outgoing.client_id),
            _ => None,
        })
        .collect();
    assert_eq!(sends, vec![client_id.clone(), client_id]);
}

#[tokio::test(start_paused = true)]
async fn send_connection_error_marks_failed_without_error() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    transport.fail_sends(Some(TransportError::Connection("offline".into())));
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();

    assert_eq!(sync.send_text("c1", "hi").await, Ok(()));
    assert!(sync.state().messages(&c1())[0].has_failed);
}

#[tokio::test(start_paused = true)]
async fn delete_for_unknown_id_publishes_nothing() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();
    let before = sync.state();

    let delivered = transport.push_event("c1", RawEvent::new("message_deleted", json!({ "messageId": "m1" })));
    assert_eq!(delivered, 1);
    settle().await;

    assert_eq!(sync.state(), before);
}

#[tokio::test(start_paused = true)]
async fn edit_and_delete_events_apply_through_feed() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env.clone(), &config());
    sync.join("c1").await.unwrap();

    transport.push_message("c1", from_bob(&env, "m1", "c1"));
    transport.push_message("c1", from_bob(&env, "m2", "c1"));
    settle().await;
    transport.push_event("c1", RawEvent::new("message_edited", json!({ "messageId": "m1", "content": "fixed" })));
    transport.push_event("c1", RawEvent::new("message_deleted", json!({ "messageId": "m2" })));
    settle().await;

    let state = sync.state();
    let messages = state.messages(&c1());
    assert_eq!(messages.len(), 2);
    let edited = messages.iter().find(|m| m.id == Some("m1".into())).unwrap();
    assert_eq!(edited.content, "fixed");
    assert!(edited.is_edited);
    let deleted = messages.iter().find(|m| m.id == Some("m2".into())).unwrap();
    assert!(deleted.is_deleted);
}

#[tokio::test(start_paused = true)]
async fn out_of_order_delivery_is_sorted() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env.clone(), &config());
    sync.join("c1").await.unwrap();

    for (id, secs) in [("m3", 30), ("m1", 10), ("m2", 20), ("m1", 10)] {
        let mut message = from_bob(&env, id, "c1");
        message.created_at += TimeDelta::seconds(secs);
        transport.push_message("c1", message);
    }
    settle().await;

    let state = sync.state();
    let ids: Vec<_> = state.messages(&c1()).iter().filter_map(|m| m.id.clone()).collect();
    assert_eq!(ids, ["m1", "m2", "m3"].map(MessageId::from));
}

#[tokio::test(start_paused = true)]
async fn refused_join_opens_no_feeds() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    transport.refuse_join("c1");
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());

    sync.join("c1").await.unwrap();

    assert_eq!(transport.calls(), vec![TransportCall::Join(c1())]);
    assert_eq!(sync.state().active_conversation, None);
    assert_eq!(transport.open_feeds(&c1()), 0);
}

#[tokio::test(start_paused = true)]
async fn leave_cancels_feeds_before_transport_call() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new().with_latency(LATENCY));
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();
    settle().await;
    assert_eq!(transport.open_feeds(&c1()), 2);

    let leaver = sync.clone();
    let leave = tokio::spawn(async move { leaver.leave("c1").await });
    settle().await;

    // Oracle: the leave call is still in flight, yet the feeds are gone.
    assert_eq!(transport.calls().last(), Some(&TransportCall::Leave(c1())));
    assert_eq!(transport.open_feeds(&c1()), 0);

    leave.await.unwrap().unwrap();
    assert_eq!(sync.state().active_conversation, None);
}

#[tokio::test(start_paused = true)]
async fn items_queued_before_leave_are_dropped() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new().with_latency(LATENCY));
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env.clone(), &config());
    sync.join("c1").await.unwrap();

    // Keep the runtime busy inside a send.
    let sender = sync.clone();
    let send = tokio::spawn(async move { sender.send_text("c1", "slow").await });
    settle().await;

    // Forwarded into the mailbox while the runtime is blocked, then the leave
    // is queued behind it.
    assert_eq!(transport.push_message("c1", from_bob(&env, "late", "c1")), 1);
    settle().await;
    let leaver = sync.clone();
    let leave = tokio::spawn(async move { leaver.leave("c1").await });

    send.await.unwrap().unwrap();
    leave.await.unwrap().unwrap();
    settle().await;

    // Oracle: nothing from the closed subscription reached the state.
    let state = sync.state();
    let contents: Vec<_> = state.messages(&c1()).iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["slow"]);
    assert_eq!(state.unread_count(&c1()), 0);
}

#[tokio::test(start_paused = true)]
async fn rejoin_opens_fresh_feeds() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env.clone(), &config());

    sync.join("c1").await.unwrap();
    sync.leave("c1").await.unwrap();
    sync.join("c1").await.unwrap();
    settle().await;

    assert_eq!(transport.open_feeds(&c1()), 2);
    transport.push_message("c1", from_bob(&env, "m1", "c1"));
    settle().await;
    assert_eq!(sync.state().messages(&c1()).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn unread_counts_inactive_conversations_only() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env.clone(), &config());
    sync.join("c1").await.unwrap();
    sync.join("c2").await.unwrap();

    transport.push_message("c1", from_bob(&env, "m1", "c1"));
    transport.push_message("c2", from_bob(&env, "m2", "c2"));
    settle().await;

    let state = sync.state();
    assert_eq!(state.active_conversation, Some("c2".into()));
    assert_eq!(state.unread_count(&c1()), 1);
    assert_eq!(state.unread_count(&"c2".into()), 0);
    assert_eq!(state.total_unread(), 1);
}

#[tokio::test(start_paused = true)]
async fn mark_read_failure_is_returned_and_counter_cleared() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env.clone(), &config());
    sync.join("c1").await.unwrap();
    sync.join("c2").await.unwrap();
    transport.push_message("c1", from_bob(&env, "m1", "c1"));
    settle().await;
    assert_eq!(sync.state().unread_count(&c1()), 1);

    let offline = TransportError::Connection("offline".into());
    transport.fail_mark_read(Some(offline.clone()));

    assert_eq!(sync.mark_as_read("c1", "m1").await, Err(SyncError::Transport(offline)));
    assert_eq!(sync.state().unread_count(&c1()), 0);
}

#[tokio::test(start_paused = true)]
async fn reaction_failure_is_returned() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());

    sync.add_reaction("c1", "m1", "👍").await.unwrap();

    let rejected = TransportError::Rejected("not a member".into());
    transport.fail_reactions(Some(rejected.clone()));
    assert_eq!(sync.remove_reaction("c1", "m1", "👍").await, Err(SyncError::Transport(rejected)));

    assert_eq!(transport.calls(), vec![
        TransportCall::AddReaction { message_id: "m1".into(), emoji: "👍".into() },
        TransportCall::RemoveReaction { message_id: "m1".into(), emoji: "👍".into() },
    ]);
}

#[tokio::test(start_paused = true)]
async fn invalid_intents_are_rejected_without_transport_calls() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());

    assert_eq!(sync.join("").await, Err(SyncError::EmptyConversationId));
    assert_eq!(sync.send_text("c1", "").await, Err(SyncError::EmptyContent));
    assert!(transport.calls().is_empty());
    assert_eq!(sync.state().version, 0);
}

#[tokio::test(start_paused = true)]
async fn conversation_list_failure_is_recorded_in_state() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    transport.fail_conversations(TransportError::Timeout("list".into()));
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());

    sync.load_conversations().await.unwrap();
    let state = sync.state();
    assert_eq!(state.status, SyncStatus::Error);
    assert!(state.last_error.is_some());

    sync.clear_error().await.unwrap();
    assert_eq!(sync.state().last_error, None);

    transport.set_conversations(vec![Conversation::new("c1")]);
    sync.load_conversations().await.unwrap();
    let state = sync.state();
    assert_eq!(state.status, SyncStatus::Loaded);
    assert_eq!(state.conversations.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn history_pages_follow_the_cursor() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    transport.push_history("c1", MessagePage {
        messages: vec![from_bob(&env, "old2", "c1")],
        has_more: true,
        cursor: Some("p2".into()),
    });
    transport.push_history("c1", MessagePage {
        messages: vec![from_bob(&env, "old1", "c1")],
        has_more: false,
        cursor: None,
    });
    let (sync, _task) = spawn_sync(Arc::clone(&transport), env, &config());

    sync.load_history("c1").await.unwrap();
    sync.load_history("c1").await.unwrap();
    sync.load_history("c1").await.unwrap();

    // Oracle: the second fetch continues from the first page's cursor, the
    // third is never made once the backend reports no more pages.
    let fetches: Vec<_> = transport
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            TransportCall::FetchMessages { before, .. } => Some(before),
            _ => None,
        })
        .collect();
    assert_eq!(fetches, vec![None, Some("p2".to_string())]);
    assert_eq!(sync.state().messages(&c1()).len(), 2);
    assert!(!sync.state().history_cursor(&c1()).has_more);
}

#[tokio::test(start_paused = true)]
async fn shutdown_rejects_later_intents() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();
    let other = sync.clone();

    sync.shutdown().await.unwrap();
    task.await.unwrap();

    assert_eq!(other.join("c2").await, Err(SyncError::ShutDown));
    assert_eq!(sync.shutdown().await, Ok(()));
    settle().await;
    assert_eq!(transport.open_feeds(&c1()), 0);
}

#[tokio::test(start_paused = true)]
async fn dropping_every_handle_stops_the_runtime() {
    let env = SimEnv::new();
    let transport = Arc::new(SimTransport::new());
    let (sync, task) = spawn_sync(Arc::clone(&transport), env, &config());
    sync.join("c1").await.unwrap();

    drop(sync);
    task.await.unwrap();
    settle().await;

    assert_eq!(transport.open_feeds(&c1()), 0);
}
