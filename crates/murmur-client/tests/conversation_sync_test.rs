//! End-to-end scenarios for ConversationSync, driven action by action.
//!
//! The tests play the runtime's role by hand: each action is answered with
//! the follow-up event a transport would produce, so the exact sequence of
//! published snapshots is observable.

use std::sync::Arc;

use murmur_client::{ConversationSync, ConversationSyncState, SyncAction, SyncEvent};
use murmur_harness::{InvariantRegistry, SimEnv, SystemSnapshot};
use murmur_proto::{ClientId, Message, MessageType, RawEvent};
use serde_json::json;

fn published(actions: &[SyncAction]) -> Vec<Arc<ConversationSyncState>> {
    actions
        .iter()
        .filter_map(|a| match a {
            SyncAction::Publish(state) => Some(Arc::clone(state)),
            _ => None,
        })
        .collect()
}

fn joined_session() -> ConversationSync<SimEnv> {
    let mut sync = ConversationSync::new(SimEnv::new(), "alice");

    let actions = sync.handle(SyncEvent::JoinConversation { conversation_id: "c1".into() }).unwrap();
    assert_eq!(actions, vec![SyncAction::Join { conversation_id: "c1".into() }]);

    let actions = sync.handle(SyncEvent::JoinCompleted { conversation_id: "c1".into(), accepted: true }).unwrap();
    assert!(actions.contains(&SyncAction::OpenSubscriptions { conversation_id: "c1".into() }));
    sync
}

fn send_hi(sync: &mut ConversationSync<SimEnv>) -> (ClientId, Vec<SyncAction>) {
    let actions = sync
        .handle(SyncEvent::SendMessage {
            conversation_id: "c1".into(),
            content: "hi".into(),
            message_type: MessageType::Text,
            reply_to: None,
        })
        .unwrap();
    let client_id = actions
        .iter()
        .find_map(|a| match a {
            SyncAction::Send(outgoing) => Some(outgoing.client_id.clone()),
            _ => None,
        })
        .unwrap();
    (client_id, actions)
}

#[test]
fn send_then_echo_reconciles_single_message() {
    // Oracle: one pending message is published before the transport call,
    // then the echo replaces it in place with the server id.
    let mut sync = joined_session();
    let (client_id, actions) = send_hi(&mut sync);

    let snapshots = published(&actions);
    assert_eq!(snapshots.len(), 1);
    let pending = snapshots[0].messages(&"c1".into());
    assert_eq!(pending.len(), 1);
    assert!(pending[0].is_pending);
    assert_eq!(pending[0].client_id.as_ref(), Some(&client_id));
    assert!(matches!(actions.last(), Some(SyncAction::Send(_))));

    let echo = Message::confirmed("m1".into(), "c1".into(), "alice".into(), "hi", pending[0].created_at)
        .with_client_id(client_id.clone());
    sync.handle(SyncEvent::MessageReceived { conversation_id: "c1".into(), message: echo }).unwrap();
    sync.handle(SyncEvent::SendCompleted { conversation_id: "c1".into(), client_id, is_ok: true }).unwrap();

    let messages = sync.state().messages(&"c1".into());
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].id, Some("m1".into()));
    assert!(!messages[0].is_pending);
    assert!(!messages[0].has_failed);

    InvariantRegistry::standard().assert_all(&SystemSnapshot::from_sync(Arc::clone(sync.state())), "after echo");
}

#[test]
fn refused_send_without_echo_is_retained_as_failed() {
    // Oracle: no echo ever arrives; the message stays, flagged failed.
    let mut sync = joined_session();
    let (client_id, _) = send_hi(&mut sync);

    let actions = sync
        .handle(SyncEvent::SendCompleted { conversation_id: "c1".into(), client_id: client_id.clone(), is_ok: false })
        .unwrap();
    assert_eq!(published(&actions).len(), 1);

    let messages = sync.state().messages(&"c1".into());
    assert_eq!(messages.len(), 1);
    assert!(!messages[0].is_pending);
    assert!(messages[0].has_failed);

    // Further unrelated traffic does not drop it.
    sync.handle(SyncEvent::LoadConversations).unwrap();
    sync.handle(SyncEvent::ConversationsLoaded { conversations: Vec::new() }).unwrap();
    assert!(sync.state().find_by_client_id(&"c1".into(), &client_id).is_some_and(|m| m.has_failed));
}

#[test]
fn delete_for_unknown_id_changes_nothing() {
    // Oracle: reconciliation misses are not errors.
    let mut sync = joined_session();
    let before = Arc::clone(sync.state());

    let event = RawEvent::new("message_deleted", json!({ "messageId": "m1" }));
    let actions = sync.handle(SyncEvent::EventReceived { conversation_id: "c1".into(), event }).unwrap();

    assert!(actions.is_empty());
    assert_eq!(sync.state(), &before);
}

#[test]
fn leave_then_rejoin_goes_back_to_transport() {
    let mut sync = joined_session();
    let actions = sync.handle(SyncEvent::LeaveConversation { conversation_id: "c1".into() }).unwrap();
    let order: Vec<_> = actions
        .iter()
        .filter(|a| !matches!(a, SyncAction::Publish(_)))
        .cloned()
        .collect();
    assert_eq!(order, vec![
        SyncAction::CloseSubscriptions { conversation_id: "c1".into() },
        SyncAction::Leave { conversation_id: "c1".into() },
    ]);

    let actions = sync.handle(SyncEvent::JoinConversation { conversation_id: "c1".into() }).unwrap();
    assert_eq!(actions, vec![SyncAction::Join { conversation_id: "c1".into() }]);
}
