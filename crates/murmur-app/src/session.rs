//! Client session: both runtimes over one transport.

use std::sync::Arc;

use murmur_core::{Environment, SyncConfig, Transport};
use murmur_proto::ConversationId;
use tokio::task::JoinHandle;

use crate::{SessionError, SyncHandle, TypingHandle, spawn_sync, spawn_typing};

/// Conversation sync and typing coordinator sharing a transport.
///
/// The two runtimes are independent tasks. They never call into each other;
/// each opens its own feed handles and consumes its own event types.
#[derive(Debug)]
pub struct Session {
    /// Conversation sync runtime.
    pub sync: SyncHandle,
    /// Typing coordinator runtime.
    pub typing: TypingHandle,
    tasks: [JoinHandle<()>; 2],
}

impl Session {
    /// Spawn both runtimes on the current tokio runtime.
    pub fn spawn<T, E>(transport: Arc<T>, env: E, config: &SyncConfig) -> Self
    where
        T: Transport,
        E: Environment,
    {
        let (sync, sync_task) = spawn_sync(Arc::clone(&transport), env.clone(), config);
        let (typing, typing_task) = spawn_typing(transport, env, config);
        Self { sync, typing, tasks: [sync_task, typing_task] }
    }

    /// Join a conversation and watch its typing activity.
    ///
    /// Typing is watched only if the join left the conversation active, so a
    /// refused join opens no typing feed.
    pub async fn open_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), SessionError> {
        let conversation_id = conversation_id.into();
        self.sync.join(conversation_id.clone()).await?;
        if self.sync.state().active_conversation.as_ref() == Some(&conversation_id) {
            self.typing.subscribe(conversation_id).await?;
        }
        Ok(())
    }

    /// Leave a conversation and stop watching its typing activity.
    pub async fn close_conversation(
        &self,
        conversation_id: impl Into<ConversationId>,
    ) -> Result<(), SessionError> {
        let conversation_id = conversation_id.into();
        self.typing.conversation_closed(conversation_id.clone()).await?;
        self.typing.unsubscribe(conversation_id.clone()).await?;
        self.sync.leave(conversation_id).await?;
        Ok(())
    }

    /// Shut both runtimes down and wait for their tasks to finish.
    pub async fn shutdown(self) -> Result<(), SessionError> {
        self.typing.shutdown().await?;
        self.sync.shutdown().await?;
        for task in self.tasks {
            task.await?;
        }
        Ok(())
    }
}
