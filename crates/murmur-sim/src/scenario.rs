//! Scripted session.
//!
//! Two users exchange messages in one conversation. The remote side is
//! played by pushing into the transport's feeds; the local side goes through
//! the session handles. A send during a simulated outage is retried once the
//! backend is reachable again.

use std::{sync::Arc, time::Duration};

use murmur_app::{Session, SessionError};
use murmur_client::{SyncError, TypingError};
use murmur_core::{Environment, SyncConfig, TransportError};
use murmur_harness::{InvariantRegistry, SimEnv, SimTransport, SystemSnapshot, Violation};
use murmur_proto::{ClientId, Conversation, ConversationId, FeedEvent, Message, UserId};
use thiserror::Error;

/// Backend round-trip time.
const LATENCY: Duration = Duration::from_millis(40);

/// Time the peer spends typing before each message.
const PEER_TYPING: Duration = Duration::from_millis(800);

/// Time the local user spends typing before each reply.
const LOCAL_TYPING: Duration = Duration::from_millis(700);

/// Scenario failures.
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// Session helper failed.
    #[error("session: {0}")]
    Session(#[from] SessionError),

    /// Sync intent failed.
    #[error("sync: {0}")]
    Sync(#[from] SyncError),

    /// Typing intent failed.
    #[error("typing: {0}")]
    Typing(#[from] TypingError),

    /// Published state broke an invariant.
    #[error("invariant violated after {step}: {violations:?}")]
    Invariants {
        /// Step that produced the state.
        step: String,
        /// Every violation found.
        violations: Vec<Violation>,
    },

    /// Final collection has the wrong size.
    #[error("expected {expected} messages, found {found}")]
    MessageCount {
        /// Messages the script produced.
        expected: usize,
        /// Messages in the final snapshot.
        found: usize,
    },
}

/// Outcome of a run.
#[derive(Debug)]
pub struct Report {
    /// Messages in the conversation at the end.
    pub messages: usize,
    /// Messages still flagged failed.
    pub failed: usize,
    /// Calls recorded by the transport.
    pub transport_calls: usize,
    /// Last sync snapshot version.
    pub sync_version: u64,
    /// Last typing snapshot version.
    pub typing_version: u64,
    /// Virtual time spent.
    pub elapsed: Duration,
}

/// Scenario parameters.
#[derive(Debug)]
pub struct Scenario {
    pub user: UserId,
    pub peer: UserId,
    pub conversation: ConversationId,
    pub rounds: usize,
}

struct Run {
    env: SimEnv,
    transport: Arc<SimTransport>,
    session: Session,
    invariants: InvariantRegistry,
    snapshot: SystemSnapshot,
}

impl Run {
    fn check(&mut self, step: &str) -> Result<(), ScenarioError> {
        self.snapshot.observe(self.session.sync.state(), self.session.typing.state());
        self.invariants
            .check_all(&self.snapshot)
            .map_err(|violations| ScenarioError::Invariants { step: step.to_string(), violations })
    }
}

impl Scenario {
    /// Play the script and report the final state.
    pub async fn run(&self) -> Result<Report, ScenarioError> {
        let env = SimEnv::new();
        let transport = Arc::new(
            SimTransport::new().with_echo(env.clone(), self.user.clone()).with_latency(LATENCY),
        );
        transport.set_conversations(vec![
            Conversation::new(self.conversation.clone()).with_title("Simulated conversation"),
        ]);

        let config = SyncConfig::for_user(self.user.clone());
        let session = Session::spawn(Arc::clone(&transport), env.clone(), &config);
        let mut run = Run {
            env,
            transport,
            session,
            invariants: InvariantRegistry::standard(),
            snapshot: SystemSnapshot::empty(),
        };

        run.session.sync.load_conversations().await?;
        run.session.open_conversation(self.conversation.clone()).await?;
        run.check("join")?;

        for round in 0..self.rounds {
            self.peer_says(&run, &format!("message {round} from {}", self.peer)).await;
            run.check("peer message")?;

            self.reply(&run, &format!("reply {round}")).await?;
            run.check("local reply")?;
        }

        let retried = self.send_through_outage(&run).await?;
        run.check("outage")?;
        tracing::info!(retried, "outage recovered");

        // Traffic while looking elsewhere is counted, then marked read.
        run.session.sync.set_active_conversation(None).await?;
        self.peer_says(&run, "are you there?").await;
        let unread = run.session.sync.state().unread_count(&self.conversation);
        tracing::info!(unread, "unread while away");
        let last = run.session.sync.state().messages(&self.conversation).last().and_then(|m| m.id.clone());
        if let Some(last) = last {
            run.session.sync.mark_as_read(self.conversation.clone(), last).await?;
        }
        run.check("mark read")?;

        let state = run.session.sync.state();
        let messages = state.messages(&self.conversation);
        let expected = self.rounds * 2 + 2;
        if messages.len() != expected {
            return Err(ScenarioError::MessageCount { expected, found: messages.len() });
        }

        let report = Report {
            messages: messages.len(),
            failed: messages.iter().filter(|m| m.has_failed).count(),
            transport_calls: run.transport.calls().len(),
            sync_version: state.version,
            typing_version: run.session.typing.state().version,
            elapsed: run.env.elapsed(),
        };

        run.session.close_conversation(self.conversation.clone()).await?;
        run.session.shutdown().await?;
        Ok(report)
    }

    /// Peer types for a while, then the message and the stop arrive.
    async fn peer_says(&self, run: &Run, content: &str) {
        let typing = FeedEvent::TypingStart { user_id: self.peer.clone() }.encode();
        run.transport.push_event(self.conversation.clone(), typing);
        run.env.sleep(PEER_TYPING).await;

        let id = format!("peer-{}", run.env.elapsed().as_millis());
        let message = Message::confirmed(
            id.into(),
            self.conversation.clone(),
            self.peer.clone(),
            content,
            run.env.wall_clock(),
        );
        run.transport.push_message(self.conversation.clone(), message);
        let stop = FeedEvent::TypingStop { user_id: self.peer.clone() }.encode();
        run.transport.push_event(self.conversation.clone(), stop);
        run.env.sleep(LATENCY).await;
    }

    /// Local user types, then sends.
    async fn reply(&self, run: &Run, content: &str) -> Result<(), ScenarioError> {
        run.session.typing.typing_started(self.conversation.clone()).await?;
        run.env.sleep(LOCAL_TYPING).await;
        run.session.typing.typing_stopped(self.conversation.clone()).await?;
        run.session.sync.send_text(self.conversation.clone(), content).await?;
        run.env.sleep(LATENCY).await;
        Ok(())
    }

    /// Send while the backend is unreachable, then retry every failed
    /// message. Returns how many were retried.
    async fn send_through_outage(&self, run: &Run) -> Result<usize, ScenarioError> {
        run.transport.fail_sends(Some(TransportError::Connection("simulated outage".into())));
        run.session.sync.send_text(self.conversation.clone(), "sent during outage").await?;
        run.transport.fail_sends(None);

        let failed: Vec<ClientId> = run
            .session
            .sync
            .state()
            .messages(&self.conversation)
            .iter()
            .filter(|m| m.has_failed)
            .filter_map(|m| m.client_id.clone())
            .collect();

        for client_id in &failed {
            run.session.sync.retry_message(self.conversation.clone(), client_id.clone()).await?;
        }
        run.env.sleep(LATENCY).await;
        Ok(failed.len())
    }
}
