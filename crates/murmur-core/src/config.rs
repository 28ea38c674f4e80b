//! Sync and typing configuration.

use std::time::Duration;

use murmur_proto::UserId;

/// Quiet period before a local typing signal is sent.
pub const DEFAULT_TYPING_DEBOUNCE: Duration = Duration::from_millis(500);

/// Time after a start signal before the local session stops on its own.
pub const DEFAULT_TYPING_AUTO_STOP: Duration = Duration::from_secs(5);

/// Time after which a remote typing indicator expires without a stop event.
pub const DEFAULT_REMOTE_TYPING_EXPIRY: Duration = Duration::from_secs(10);

/// Granularity of the typing timer producer.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Capacity of each component's intent mailbox.
pub const DEFAULT_MAILBOX_CAPACITY: usize = 256;

/// Typing coordinator timing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypingConfig {
    /// Debounce delay before a start call
    pub debounce: Duration,
    /// Auto-stop delay after a start call
    pub auto_stop: Duration,
    /// Expiry of remote typing indicators
    pub remote_expiry: Duration,
    /// Timer producer interval (should be well below `debounce`)
    pub tick_interval: Duration,
}

impl Default for TypingConfig {
    fn default() -> Self {
        Self {
            debounce: DEFAULT_TYPING_DEBOUNCE,
            auto_stop: DEFAULT_TYPING_AUTO_STOP,
            remote_expiry: DEFAULT_REMOTE_TYPING_EXPIRY,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

/// Client session configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Local user, stamped as sender on optimistic messages
    pub user_id: UserId,
    /// Intent mailbox capacity per component
    pub mailbox_capacity: usize,
    /// Typing timing
    pub typing: TypingConfig,
}

impl SyncConfig {
    /// Default configuration for the given local user.
    pub fn for_user(user_id: impl Into<UserId>) -> Self {
        Self { user_id: user_id.into(), ..Self::default() }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            user_id: UserId::default(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
            typing: TypingConfig::default(),
        }
    }
}
