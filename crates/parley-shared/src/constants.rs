/// Prefix of per-channel (and per-thread) bus topics.
pub const CHANNEL_TOPIC_PREFIX: &str = "channel:";

/// Infix separating a channel topic from its thread suffix.
pub const THREAD_TOPIC_INFIX: &str = ":thread:";

/// Prefix of the global per-user topic.
pub const USER_STATE_TOPIC_PREFIX: &str = "user-state:";

/// Sequence id meaning "nothing seen yet"; disables the gap check for the
/// first delivered event.
pub const UNSEEN_SEQUENCE_ID: i64 = -1;

/// Default capacity of the inbound bus envelope queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default REST request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default base URL of the chat REST API.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";
