//! Per-channel conversation state tracking.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Rolling per-channel summary. In-memory only; resets on restart.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConversationState {
    pub last_message_id: String,
    /// Unix milliseconds of the last recorded message.
    pub last_message_time: i64,
    pub message_count: u64,
}

/// Keyed store of per-channel state. Owned by the pipeline and shared via
/// `Arc`; writes are last-write-wins between interleaved handlers.
#[derive(Debug, Default)]
pub struct ConversationTracker {
    inner: Mutex<HashMap<String, ConversationState>>,
}

impl ConversationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a channel's state, if any message has been recorded.
    pub fn get(&self, channel_id: &str) -> Option<ConversationState> {
        self.lock().get(channel_id).cloned()
    }

    /// Record a successfully relayed message. Called only after dispatch
    /// succeeds so failed relays leave the state untouched.
    pub fn record(&self, channel_id: &str, message_id: &str, timestamp_ms: i64) {
        let mut guard = self.lock();
        let state = guard.entry(channel_id.to_string()).or_default();
        state.last_message_id = message_id.to_string();
        state.last_message_time = timestamp_ms;
        state.message_count += 1;
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, ConversationState>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
