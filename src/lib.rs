//! Relaybot: relays Discord messages into an n8n automation engine, one officer persona per deployment.

pub mod api;
pub mod config;
pub mod conversation;
pub mod dispatch;
pub mod error;
pub mod messaging;
pub mod payload;
pub mod pipeline;
pub mod policy;
pub mod routing;

pub use error::{Error, Result};

use serde::{Deserialize, Serialize};

/// Inbound message event normalized from the chat platform.
///
/// Everything downstream of the adapter (filter, classifier, payload builder)
/// consumes this instead of serenity types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessageEvent {
    /// Platform message id.
    pub id: String,
    pub content: String,
    pub channel_id: String,
    pub channel_name: String,
    /// None for direct messages.
    pub guild_id: Option<String>,
    pub author_id: String,
    pub author_username: String,
    pub author_display_name: String,
    pub author_is_bot: bool,
    /// Guild role names held by the author, in guild order.
    pub author_role_names: Vec<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}
