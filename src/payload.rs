//! Outbound webhook payload assembly.

use crate::InboundMessageEvent;
use crate::config::PersonaConfig;
use crate::conversation::ConversationState;

use chrono::SecondsFormat;
use serde::Serialize;

/// The event document POSTed to the automation engine.
///
/// Field names follow the engine's wire contract (camelCase, except the
/// `config` block whose keys come straight from the persona YAML).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundWebhookPayload {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub timestamp: String,
    pub officer: OfficerBlock,
    pub message: MessageBlock,
    pub author: AuthorBlock,
    pub channel_role: String,
    pub conversation_context: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<EngineConfigBlock>,
}

/// Persona identity as presented to the engine.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OfficerBlock {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub callsign: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub division: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageBlock {
    pub id: String,
    pub content: String,
    pub channel_id: String,
    pub channel_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guild_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorBlock {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub is_commander: bool,
}

/// Persona documents the engine uses to build its system prompt. Keys stay
/// snake_case to match the YAML documents they are lifted from.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfigBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub personality: Option<serde_yaml::Value>,
    pub knowledge_base: std::collections::BTreeMap<String, serde_yaml::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization: Option<serde_yaml::Value>,
}

impl OutboundWebhookPayload {
    /// Assemble the payload for one inbound event. Deterministic apart from
    /// the timestamp, which is taken at build time.
    pub fn build(
        event: &InboundMessageEvent,
        config: &PersonaConfig,
        channel_role: &str,
        is_commander: bool,
        conversation: Option<&ConversationState>,
    ) -> Self {
        let conversation_context = conversation
            .and_then(|state| serde_json::to_value(state).ok())
            .unwrap_or_else(empty_object);

        let engine_config = config.has_engine_config().then(|| EngineConfigBlock {
            personality: config.personality.clone(),
            knowledge_base: config.knowledge_base.clone(),
            organization: config.organization.clone(),
        });

        Self {
            kind: "discord_message",
            timestamp: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            officer: OfficerBlock {
                id: config.id.clone(),
                name: config.name.clone(),
                rank: config.rank.clone(),
                role: config.role.clone(),
                callsign: config.callsign.clone(),
                division: config.division.clone(),
            },
            message: MessageBlock {
                id: event.id.clone(),
                content: event.content.clone(),
                channel_id: event.channel_id.clone(),
                channel_name: event.channel_name.clone(),
                guild_id: event.guild_id.clone(),
            },
            author: AuthorBlock {
                id: event.author_id.clone(),
                username: event.author_username.clone(),
                display_name: event.author_display_name.clone(),
                is_commander,
            },
            channel_role: channel_role.to_string(),
            conversation_context,
            config: engine_config,
        }
    }
}

fn empty_object() -> serde_json::Value {
    serde_json::Value::Object(serde_json::Map::new())
}
