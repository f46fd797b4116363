//! Per-event relay orchestration.

use crate::InboundMessageEvent;
use crate::config::PersonaConfig;
use crate::conversation::ConversationTracker;
use crate::dispatch::{DispatchOutcome, WebhookDispatcher};
use crate::messaging::traits::{ChatSender, SendOptions};
use crate::payload::OutboundWebhookPayload;
use crate::policy;
use crate::routing::ChannelRouteTable;

use std::sync::Arc;

/// Wires one inbound event through filter, classification, payload assembly,
/// dispatch, and state tracking. Owns the conversation store.
pub struct Pipeline<S: ChatSender> {
    config: Arc<PersonaConfig>,
    routes: ChannelRouteTable,
    tracker: Arc<ConversationTracker>,
    dispatcher: WebhookDispatcher,
    sender: Arc<S>,
}

impl<S: ChatSender> Pipeline<S> {
    pub fn new(
        config: Arc<PersonaConfig>,
        routes: ChannelRouteTable,
        tracker: Arc<ConversationTracker>,
        dispatcher: WebhookDispatcher,
        sender: Arc<S>,
    ) -> Self {
        Self {
            config,
            routes,
            tracker,
            dispatcher,
            sender,
        }
    }

    pub fn tracker(&self) -> &Arc<ConversationTracker> {
        &self.tracker
    }

    /// Relay one inbound event end to end. Never returns an error: relay
    /// failures are absorbed here with an in-character reply.
    pub async fn handle_message(&self, event: InboundMessageEvent) {
        if !policy::should_process(&event, &self.config) {
            return;
        }

        tracing::debug!(
            author = %event.author_username,
            channel = %event.channel_name,
            content = %event.content,
            "inbound message"
        );

        // Typing feedback while the engine works. Best effort.
        if let Err(error) = self.sender.start_typing(&event.channel_id).await {
            tracing::debug!(%error, channel_id = %event.channel_id, "failed to show typing indicator");
        }

        let channel_role = self.routes.role_for(&event.channel_id).to_string();
        let is_commander =
            policy::role_name_contains_any(&event.author_role_names, &self.config.command_roles);

        let snapshot = self.tracker.get(&event.channel_id);
        let payload = OutboundWebhookPayload::build(
            &event,
            &self.config,
            &channel_role,
            is_commander,
            snapshot.as_ref(),
        );

        match self.dispatcher.dispatch(&payload).await {
            Ok(DispatchOutcome::Delivered(_)) | Ok(DispatchOutcome::DevMode) => {
                tracing::debug!(message_id = %event.id, "message relayed to engine");
                self.tracker.record(
                    &event.channel_id,
                    &event.id,
                    chrono::Utc::now().timestamp_millis(),
                );
            }
            Err(error) => {
                tracing::error!(%error, message_id = %event.id, "failed to relay message");
                self.send_fallback_reply(&event.channel_id).await;
            }
        }
    }

    async fn send_fallback_reply(&self, channel_id: &str) {
        let reply = fallback_reply(&self.config);
        if let Err(error) = self
            .sender
            .send_message(channel_id, &reply, SendOptions::default())
            .await
        {
            tracing::error!(%error, channel_id = %channel_id, "failed to send fallback reply");
        }
    }
}

/// Render the persona's in-character failure reply, substituting the callsign
/// placeholder in its template when one is configured.
fn fallback_reply(config: &PersonaConfig) -> String {
    let callsign = config.callsign_or_name();
    match &config.error_message {
        Some(template) => template.replace("{{ officer.callsign }}", callsign),
        None => format!(
            "{callsign} here. I'm experiencing technical difficulties. \
             My communications systems are temporarily degraded. Stand by."
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WebhookTarget;
    use crate::messaging::traits::SentMessage;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSender {
        typing: Mutex<Vec<String>>,
        sent: Mutex<Vec<(String, String)>>,
    }

    impl ChatSender for MockSender {
        async fn start_typing(&self, channel_id: &str) -> crate::Result<()> {
            self.typing.lock().unwrap().push(channel_id.to_string());
            Ok(())
        }

        async fn send_message(
            &self,
            channel_id: &str,
            content: &str,
            _options: SendOptions,
        ) -> crate::Result<SentMessage> {
            self.sent
                .lock()
                .unwrap()
                .push((channel_id.to_string(), content.to_string()));
            Ok(SentMessage {
                message_id: "reply-1".into(),
                channel_id: channel_id.to_string(),
            })
        }
    }

    fn config(base_url: &str, active_channels: &[&str]) -> PersonaConfig {
        PersonaConfig {
            id: "torres".into(),
            name: "Major Torres".into(),
            rank: Some("Major".into()),
            role: Some("Intelligence Officer".into()),
            callsign: Some("Spyglass".into()),
            division: Some("Intelligence".into()),
            token: "t".into(),
            client_id: None,
            webhook: WebhookTarget {
                base_url: base_url.into(),
                path: "/webhook/torres".into(),
                prod_url: None,
            },
            response_delay_ms: 0,
            debug_mode: false,
            active_channels: active_channels.iter().map(|c| c.to_string()).collect(),
            command_roles: vec!["Commander".into(), "Command Staff".into()],
            error_message: None,
            personality: None,
            organization: None,
            knowledge_base: Default::default(),
        }
    }

    fn pipeline(
        config: PersonaConfig,
        sender: Arc<MockSender>,
    ) -> Pipeline<MockSender> {
        let dispatcher = WebhookDispatcher::new(config.webhook.clone(), config.debug_mode);
        Pipeline::new(
            Arc::new(config),
            ChannelRouteTable::default(),
            Arc::new(ConversationTracker::new()),
            dispatcher,
            sender,
        )
    }

    fn event(channel_id: &str, message_id: &str) -> InboundMessageEvent {
        InboundMessageEvent {
            id: message_id.into(),
            content: "status report".into(),
            channel_id: channel_id.into(),
            channel_name: "ops".into(),
            guild_id: Some("guild-1".into()),
            author_id: "user-1".into(),
            author_username: "rook".into(),
            author_display_name: "Rook".into(),
            author_is_bot: false,
            author_role_names: vec!["Fleet Commander".into()],
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_successful_relays_accumulate_state() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/webhook/torres");
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let sender = Arc::new(MockSender::default());
        let pipeline = pipeline(config(&server.base_url(), &[]), sender.clone());

        pipeline.handle_message(event("chan-1", "m1")).await;
        pipeline.handle_message(event("chan-1", "m2")).await;
        pipeline.handle_message(event("chan-1", "m3")).await;

        assert_eq!(mock.hits_async().await, 3);
        let state = pipeline.tracker().get("chan-1").unwrap();
        assert_eq!(state.message_count, 3);
        assert_eq!(state.last_message_id, "m3");
        // Typing was shown per message, no fallback reply was sent.
        assert_eq!(sender.typing.lock().unwrap().len(), 3);
        assert!(sender.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_dispatch_leaves_state_and_replies_in_character() {
        let server = httpmock::MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/webhook/torres");
                then.status(500);
            })
            .await;

        let sender = Arc::new(MockSender::default());
        let pipeline = pipeline(config(&server.base_url(), &[]), sender.clone());

        pipeline.handle_message(event("chan-1", "m1")).await;

        assert!(pipeline.tracker().get("chan-1").is_none());

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "chan-1");
        assert!(sent[0].1.starts_with("Spyglass here."));
        assert!(sent[0].1.contains("technical difficulties"));
    }

    #[tokio::test]
    async fn test_fallback_uses_persona_template() {
        let sender = Arc::new(MockSender::default());
        let mut config = config("http://127.0.0.1:1", &[]);
        config.error_message =
            Some("{{ officer.callsign }} reporting. Relay is down. Stand by.".into());
        let pipeline = pipeline(config, sender.clone());

        pipeline.handle_message(event("chan-1", "m1")).await;

        let sent = sender.sent.lock().unwrap();
        assert_eq!(sent[0].1, "Spyglass reporting. Relay is down. Stand by.");
    }

    #[tokio::test]
    async fn test_allow_list_blocks_dispatch_and_state() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/webhook/torres");
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let sender = Arc::new(MockSender::default());
        let pipeline = pipeline(config(&server.base_url(), &["chan-1"]), sender.clone());

        pipeline.handle_message(event("chan-2", "m1")).await;

        assert_eq!(mock.hits_async().await, 0);
        assert!(pipeline.tracker().get("chan-2").is_none());
        // Rejected before any side effect: no typing either.
        assert!(sender.typing.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bot_author_ignored() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST).path("/webhook/torres");
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let sender = Arc::new(MockSender::default());
        let pipeline = pipeline(config(&server.base_url(), &[]), sender.clone());

        let mut bot_event = event("chan-1", "m1");
        bot_event.author_is_bot = true;
        pipeline.handle_message(bot_event).await;

        assert_eq!(mock.hits_async().await, 0);
        assert!(pipeline.tracker().get("chan-1").is_none());
    }

    #[tokio::test]
    async fn test_payload_carries_commander_flag_and_channel_role() {
        let server = httpmock::MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(httpmock::Method::POST)
                    .path("/webhook/torres")
                    .json_body_includes(
                        r#"{ "author": { "isCommander": true }, "channelRole": "unrestricted" }"#,
                    );
                then.status(200).json_body(serde_json::json!({}));
            })
            .await;

        let sender = Arc::new(MockSender::default());
        let pipeline = pipeline(config(&server.base_url(), &[]), sender);

        pipeline.handle_message(event("chan-1", "m1")).await;
        mock.assert_async().await;
    }
}
