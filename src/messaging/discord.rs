//! Discord messaging adapter using serenity.

use crate::InboundMessageEvent;
use crate::error::{Error, Result};
use crate::messaging::traits::{ChatSender, InboundStream, SendOptions, SentMessage};

use anyhow::Context as _;
use async_trait::async_trait;
use serenity::all::{
    ChannelId, ChannelType, Context, EventHandler, GatewayIntents, Http, Message, Ready,
    ShardManager, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};

/// Discord adapter state.
pub struct DiscordAdapter {
    token: String,
    /// Pacing delay applied before paced sends.
    response_delay: Duration,
    http: Arc<RwLock<Option<Arc<Http>>>>,
    bot_user_id: Arc<RwLock<Option<UserId>>>,
    shard_manager: Arc<RwLock<Option<Arc<ShardManager>>>>,
}

impl DiscordAdapter {
    pub fn new(token: impl Into<String>, response_delay_ms: u64) -> Self {
        Self {
            token: token.into(),
            response_delay: Duration::from_millis(response_delay_ms),
            http: Arc::new(RwLock::new(None)),
            bot_user_id: Arc::new(RwLock::new(None)),
            shard_manager: Arc::new(RwLock::new(None)),
        }
    }

    /// Connect to the gateway and return the inbound event stream.
    pub async fn start(&self) -> Result<InboundStream> {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);

        let handler = Handler {
            inbound_tx,
            http_slot: self.http.clone(),
            bot_user_id_slot: self.bot_user_id.clone(),
        };

        let intents =
            GatewayIntents::GUILDS | GatewayIntents::GUILD_MESSAGES | GatewayIntents::MESSAGE_CONTENT;

        let mut client = serenity::Client::builder(&self.token, intents)
            .event_handler(handler)
            .await
            .context("failed to build discord client")?;

        *self.http.write().await = Some(client.http.clone());
        *self.shard_manager.write().await = Some(client.shard_manager.clone());

        tokio::spawn(async move {
            if let Err(error) = client.start().await {
                tracing::error!(%error, "discord gateway error");
            }
        });

        let stream = tokio_stream::wrappers::ReceiverStream::new(inbound_rx);
        Ok(Box::pin(stream))
    }

    /// Graceful shutdown of the gateway connection.
    pub async fn shutdown(&self) {
        if let Some(shard_manager) = self.shard_manager.read().await.as_ref() {
            shard_manager.shutdown_all().await;
        }
        tracing::info!("discord adapter shut down");
    }

    async fn get_http(&self) -> anyhow::Result<Arc<Http>> {
        self.http
            .read()
            .await
            .clone()
            .context("discord not connected")
    }

    /// Resolve a raw channel id into a postable guild text channel or thread.
    async fn resolve_text_channel(&self, http: &Http, channel_id: &str) -> Result<ChannelId> {
        let invalid = || Error::ChannelInvalid {
            channel_id: channel_id.to_string(),
        };

        let id: u64 = channel_id.parse().map_err(|_| invalid())?;
        if id == 0 {
            return Err(invalid());
        }

        let channel = ChannelId::new(id)
            .to_channel(http)
            .await
            .map_err(|_| invalid())?;

        let Some(guild_channel) = channel.guild() else {
            return Err(invalid());
        };

        match guild_channel.kind {
            ChannelType::Text
            | ChannelType::News
            | ChannelType::PublicThread
            | ChannelType::PrivateThread => Ok(guild_channel.id),
            _ => Err(invalid()),
        }
    }
}

impl ChatSender for DiscordAdapter {
    async fn start_typing(&self, channel_id: &str) -> Result<()> {
        let http = self.get_http().await?;
        let channel = self.resolve_text_channel(&http, channel_id).await?;
        channel
            .broadcast_typing(&*http)
            .await
            .context("failed to broadcast typing")?;
        Ok(())
    }

    async fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        options: SendOptions,
    ) -> Result<SentMessage> {
        let http = self.get_http().await?;
        let channel = self.resolve_text_channel(&http, channel_id).await?;

        if options.typing {
            channel
                .broadcast_typing(&*http)
                .await
                .context("failed to broadcast typing")?;
            tokio::time::sleep(self.response_delay).await;
        }

        let message = channel
            .say(&*http, content)
            .await
            .context("failed to send discord message")?;

        Ok(SentMessage {
            message_id: message.id.to_string(),
            channel_id: channel.to_string(),
        })
    }
}

// -- Serenity EventHandler --

struct Handler {
    inbound_tx: mpsc::Sender<InboundMessageEvent>,
    http_slot: Arc<RwLock<Option<Arc<Http>>>>,
    bot_user_id_slot: Arc<RwLock<Option<UserId>>>,
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!(
            bot_name = %ready.user.name,
            guild_count = ready.guilds.len(),
            "discord connected"
        );

        *self.http_slot.write().await = Some(ctx.http.clone());
        *self.bot_user_id_slot.write().await = Some(ready.user.id);
    }

    async fn message(&self, ctx: Context, message: Message) {
        // The bot flag covers other bots; the id check covers ourselves even
        // before Discord tags our user. The filter decides, not the adapter.
        let bot_user_id = *self.bot_user_id_slot.read().await;
        let author_is_bot =
            message.author.bot || bot_user_id.is_some_and(|id| message.author.id == id);

        let event = build_event(&ctx, &message, author_is_bot).await;

        if let Err(error) = self.inbound_tx.send(event).await {
            tracing::warn!(
                %error,
                "failed to forward inbound discord message (receiver dropped)"
            );
        }
    }
}

// -- Helper functions --

async fn build_event(ctx: &Context, message: &Message, author_is_bot: bool) -> InboundMessageEvent {
    // Display name: member nickname > global display name > username
    let display_name = message
        .member
        .as_ref()
        .and_then(|member| member.nick.clone())
        .or_else(|| message.author.global_name.clone())
        .unwrap_or_else(|| message.author.name.clone());

    let channel_name = match message.channel_id.to_channel(&ctx.http).await {
        Ok(channel) => channel
            .guild()
            .map(|guild_channel| guild_channel.name)
            .unwrap_or_default(),
        Err(_) => String::new(),
    };

    InboundMessageEvent {
        id: message.id.to_string(),
        content: message.content.clone(),
        channel_id: message.channel_id.to_string(),
        channel_name,
        guild_id: message.guild_id.map(|id| id.to_string()),
        author_id: message.author.id.to_string(),
        author_username: message.author.name.clone(),
        author_display_name: display_name,
        author_is_bot,
        author_role_names: resolve_role_names(ctx, message).await,
        timestamp: *message.timestamp,
    }
}

/// Resolve the author's role ids against the guild role list. Empty for DMs
/// or when the guild lookup fails.
async fn resolve_role_names(ctx: &Context, message: &Message) -> Vec<String> {
    let (Some(guild_id), Some(member)) = (message.guild_id, message.member.as_ref()) else {
        return Vec::new();
    };

    let Ok(guild) = guild_id.to_partial_guild(&ctx.http).await else {
        return Vec::new();
    };

    member
        .roles
        .iter()
        .filter_map(|role_id| guild.roles.get(role_id).map(|role| role.name.clone()))
        .collect()
}
