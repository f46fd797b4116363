//! Chat platform seam between the adapter and the pipeline/API.

use crate::InboundMessageEvent;
use crate::error::Result;
use futures::Stream;
use serde::Deserialize;
use std::pin::Pin;

/// Inbound event stream type.
pub type InboundStream = Pin<Box<dyn Stream<Item = InboundMessageEvent> + Send>>;

/// Options for an outbound send.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct SendOptions {
    /// Show a typing indicator, then pace the send by the persona's
    /// response delay.
    #[serde(default)]
    pub typing: bool,
}

/// A message the platform confirmed sending.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub message_id: String,
    pub channel_id: String,
}

/// Outbound send primitive implemented by platform adapters.
pub trait ChatSender: Send + Sync + 'static {
    /// Show the typing indicator in a channel.
    fn start_typing(
        &self,
        channel_id: &str,
    ) -> impl std::future::Future<Output = Result<()>> + Send;

    /// Send a message to a channel, honoring `options`.
    fn send_message(
        &self,
        channel_id: &str,
        content: &str,
        options: SendOptions,
    ) -> impl std::future::Future<Output = Result<SentMessage>> + Send;
}
