//! Error taxonomy for relaybot.

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by relaybot.
///
/// The first three variants are fatal at startup: the process refuses to
/// come up with a broken persona. Webhook variants are recoverable per
/// message and trigger the in-character fallback reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The selected persona has no definition file beneath the config dir.
    #[error("persona config not found at {path}")]
    ConfigNotFound { path: std::path::PathBuf },

    /// The persona definition failed validation.
    #[error("invalid persona config: {reason}")]
    ConfigInvalid { reason: String },

    /// A required secret env var is unset or empty.
    #[error("secret env var {var} is not set")]
    SecretMissing { var: String },

    /// The automation engine answered with a non-2xx status.
    #[error("webhook rejected with status {status}: {reason}")]
    WebhookRejected { status: u16, reason: String },

    /// The webhook endpoint could not be reached at all.
    #[error("webhook unreachable: {source}")]
    WebhookUnreachable {
        #[source]
        source: reqwest::Error,
    },

    /// A channel id does not resolve to a postable guild text channel.
    #[error("invalid channel: {channel_id}")]
    ChannelInvalid { channel_id: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Whether this error should abort startup rather than be retried or
    /// absorbed per message.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ConfigNotFound { .. } | Error::ConfigInvalid { .. } | Error::SecretMissing { .. }
        )
    }
}
