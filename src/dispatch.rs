//! Webhook dispatch to the automation engine.

use crate::config::{DEFAULT_WEBHOOK_BASE, WebhookTarget};
use crate::error::{Error, Result};
use crate::payload::OutboundWebhookPayload;

/// Result of a dispatch attempt that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The engine accepted the payload; carries whatever JSON body it returned.
    Delivered(serde_json::Value),
    /// Debug short-circuit: the payload was logged locally, no network call.
    DevMode,
}

/// POSTs event payloads at the configured webhook target.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    target: WebhookTarget,
    debug_mode: bool,
}

impl WebhookDispatcher {
    pub fn new(target: WebhookTarget, debug_mode: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            target,
            debug_mode,
        }
    }

    /// Deliver one payload. No retries and no explicit timeout; failures
    /// surface as errors for the pipeline to absorb per message.
    pub async fn dispatch(&self, payload: &OutboundWebhookPayload) -> Result<DispatchOutcome> {
        if self.is_dev_mode() {
            let rendered = serde_json::to_string_pretty(payload).unwrap_or_default();
            tracing::info!(payload = %rendered, "dev mode, skipping webhook delivery");
            return Ok(DispatchOutcome::DevMode);
        }

        let url = self.target.url();
        let response = self
            .client
            .post(&url)
            .json(payload)
            .send()
            .await
            .map_err(|source| Error::WebhookUnreachable { source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::WebhookRejected {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        // An empty 2xx body is fine; treat it as null.
        let body = response
            .json::<serde_json::Value>()
            .await
            .unwrap_or(serde_json::Value::Null);

        Ok(DispatchOutcome::Delivered(body))
    }

    /// Dev mode holds when debugging against the local placeholder with no
    /// production override configured.
    fn is_dev_mode(&self) -> bool {
        self.debug_mode
            && self.target.base_url == DEFAULT_WEBHOOK_BASE
            && self.target.prod_url.is_none()
    }
}
