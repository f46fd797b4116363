//! Send API: the HTTP surface the automation engine calls back into.
//!
//! The engine replies to relayed messages by POSTing `/send` with a channel
//! id and content; the adapter delivers it into Discord with optional typing
//! pacing. The caller contract is the JSON envelope, not the status code.

use crate::messaging::traits::{ChatSender, SendOptions};

use anyhow::Context as _;
use axum::Router;
use axum::extract::{Json, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Running send API server handle.
pub struct ApiServer {
    addr: SocketAddr,
    shutdown_tx: mpsc::Sender<()>,
}

/// Shared state for axum handlers.
struct AppState<S: ChatSender> {
    sender: Arc<S>,
}

impl<S: ChatSender> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

/// Inbound send command body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SendRequest {
    channel_id: String,
    content: String,
    #[serde(default)]
    options: SendOptions,
}

/// Send result envelope.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SendResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    channel_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl ApiServer {
    /// Bind `127.0.0.1:<port>` and serve the send API in a background task.
    pub async fn start<S: ChatSender>(port: u16, sender: Arc<S>) -> crate::Result<Self> {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let state = AppState { sender };
        let app = Router::new()
            .route("/send", post(handle_send::<S>))
            .route("/health", get(handle_health))
            .with_state(state);

        let bind = format!("127.0.0.1:{port}");
        let listener = tokio::net::TcpListener::bind(&bind)
            .await
            .with_context(|| format!("failed to bind send api to {bind}"))?;
        let addr = listener
            .local_addr()
            .context("failed to read send api local addr")?;
        tracing::info!(%addr, "send api listening");

        tokio::spawn(async move {
            if let Err(error) = axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    let _ = shutdown_rx.recv().await;
                })
                .await
            {
                tracing::error!(%error, "send api exited with error");
            }
        });

        Ok(Self { addr, shutdown_tx })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub async fn shutdown(&self) {
        self.shutdown_tx.send(()).await.ok();
        tracing::info!("send api shut down");
    }
}

// -- Axum handlers --

async fn handle_send<S: ChatSender>(
    State(state): State<AppState<S>>,
    Json(request): Json<SendRequest>,
) -> Json<SendResponse> {
    match state
        .sender
        .send_message(&request.channel_id, &request.content, request.options)
        .await
    {
        Ok(sent) => Json(SendResponse {
            success: true,
            message_id: Some(sent.message_id),
            channel_id: Some(sent.channel_id),
            error: None,
        }),
        Err(error) => {
            tracing::error!(%error, channel_id = %request.channel_id, "send api delivery failed");
            Json(SendResponse {
                success: false,
                message_id: None,
                channel_id: None,
                error: Some(error.to_string()),
            })
        }
    }
}

async fn handle_health() -> StatusCode {
    StatusCode::OK
}
