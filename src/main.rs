//! Relaybot CLI entry point.

use anyhow::Context as _;
use clap::Parser;
use futures::StreamExt as _;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "relaybot")]
#[command(about = "Relays Discord messages into an n8n automation engine, one officer persona per deployment")]
struct Cli {
    /// Officer persona to run (falls back to OFFICER_ID, then the builtin default)
    #[arg(short, long)]
    persona: Option<String>,

    /// Directory holding officers/ and knowledge-base/ (falls back to RELAYBOT_DIR)
    #[arg(long)]
    config_dir: Option<std::path::PathBuf>,

    /// Port for the local send API
    #[arg(long, default_value_t = 19777)]
    api_port: u16,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    tracing::info!("starting relaybot");

    let selector = relaybot::config::select_persona(cli.persona.as_deref());
    let config_dir = relaybot::config::resolve_config_dir(cli.config_dir.as_deref());

    let config = match relaybot::config::PersonaConfig::load(&selector, &config_dir) {
        Ok(config) => Arc::new(config),
        Err(error) => {
            tracing::error!(%error, persona = %selector, "failed to load persona configuration");
            std::process::exit(1);
        }
    };

    let routes = relaybot::routing::ChannelRouteTable::from_env();

    tracing::info!(
        officer = %config.name,
        rank = config.rank.as_deref().unwrap_or(""),
        callsign = %config.callsign_or_name(),
        webhook = %config.webhook.url(),
        "persona loaded"
    );
    if config.active_channels.is_empty() {
        tracing::info!("active channels: all (no restrictions)");
    } else {
        tracing::info!(
            channel_count = config.active_channels.len(),
            "active channels configured"
        );
    }
    if !routes.is_empty() {
        tracing::info!(route_count = routes.len(), "officer channel routes loaded");
    }

    let adapter = Arc::new(relaybot::messaging::discord::DiscordAdapter::new(
        &config.token,
        config.response_delay_ms,
    ));
    let mut events = adapter
        .start()
        .await
        .context("failed to start discord adapter")?;

    let dispatcher =
        relaybot::dispatch::WebhookDispatcher::new(config.webhook.clone(), config.debug_mode);
    let tracker = Arc::new(relaybot::conversation::ConversationTracker::new());
    let pipeline = Arc::new(relaybot::pipeline::Pipeline::new(
        config.clone(),
        routes,
        tracker,
        dispatcher,
        adapter.clone(),
    ));

    let api = relaybot::api::ApiServer::start(cli.api_port, adapter.clone())
        .await
        .context("failed to start send api")?;

    tracing::info!(officer = %config.name, "ready for operations");

    // One spawned handler per inbound event, bounded by the semaphore.
    let semaphore = Arc::new(tokio::sync::Semaphore::new(32));

    loop {
        tokio::select! {
            maybe_event = events.next() => {
                let Some(event) = maybe_event else {
                    tracing::warn!("discord event stream closed");
                    break;
                };

                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .context("event semaphore closed")?;
                let pipeline = pipeline.clone();

                tokio::spawn(async move {
                    pipeline.handle_message(event).await;
                    drop(permit);
                });
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutdown signal received");
                break;
            }
        }
    }

    api.shutdown().await;
    adapter.shutdown().await;

    tracing::info!("relaybot stopped");
    Ok(())
}
