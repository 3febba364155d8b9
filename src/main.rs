//! WeChat Message Hub - Main Entry Point
//!
//! Runs the callback webhook with a demo dispatcher that:
//! 1. Echoes text messages back to the sender
//! 2. Greets users on `subscribe`
//! 3. Acknowledges everything else without a reply
//!
//! ```text
//! WeChat / WeCom ──HTTPS──▶ Webhook (this) ──▶ MessageHub ──▶ Dispatcher
//! ```

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wechat_msg_hub::prelude::*;
use wechat_msg_hub::webhook;

/// Demo dispatcher
struct EchoDispatcher;

impl Dispatcher for EchoDispatcher {
    fn dispatch(&self, ctx: &DispatchContext<'_>, kind: &Classified) -> Option<Reply> {
        let user = ctx.message.from_user_name().unwrap_or("unknown");
        match kind {
            Classified::Message(msg_type) if msg_type == "text" => {
                let content = ctx.message.content()?;
                info!("💬 {} says {:?}", user, content);
                Some(Reply::text(content))
            }
            Classified::Event(event) if event == "subscribe" => {
                match ctx.message.event_key().filter(|k| !k.is_empty()) {
                    Some(scene) => info!("👋 {} subscribed via {}", user, scene),
                    None => info!("👋 {} subscribed", user),
                }
                Some(Reply::text("Welcome!"))
            }
            Classified::Message(msg_type) => {
                info!("Ignoring {} message from {}", msg_type, user);
                None
            }
            Classified::Event(event) => {
                info!("Ignoring {} event from {}", event, user);
                None
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,wechat_msg_hub=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 WeChat Message Hub starting...");

    // Load configuration
    let config = HubConfig::from_env()?;
    let credentials =
        CredentialStore::from_config(&config).context("Failed to load account credentials")?;
    info!(
        "📋 Configuration loaded: {} accounts, plaintext mode {:?}",
        credentials.len(),
        credentials.plaintext_mode()
    );
    for owner_id in credentials.owner_ids() {
        info!("   ↳ accepting callbacks for {}", owner_id);
    }

    let dispatcher: Box<dyn Dispatcher> = Box::new(EchoDispatcher);
    let hub = Arc::new(MessageHub::new(credentials, dispatcher).with_debug_mode(config.debug_mode));

    // Spawn webhook server
    let webhook_addr: SocketAddr = config
        .webhook_addr
        .parse()
        .with_context(|| format!("Invalid WEBHOOK_ADDR {}", config.webhook_addr))?;
    let webhook_server = spawn_webhook_server(webhook_addr, hub);

    info!("🌐 Webhook server listening on {}", config.webhook_addr);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => info!("📢 Shutdown signal received"),
        Err(err) => tracing::error!("Unable to listen for shutdown signal: {}", err),
    }

    info!("🛑 Shutting down server...");
    webhook_server.abort();

    info!("✅ WeChat Message Hub stopped");
    Ok(())
}

/// Spawn the webhook HTTP server
fn spawn_webhook_server(addr: SocketAddr, hub: webhook::SharedHub) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = webhook::run_server(addr, hub).await {
            tracing::error!("Webhook server error: {}", e);
        }
    })
}
