//! Webhook HTTP handlers
//!
//! - `GET /callback/{owner_id}`: URL verification during setup
//! - `POST /callback/{owner_id}`: message and event callbacks
//!
//! Callbacks always answer 200: either the hub's reply or `success`.

use axum::{
    Router,
    body::{Body, Bytes},
    extract::{Path, Query, State, rejection::QueryRejection},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::get,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::hub::{Dispatcher, MessageHub};
use crate::types::{CallbackParams, SUCCESS_REPLY, VerifyParams};

/// Hub shared by all handlers
pub type SharedHub = Arc<MessageHub<Box<dyn Dispatcher>>>;

/// Webhook server state
#[derive(Clone)]
pub struct WebhookState {
    pub hub: SharedHub,
}

/// Build the webhook router
pub fn router(hub: SharedHub) -> Router {
    Router::new()
        .route("/callback/{owner_id}", get(verify_url).post(handle_callback))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(log_request))
        .with_state(WebhookState { hub })
}

/// Run the webhook HTTP server
pub async fn run_server(addr: SocketAddr, hub: SharedHub) -> anyhow::Result<()> {
    let app = router(hub);

    info!("🔌 Webhook server starting on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

/// Middleware to log all incoming HTTP requests
async fn log_request(req: Request<Body>, next: Next) -> Response {
    let method = req.method().clone();
    let uri = req.uri().clone();

    info!("🌐 HTTP {} {}", method, uri.path());
    debug!("Query: {}", uri.query().unwrap_or_default());

    let response = next.run(req).await;

    info!("📤 Response status: {}", response.status());

    response
}

/// URL verification (GET request)
///
/// Must answer with exactly the recovered echo string, no quotes or XML.
async fn verify_url(
    State(state): State<WebhookState>,
    Path(owner_id): Path<String>,
    Query(params): Query<VerifyParams>,
) -> Result<String, StatusCode> {
    info!(
        "📥 URL verification for {}: timestamp={}, nonce={}, echostr_len={}",
        owner_id,
        params.timestamp,
        params.nonce,
        params.echostr.len()
    );

    match state.hub.verify_url(&owner_id, &params) {
        Ok(echo) => Ok(echo),
        Err(e) => {
            warn!("URL verification failed for {}: {}", owner_id, e);
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Callback (POST request)
async fn handle_callback(
    State(state): State<WebhookState>,
    Path(owner_id): Path<String>,
    params: Result<Query<CallbackParams>, QueryRejection>,
    body: Bytes,
) -> String {
    let params = match params {
        Ok(Query(params)) => params,
        Err(e) => {
            warn!("Callback for {} with unusable query: {}", owner_id, e);
            return SUCCESS_REPLY.to_string();
        }
    };

    info!(
        "📥 Callback for {}: timestamp={}, nonce={}, encrypt_type={:?}, openid={:?}",
        owner_id, params.timestamp, params.nonce, params.encrypt_type, params.openid
    );
    debug!("Request body length: {} bytes", body.len());

    let body = String::from_utf8_lossy(&body).into_owned();
    let hub = state.hub.clone();

    // dispatchers may block; keep them off the async workers
    match tokio::task::spawn_blocking(move || hub.handle(&owner_id, &body, &params)).await {
        Ok(Some(reply)) => reply,
        Ok(None) => SUCCESS_REPLY.to_string(),
        Err(e) => {
            error!("Callback worker failed: {}", e);
            SUCCESS_REPLY.to_string()
        }
    }
}
