//! HTTP boundary: provider webhooks in, one gateway round trip per request.

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Form, Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use crate::config::{BasicAuth, HttpConfig};
use crate::shutdown::Shutdown;
use crate::sms::event::SmsEvent;
use crate::sms::provider::SmsProvider;

const AUTH_CHALLENGE: &str = "Basic realm=\"smsxmpp\"";

/// Shared state for the webhook handlers.
#[derive(Clone)]
pub struct SmsState {
    pub provider: Arc<dyn SmsProvider>,
    /// Queue into the gateway loop.
    pub gateway_tx: mpsc::Sender<SmsEvent>,
    /// When Some, requests must carry matching basic auth.
    pub auth: Option<BasicAuth>,
}

pub fn router(state: SmsState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/sms", post(sms_webhook))
        .with_state(state)
}

/// Bind the configured HTTP address.
pub async fn bind_http(http: &HttpConfig) -> Result<TcpListener> {
    let bind_addr = format!("{}:{}", http.host.trim(), http.port);
    TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))
}

/// Serve webhooks on `listener` until shutdown.
pub async fn serve_http(listener: TcpListener, state: SmsState, mut shutdown: Shutdown) -> Result<()> {
    if let Ok(addr) = listener.local_addr() {
        log::info!("http: listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await
        .context("http server exited")?;
    log::info!("http: stopped");
    Ok(())
}

fn authorized(expected: &BasicAuth, headers: &HeaderMap) -> bool {
    let Some(encoded) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
    else {
        return false;
    };
    let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
        return false;
    };
    let Ok(decoded) = String::from_utf8(decoded) else {
        return false;
    };
    match decoded.split_once(':') {
        Some((user, pass)) => user == expected.username && pass == expected.password,
        None => false,
    }
}

/// POST /sms: decode the provider's form, hand it to the gateway, wait for the outcome.
async fn sms_webhook(
    State(state): State<SmsState>,
    headers: HeaderMap,
    form: Result<Form<HashMap<String, String>>, FormRejection>,
) -> Response {
    if let Some(ref expected) = state.auth {
        if !authorized(expected, &headers) {
            return (
                StatusCode::UNAUTHORIZED,
                [(header::WWW_AUTHENTICATE, AUTH_CHALLENGE)],
            )
                .into_response();
        }
    }
    let Ok(Form(form)) = form else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let rx = match state.provider.decode_webhook(&form) {
        Ok(rx) => rx,
        Err(e) => {
            log::warn!("http: undecodable {} webhook: {}", state.provider.name(), e);
            return StatusCode::BAD_REQUEST.into_response();
        }
    };

    let (event, outcome) = SmsEvent::new(rx);
    if state.gateway_tx.send(event).await.is_err() {
        log::warn!("http: gateway queue closed");
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    match outcome.await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => {
            log::warn!("http: gateway rejected SMS event: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
        Err(_) => {
            log::warn!("http: gateway stopped before replying");
            StatusCode::SERVICE_UNAVAILABLE.into_response()
        }
    }
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<SmsState>) -> Json<serde_json::Value> {
    Json(json!({
        "runtime": "running",
        "provider": state.provider.name(),
    }))
}
