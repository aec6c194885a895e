use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{rejection::FormRejection, Form, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha1::Sha1;
use subtle::ConstantTimeEq;
use tracing::{error, info, warn};

use crate::message::{Message, TwilioForm};
use crate::pipeline::MessageHandler;

type HmacSha1 = Hmac<Sha1>;

const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Credentials for checking that a request really came from Twilio.
#[derive(Debug, Clone)]
pub struct SignatureCheck {
    pub auth_token: String,
    /// The exact URL Twilio was configured to call
    pub public_url: String,
}

#[derive(Clone)]
pub struct AppState {
    pub handler: Arc<dyn MessageHandler>,
    pub signature: Option<SignatureCheck>,
}

/// Twilio's request signature: base64(HMAC-SHA1(token, url + sorted key/value pairs)).
pub(crate) fn twilio_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Option<Vec<u8>> {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut payload = url.to_string();
    for (key, value) in sorted {
        payload.push_str(key);
        payload.push_str(value);
    }

    let mut mac = HmacSha1::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(payload.as_bytes());
    Some(mac.finalize().into_bytes().to_vec())
}

/// Constant-time check of an `X-Twilio-Signature` header value.
pub fn verify_signature(check: &SignatureCheck, params: &[(String, String)], header: &str) -> bool {
    let received = match STANDARD.decode(header.trim()) {
        Ok(sig) => sig,
        Err(e) => {
            warn!("Failed to decode signature: {}", e);
            return false;
        }
    };

    let Some(expected) = twilio_signature(&check.auth_token, &check.public_url, params) else {
        error!("Failed to create HMAC instance");
        return false;
    };
    expected.ct_eq(&received).into()
}

fn ok() -> Response {
    (StatusCode::OK, "OK").into_response()
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "SatyaTrace is running!",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Inbound WhatsApp message. Twilio always gets a 200 so it never retries;
/// only a bad signature is refused.
async fn whatsapp_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Result<Form<Vec<(String, String)>>, FormRejection>,
) -> Response {
    let params = match form {
        Ok(Form(params)) => params,
        Err(e) => {
            error!("Error processing webhook: {}", e);
            return ok();
        }
    };

    if let Some(check) = &state.signature {
        let header = headers
            .get(SIGNATURE_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if !verify_signature(check, &params, header) {
            warn!("Rejected webhook with invalid {}", SIGNATURE_HEADER);
            return (StatusCode::FORBIDDEN, "Invalid signature").into_response();
        }
    }

    let Some(message) = Message::from_twilio(&TwilioForm::from_pairs(&params)) else {
        warn!("Missing required fields in webhook");
        return ok();
    };

    info!("Received message from {}: {}", message.sender, message.text);

    if let Err(e) = state.handler.acknowledge(&message).await {
        error!("Error sending acknowledgment: {:#}", e);
    }

    let handler = state.handler.clone();
    tokio::spawn(async move {
        handler.process(message).await;
    });

    ok()
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health_check))
        .route("/api/webhook/whatsapp", post(whatsapp_webhook))
        .route("/webhook", post(whatsapp_webhook))
        .with_state(state)
}

/// Serve the webhook until Ctrl-C.
pub async fn serve(addr: &str, state: AppState) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;

    info!("Webhook listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutting down");
        })
        .await
        .context("Server error")?;

    Ok(())
}
