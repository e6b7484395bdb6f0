//! Inbound webhook transport.
//!
//! The POST handler verifies the signature, normalizes the batch, hands it to
//! the event bus and acknowledges immediately; conversation processing runs
//! elsewhere and never delays the 200.

use crate::normalize::normalize;
use crate::payload::WebhookBatch;
use crate::signature::{verify_signature, SIGNATURE_256_HEADER, SIGNATURE_HEADER};
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chattybank_ipc::{EventBus, InboundBatch, InboundEvent};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// Authorization code handed back to the platform after the demo login.
pub const DEMO_AUTHORIZATION_CODE: &str = "1234567890";

#[derive(Debug, thiserror::Error)]
pub enum WebhookError {
    #[error("missing request signature")]
    MissingSignature,
    #[error("request signature mismatch")]
    InvalidSignature,
    #[error("malformed webhook payload: {0}")]
    MalformedPayload(String),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let status = match self {
            Self::MissingSignature | Self::InvalidSignature => StatusCode::FORBIDDEN,
            Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}

#[derive(Clone)]
pub struct WebhookState {
    validation_token: Arc<str>,
    app_secret: Arc<str>,
    event_bus: EventBus,
}

impl WebhookState {
    pub fn new(validation_token: &str, app_secret: &str, event_bus: EventBus) -> Self {
        Self {
            validation_token: Arc::from(validation_token),
            app_secret: Arc::from(app_secret),
            event_bus,
        }
    }
}

pub fn router(state: WebhookState, public_dir: Option<PathBuf>) -> Router {
    let router = Router::new()
        .route("/webhook", get(verify_subscription).post(receive_webhook))
        .route("/authorize", get(authorize))
        .with_state(state);

    let router = match public_dir {
        Some(dir) => router.fallback_service(ServeDir::new(dir)),
        None => router,
    };

    router.layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

async fn verify_subscription(
    State(state): State<WebhookState>,
    Query(params): Query<VerifyQuery>,
) -> (StatusCode, String) {
    let token_matches = params.verify_token.as_deref() == Some(&*state.validation_token);
    if params.mode.as_deref() == Some("subscribe") && token_matches {
        info!("Validating webhook");
        return (StatusCode::OK, params.challenge.unwrap_or_default());
    }

    warn!("Failed validation. Make sure the validation tokens match.");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

fn check_signature(app_secret: &str, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
    let header = headers
        .get(SIGNATURE_256_HEADER)
        .or_else(|| headers.get(SIGNATURE_HEADER))
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    if verify_signature(app_secret, body, header) {
        Ok(())
    } else {
        Err(WebhookError::InvalidSignature)
    }
}

async fn receive_webhook(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, WebhookError> {
    if let Err(err) = check_signature(&state.app_secret, &headers, &body) {
        warn!("Rejecting webhook delivery: {}", err);
        return Err(err);
    }

    let batch: WebhookBatch = serde_json::from_slice(&body).map_err(|e| {
        warn!("Rejecting malformed webhook payload: {}", e);
        WebhookError::MalformedPayload(e.to_string())
    })?;

    let events: Vec<InboundEvent> = normalize(batch).collect();
    if events.is_empty() {
        return Ok(StatusCode::OK);
    }

    let batch = InboundBatch::new(events);
    info!(
        trace_id = %batch.trace_id,
        events = batch.events.len(),
        "Accepted webhook batch"
    );
    if let Err(e) = state.event_bus.publish(batch) {
        warn!("Failed to publish webhook batch to event bus: {}", e);
    }

    Ok(StatusCode::OK)
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeQuery {
    pub account_linking_token: Option<String>,
    pub redirect_uri: Option<String>,
}

async fn authorize(Query(params): Query<AuthorizeQuery>) -> Html<String> {
    let token = params.account_linking_token.unwrap_or_default();
    let redirect_uri = params.redirect_uri.unwrap_or_default();
    let redirect_success = format!(
        "{}&authorization_code={}",
        redirect_uri, DEMO_AUTHORIZATION_CODE
    );

    Html(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Link your account</title></head>\n<body>\n\
         <h1>Link your ChattyBank account</h1>\n\
         <p>Account linking token: <code>{}</code></p>\n\
         <p>Redirect URI: <code>{}</code></p>\n\
         <p><a href=\"{}\">Complete account link</a></p>\n\
         </body>\n</html>\n",
        escape_html(&token),
        escape_html(&redirect_uri),
        escape_html(&redirect_success),
    ))
}

fn escape_html(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::{escape_html, router, WebhookState};
    use crate::signature::sign_sha1;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chattybank_ipc::{EventBus, EventKind};
    use tower::ServiceExt;

    const SECRET: &str = "app-secret";

    fn app(bus: &EventBus) -> axum::Router {
        router(WebhookState::new("verify-me", SECRET, bus.clone()), None)
    }

    fn text_batch(text: &str) -> String {
        serde_json::json!({
            "object": "page",
            "entry": [{
                "id": "page-1",
                "time": 1,
                "messaging": [{
                    "sender": { "id": "user-1" },
                    "recipient": { "id": "page-1" },
                    "timestamp": 2,
                    "message": { "mid": "m", "text": text }
                }]
            }]
        })
        .to_string()
    }

    fn post(body: String, signature: Option<String>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json");
        if let Some(signature) = signature {
            builder = builder.header("x-hub-signature", signature);
        }
        builder.body(Body::from(body)).expect("request")
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        String::from_utf8(bytes.to_vec()).expect("utf8")
    }

    #[tokio::test]
    async fn verification_handshake_echoes_challenge() {
        let bus = EventBus::new();
        let res = app(&bus)
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=CHALLENGE")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        assert_eq!(body_text(res).await, "CHALLENGE");
    }

    #[tokio::test]
    async fn verification_with_wrong_token_is_forbidden() {
        let bus = EventBus::new();
        let res = app(&bus)
            .oneshot(
                Request::builder()
                    .uri("/webhook?hub.mode=subscribe&hub.verify_token=nope&hub.challenge=C")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn signed_batch_is_acknowledged_and_published() {
        let bus = EventBus::new();
        let mut inbound = bus.subscribe();
        let body = text_batch("hello");
        let signature = sign_sha1(SECRET, body.as_bytes());

        let res = app(&bus)
            .oneshot(post(body, Some(signature)))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let batch = inbound.recv().await.expect("batch published");
        assert_eq!(batch.events.len(), 1);
        assert_eq!(batch.events[0].sender_id, "user-1");
        assert!(matches!(batch.events[0].kind, EventKind::Text { .. }));
    }

    #[tokio::test]
    async fn unsigned_batch_is_rejected() {
        let bus = EventBus::new();
        let mut inbound = bus.subscribe();
        let res = app(&bus)
            .oneshot(post(text_batch("hello"), None))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
        assert!(inbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn badly_signed_batch_is_rejected() {
        let bus = EventBus::new();
        let body = text_batch("hello");
        let signature = sign_sha1("wrong-secret", body.as_bytes());
        let res = app(&bus)
            .oneshot(post(body, Some(signature)))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn sha256_header_takes_precedence() {
        let bus = EventBus::new();
        let _inbound = bus.subscribe();
        let body = text_batch("hello");
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("x-hub-signature", "sha1=00")
            .header(
                "x-hub-signature-256",
                crate::signature::sign_sha256(SECRET, body.as_bytes()),
            )
            .body(Body::from(body))
            .expect("request");
        let res = app(&bus).oneshot(request).await.expect("response");
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn bad_event_does_not_reject_the_delivery() {
        let bus = EventBus::new();
        let mut inbound = bus.subscribe();
        let body = serde_json::json!({
            "object": "page",
            "entry": [{
                "id": "page-1",
                "messaging": [
                    {
                        "sender": { "id": "user-1" },
                        "recipient": { "id": "page-1" },
                        "message": { "text": "hello" }
                    },
                    {
                        "sender": { "id": "user-1" },
                        "recipient": { "id": "page-1" },
                        "message": { "quick_reply": {} }
                    }
                ]
            }]
        })
        .to_string();
        let signature = sign_sha1(SECRET, body.as_bytes());

        let res = app(&bus)
            .oneshot(post(body, Some(signature)))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);

        let batch = inbound.recv().await.expect("batch published");
        assert_eq!(batch.events.len(), 1);
        assert!(matches!(
            &batch.events[0].kind,
            EventKind::Text { text, .. } if text == "hello"
        ));
    }

    #[tokio::test]
    async fn malformed_json_is_a_client_error() {
        let bus = EventBus::new();
        let body = "{not json".to_string();
        let signature = sign_sha1(SECRET, body.as_bytes());
        let res = app(&bus)
            .oneshot(post(body, Some(signature)))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn acknowledges_even_without_a_processor() {
        let bus = EventBus::new();
        let body = text_batch("hello");
        let signature = sign_sha1(SECRET, body.as_bytes());
        let res = app(&bus)
            .oneshot(post(body, Some(signature)))
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn authorize_page_carries_success_redirect() {
        let bus = EventBus::new();
        let res = app(&bus)
            .oneshot(
                Request::builder()
                    .uri("/authorize?account_linking_token=TOKEN&redirect_uri=https%3A%2F%2Fm.me%2Fcb%3Fx%3D1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(res.status(), StatusCode::OK);
        let html = body_text(res).await;
        assert!(html.contains("TOKEN"));
        assert!(html.contains("https://m.me/cb?x=1&amp;authorization_code=1234567890"));
    }

    #[test]
    fn escape_html_neutralizes_markup() {
        assert_eq!(
            escape_html("<a href=\"x\">&'"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;"
        );
    }
}
