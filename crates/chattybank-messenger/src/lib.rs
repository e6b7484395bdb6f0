//! ChattyBank Messenger Adapter
//!
//! Webhook ingestion (verification handshake, signature checks, event
//! classification) and the Send API client that delivers replies.

pub mod normalize;
pub mod payload;
pub mod server;
pub mod signature;

pub use normalize::{classify, normalize};
pub use server::{router, WebhookError, WebhookState};

use chattybank_config::MessengerConfig;
use chattybank_ipc::{MessageBody, OutboundMessage};
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

pub const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;
const TEXT_METADATA: &str = "DEVELOPER_DEFINED_METADATA";

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("send API transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("send API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("send API response could not be decoded: {0}")]
    Decode(String),
}

/// Identifiers returned by a successful Send API call.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SendReceipt {
    #[serde(default)]
    pub recipient_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
}

pub struct MessengerAdapter {
    client: Client,
    send_url: String,
    page_access_token: String,
}

impl MessengerAdapter {
    pub fn new(config: &MessengerConfig) -> anyhow::Result<Self> {
        let timeout = config
            .request_timeout_secs
            .unwrap_or(DEFAULT_SEND_TIMEOUT_SECS);
        Ok(Self {
            client: Self::build_client(timeout)?,
            send_url: format!("{}/me/messages", config.graph_api_url.trim_end_matches('/')),
            page_access_token: config.page_access_token.clone(),
        })
    }

    fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
        let client = ClientBuilder::new()
            .pool_idle_timeout(Duration::from_secs(600))
            .pool_max_idle_per_host(10)
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(client)
    }

    pub async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, SendError> {
        let payload = build_send_payload(message);
        let response = self
            .client
            .post(&self.send_url)
            .query(&[("access_token", self.page_access_token.as_str())])
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(SendError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let receipt: SendReceipt = serde_json::from_str(&body)
            .map_err(|e| SendError::Decode(format!("{} (body: {})", e, body)))?;
        match &receipt.message_id {
            Some(message_id) => debug!(
                recipient = ?receipt.recipient_id,
                message_id = %message_id,
                "Successfully sent message"
            ),
            None => debug!(
                recipient = ?receipt.recipient_id,
                "Successfully called Send API"
            ),
        }
        Ok(receipt)
    }

    pub async fn run_outbound_handler(&self, mut receiver: broadcast::Receiver<OutboundMessage>) {
        info!("Messenger outbound handler started");

        loop {
            match receiver.recv().await {
                Ok(msg) => {
                    if let Err(e) = self.send(&msg).await {
                        warn!(recipient = %msg.recipient_id, "Failed to send outbound message: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Messenger outbound handler stopped: channel closed");
                    break;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Messenger outbound handler lagged; skipped {} messages",
                        skipped
                    );
                }
            }
        }
    }
}

/// Send API request body for one outbound message.
pub fn build_send_payload(message: &OutboundMessage) -> Value {
    let recipient = json!({ "id": message.recipient_id });

    match &message.body {
        MessageBody::Text {
            text,
            quick_replies,
        } => {
            let mut body = json!({
                "text": text,
                "metadata": TEXT_METADATA,
            });
            if !quick_replies.is_empty() {
                body["quick_replies"] = quick_replies
                    .iter()
                    .map(|reply| {
                        json!({
                            "content_type": "text",
                            "title": reply.title,
                            "payload": reply.payload,
                        })
                    })
                    .collect();
            }
            json!({ "recipient": recipient, "message": body })
        }
        MessageBody::Media { media, url } => json!({
            "recipient": recipient,
            "message": {
                "attachment": {
                    "type": media.as_str(),
                    "payload": { "url": url },
                }
            }
        }),
        MessageBody::Template { template } => json!({
            "recipient": recipient,
            "message": {
                "attachment": {
                    "type": "template",
                    "payload": template,
                }
            }
        }),
        MessageBody::SenderAction { action } => json!({
            "recipient": recipient,
            "sender_action": action.as_str(),
        }),
    }
}
