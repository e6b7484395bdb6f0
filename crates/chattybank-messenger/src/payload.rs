//! Webhook wire format as posted by the Messenger platform.

use serde::de::{self, Deserializer};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBatch {
    pub object: String,
    #[serde(default)]
    pub entry: Vec<PageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    #[serde(default, deserialize_with = "opt_id_string")]
    pub id: Option<String>,
    #[serde(default)]
    pub time: Option<i64>,
    /// Kept raw so one malformed event cannot reject the whole delivery;
    /// each is decoded on its own during normalization.
    #[serde(default)]
    pub messaging: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessagingEvent {
    pub sender: Party,
    pub recipient: Party,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub optin: Option<Optin>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    #[serde(default)]
    pub delivery: Option<Delivery>,
    #[serde(default)]
    pub postback: Option<Postback>,
    #[serde(default)]
    pub read: Option<Read>,
    #[serde(default)]
    pub account_linking: Option<AccountLinking>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Party {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Optin {
    #[serde(rename = "ref", default)]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub is_echo: bool,
    #[serde(default)]
    pub mid: Option<String>,
    #[serde(default)]
    pub app_id: Option<i64>,
    #[serde(default)]
    pub metadata: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Option<Vec<RawAttachment>>,
    #[serde(default)]
    pub quick_reply: Option<RawQuickReply>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAttachment {
    #[serde(rename = "type")]
    pub attachment_type: String,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawQuickReply {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Delivery {
    #[serde(default)]
    pub mids: Option<Vec<String>>,
    #[serde(default)]
    pub watermark: Option<i64>,
    #[serde(default)]
    pub seq: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Postback {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub payload: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Read {
    #[serde(default)]
    pub watermark: Option<i64>,
    #[serde(default)]
    pub seq: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountLinking {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub authorization_code: Option<String>,
}

// Page-scoped ids arrive as strings, but older payloads and test tools send
// bare numbers.
fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(value) => Ok(value),
        serde_json::Value::Number(value) => Ok(value.to_string()),
        other => Err(de::Error::custom(format!("unsupported id value: {}", other))),
    }
}

fn opt_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<serde_json::Value>::deserialize(deserializer)? {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(serde_json::Value::String(value)) => Ok(Some(value)),
        Some(serde_json::Value::Number(value)) => Ok(Some(value.to_string())),
        Some(other) => Err(de::Error::custom(format!("unsupported id value: {}", other))),
    }
}
