//! ChattyBank IPC
//!
//! Normalized inbound events, outbound reply payloads and the event bus that
//! decouples the webhook transport from conversation processing.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;

static NEXT_TRACE_COUNTER: AtomicU64 = AtomicU64::new(1);

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn generate_trace_id() -> String {
    let ts = now_unix_secs();
    let n = NEXT_TRACE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("trace-{}-{}", ts, n)
}

/// One messaging event, already classified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub sender_id: String,
    pub recipient_id: String,
    /// Milliseconds since the epoch, as sent by the platform.
    pub timestamp: Option<i64>,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Text {
        mid: Option<String>,
        text: String,
    },
    QuickReply {
        mid: Option<String>,
        payload: String,
    },
    Attachment {
        mid: Option<String>,
        attachment_types: Vec<String>,
    },
    Echo {
        mid: Option<String>,
        app_id: Option<i64>,
        metadata: Option<String>,
    },
    Postback {
        payload: Option<String>,
    },
    Optin {
        reference: Option<String>,
    },
    Delivery {
        mids: Vec<String>,
        watermark: Option<i64>,
        seq: Option<i64>,
    },
    Read {
        watermark: Option<i64>,
        seq: Option<i64>,
    },
    AccountLink {
        status: Option<String>,
        authorization_code: Option<String>,
    },
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::QuickReply { .. } => "quick_reply",
            Self::Attachment { .. } => "attachment",
            Self::Echo { .. } => "echo",
            Self::Postback { .. } => "postback",
            Self::Optin { .. } => "optin",
            Self::Delivery { .. } => "delivery",
            Self::Read { .. } => "read",
            Self::AccountLink { .. } => "account_link",
        }
    }
}

/// All events from one webhook delivery, kept in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundBatch {
    pub trace_id: String,
    pub events: Vec<InboundEvent>,
}

impl InboundBatch {
    pub fn new(events: Vec<InboundEvent>) -> Self {
        Self {
            trace_id: generate_trace_id(),
            events,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub body: MessageBody,
}

impl OutboundMessage {
    pub fn new(recipient_id: impl Into<String>, body: MessageBody) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            body,
        }
    }

    pub fn text(recipient_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(recipient_id, MessageBody::text(text))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MessageBody {
    Text {
        text: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        quick_replies: Vec<QuickReply>,
    },
    Media {
        media: MediaKind,
        url: String,
    },
    Template {
        template: Template,
    },
    SenderAction {
        action: SenderAction,
    },
}

impl MessageBody {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text {
            text: text.into(),
            quick_replies: Vec::new(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuickReply {
    pub title: String,
    pub payload: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Image,
    Audio,
    Video,
    File,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
            Self::File => "file",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderAction {
    MarkSeen,
    TypingOn,
    TypingOff,
}

impl SenderAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MarkSeen => "mark_seen",
            Self::TypingOn => "typing_on",
            Self::TypingOff => "typing_off",
        }
    }
}

/// Structured template payloads. Field names follow the Send API so the
/// serialized form can be placed under `attachment.payload` unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "template_type", rename_all = "snake_case")]
pub enum Template {
    Generic {
        elements: Vec<Element>,
    },
    List {
        #[serde(skip_serializing_if = "Option::is_none")]
        top_element_style: Option<String>,
        elements: Vec<Element>,
    },
    Button {
        text: String,
        buttons: Vec<Button>,
    },
    Receipt(Receipt),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Element {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_action: Option<DefaultAction>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefaultAction {
    #[serde(rename = "type")]
    pub action_type: String,
    pub url: String,
    pub messenger_extensions: bool,
    pub webview_height_ratio: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_url: Option<String>,
}

impl DefaultAction {
    pub fn web_url(url: impl Into<String>, fallback_url: impl Into<String>) -> Self {
        Self {
            action_type: "web_url".to_string(),
            url: url.into(),
            messenger_extensions: false,
            webview_height_ratio: "tall".to_string(),
            fallback_url: Some(fallback_url.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Button {
    WebUrl { url: String, title: String },
    Postback { title: String, payload: String },
    PhoneNumber { title: String, payload: String },
    AccountLink { url: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub recipient_name: String,
    pub order_number: String,
    pub currency: String,
    pub payment_method: String,
    pub timestamp: String,
    pub elements: Vec<ReceiptItem>,
    pub address: ReceiptAddress,
    pub summary: ReceiptSummary,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub adjustments: Vec<ReceiptAdjustment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub title: String,
    pub subtitle: String,
    pub quantity: u32,
    pub price: f64,
    pub currency: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptAddress {
    pub street_1: String,
    pub street_2: String,
    pub city: String,
    pub postal_code: String,
    pub state: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    pub subtotal: f64,
    pub shipping_cost: f64,
    pub total_tax: f64,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptAdjustment {
    pub name: String,
    pub amount: f64,
}

pub const EVENT_BUS_CAPACITY: usize = 256;
/// Replies waiting for the Send API. Sends are serialized, so a receiver more
/// than this many messages behind skips the oldest and logs the lag.
pub const OUTBOUND_CAPACITY: usize = 256;

#[derive(Clone)]
pub struct EventBus {
    inbound: broadcast::Sender<InboundBatch>,
    outbound: broadcast::Sender<OutboundMessage>,
}

impl EventBus {
    pub fn new() -> Self {
        let (inbound_tx, _) = broadcast::channel(EVENT_BUS_CAPACITY);
        let (outbound_tx, _) = broadcast::channel(OUTBOUND_CAPACITY);

        Self {
            inbound: inbound_tx,
            outbound: outbound_tx,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<InboundBatch> {
        self.inbound.subscribe()
    }

    pub fn publish(&self, batch: InboundBatch) -> anyhow::Result<()> {
        self.inbound.send(batch)?;
        Ok(())
    }

    pub fn outbound_sender(&self) -> broadcast::Sender<OutboundMessage> {
        self.outbound.clone()
    }

    pub fn outbound_subscribe(&self) -> broadcast::Receiver<OutboundMessage> {
        self.outbound.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
