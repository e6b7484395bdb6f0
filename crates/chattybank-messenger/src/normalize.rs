//! Classifies raw webhook events into [`InboundEvent`]s.

use crate::payload::{MessagingEvent, RawMessage, WebhookBatch};
use chattybank_ipc::{EventKind, InboundEvent};
use tracing::{info, warn};

/// Lazily yields the classified events of a page subscription batch, in
/// arrival order. Batches for other objects yield nothing.
pub fn normalize(batch: WebhookBatch) -> impl Iterator<Item = InboundEvent> {
    let is_page = batch.object == "page";
    if !is_page {
        info!(object = %batch.object, "Ignoring webhook batch for non-page object");
    }

    batch
        .entry
        .into_iter()
        .filter(move |_| is_page)
        .flat_map(|entry| entry.messaging.into_iter())
        .filter_map(decode_event)
        .filter_map(classify)
}

fn decode_event(raw: serde_json::Value) -> Option<MessagingEvent> {
    match serde_json::from_value(raw) {
        Ok(event) => Some(event),
        Err(e) => {
            warn!("Dropping malformed messaging event: {}", e);
            None
        }
    }
}

/// First match wins: optin, message, delivery, postback, read, account link.
pub fn classify(event: MessagingEvent) -> Option<InboundEvent> {
    let MessagingEvent {
        sender,
        recipient,
        timestamp,
        optin,
        message,
        delivery,
        postback,
        read,
        account_linking,
    } = event;

    let kind = if let Some(optin) = optin {
        EventKind::Optin {
            reference: optin.reference,
        }
    } else if let Some(message) = message {
        match classify_message(message) {
            Some(kind) => kind,
            None => {
                info!(sender = %sender.id, "Dropping message without text, quick reply or attachments");
                return None;
            }
        }
    } else if let Some(delivery) = delivery {
        EventKind::Delivery {
            mids: delivery.mids.unwrap_or_default(),
            watermark: delivery.watermark,
            seq: delivery.seq,
        }
    } else if let Some(postback) = postback {
        EventKind::Postback {
            payload: postback.payload,
        }
    } else if let Some(read) = read {
        EventKind::Read {
            watermark: read.watermark,
            seq: read.seq,
        }
    } else if let Some(link) = account_linking {
        EventKind::AccountLink {
            status: link.status,
            authorization_code: link.authorization_code,
        }
    } else {
        info!(sender = %sender.id, "Webhook received unknown messaging event");
        return None;
    };

    Some(InboundEvent {
        sender_id: sender.id,
        recipient_id: recipient.id,
        timestamp,
        kind,
    })
}

fn classify_message(message: RawMessage) -> Option<EventKind> {
    let RawMessage {
        is_echo,
        mid,
        app_id,
        metadata,
        text,
        attachments,
        quick_reply,
    } = message;

    if is_echo {
        return Some(EventKind::Echo {
            mid,
            app_id,
            metadata,
        });
    }

    if let Some(quick_reply) = quick_reply {
        return Some(EventKind::QuickReply {
            mid,
            payload: quick_reply.payload,
        });
    }

    if let Some(text) = text.filter(|value| !value.is_empty()) {
        return Some(EventKind::Text { mid, text });
    }

    attachments.map(|items| EventKind::Attachment {
        mid,
        attachment_types: items.into_iter().map(|a| a.attachment_type).collect(),
    })
}
