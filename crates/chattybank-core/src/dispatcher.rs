//! Turn handling for one inbound event.
//!
//! A user is `Fresh` without a stored context and `Active` with one. A
//! successful dialog turn always moves the user to `Active`; the
//! end-of-conversation action moves them back to `Fresh`.

use crate::actions::{ActionKind, ActionTable};
use crate::context::ContextStore;
use crate::render::{render_balance_summary, render_demo, render_offer, render_text};
use chattybank_dialog::DialogOracle;
use chattybank_ipc::{EventKind, InboundEvent, MessageBody, OutboundMessage};
use chattybank_offers::OfferLookup;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const QUICK_REPLY_ACK: &str = "Quick reply tapped";
pub const ATTACHMENT_ACK: &str = "Message with attachment received";
pub const POSTBACK_ACK: &str = "Postback called";
pub const OPTIN_ACK: &str = "Authentication successful";
pub const OFFER_FALLBACK: &str = "Sorry, I couldn't find a matching offer right now.";

pub struct Dispatcher {
    oracle: Arc<dyn DialogOracle>,
    lookup: Arc<dyn OfferLookup>,
    store: Arc<dyn ContextStore>,
    actions: ActionTable,
    server_url: String,
}

impl Dispatcher {
    pub fn new(
        oracle: Arc<dyn DialogOracle>,
        lookup: Arc<dyn OfferLookup>,
        store: Arc<dyn ContextStore>,
        actions: ActionTable,
        server_url: impl Into<String>,
    ) -> Self {
        Self {
            oracle,
            lookup,
            store,
            actions,
            server_url: server_url.into(),
        }
    }

    /// Replies for `event`, in send order. Failures of the dialog service or
    /// catalog are turned into text replies here and never escape.
    pub async fn dispatch(&self, event: &InboundEvent) -> Vec<OutboundMessage> {
        let user = event.sender_id.as_str();
        let bodies = match &event.kind {
            EventKind::Text { text, .. } => self.handle_text(user, text).await,
            EventKind::QuickReply { payload, .. } => {
                info!(user, payload = %payload, "Quick reply received");
                vec![render_text(QUICK_REPLY_ACK)]
            }
            EventKind::Attachment {
                attachment_types, ..
            } => {
                info!(user, types = ?attachment_types, "Attachment received");
                vec![render_text(ATTACHMENT_ACK)]
            }
            EventKind::Postback { payload } => {
                info!(user, payload = ?payload, "Postback received");
                vec![render_text(POSTBACK_ACK)]
            }
            EventKind::Optin { reference } => {
                info!(user, reference = ?reference, "Authentication received");
                vec![render_text(OPTIN_ACK)]
            }
            EventKind::Echo {
                mid,
                app_id,
                metadata,
            } => {
                info!(mid = ?mid, app_id = ?app_id, metadata = ?metadata, "Received echo");
                Vec::new()
            }
            EventKind::Delivery {
                mids, watermark, ..
            } => {
                for mid in mids {
                    debug!(mid = %mid, "Message delivered");
                }
                info!(user, watermark = ?watermark, "All messages before watermark delivered");
                Vec::new()
            }
            EventKind::Read { watermark, seq } => {
                info!(user, watermark = ?watermark, seq = ?seq, "Messages read");
                Vec::new()
            }
            EventKind::AccountLink {
                status,
                authorization_code,
            } => {
                info!(
                    user,
                    status = ?status,
                    authorization_code = ?authorization_code,
                    "Account link event"
                );
                Vec::new()
            }
        };

        bodies
            .into_iter()
            .map(|body| OutboundMessage::new(user, body))
            .collect()
    }

    async fn handle_text(&self, user: &str, text: &str) -> Vec<MessageBody> {
        if let Some(body) = render_demo(text, &self.server_url) {
            debug!(user, keyword = text, "Demo keyword, skipping dialog");
            return vec![body];
        }

        let prior = self.store.get(user).await;
        let result = match self.oracle.converse(text, prior.as_ref()).await {
            Ok(result) => result,
            Err(e) => {
                warn!(user, "Dialog turn failed: {}", e);
                return vec![render_text(e.to_string())];
            }
        };

        if let Some(intent) = &result.detected_intent {
            info!(user, intent = %intent, "Detected intent");
        }

        self.store.set(user, result.next_context).await;

        let mut replies = Vec::new();
        let mut lines = result.output_text.into_iter();
        if let Some(first) = lines.next() {
            replies.push(render_text(first));
        }
        let dropped = lines.count();
        if dropped > 0 {
            debug!(user, dropped, "Discarding extra dialog output lines");
        }

        let Some(tag) = result.action_tag else {
            return replies;
        };
        info!(user, action = %tag, "Detected action");

        match self.actions.resolve(&tag) {
            Some(ActionKind::Lookup { query }) => match self.lookup.lookup(query).await {
                Ok(record) => replies.push(render_offer(&record)),
                Err(e) => {
                    warn!(user, action = %tag, "Offer lookup failed: {}", e);
                    replies.push(render_text(OFFER_FALLBACK));
                }
            },
            Some(ActionKind::ShowBalance) => {
                replies.push(render_balance_summary(&self.server_url));
            }
            Some(ActionKind::EndConversation) => {
                self.store.clear(user).await;
                info!(user, "Conversation ended, context cleared");
            }
            None => debug!(user, action = %tag, "Ignoring unknown action"),
        }

        replies
    }
}
