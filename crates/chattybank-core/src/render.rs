//! Reply construction. Everything here is pure: no I/O, no state.

use chattybank_ipc::{
    Button, DefaultAction, Element, MediaKind, MessageBody, QuickReply, Receipt,
    ReceiptAddress, ReceiptAdjustment, ReceiptItem, ReceiptSummary, SenderAction, Template,
};
use chattybank_offers::OfferRecord;

/// Literal texts that trigger a canned reply instead of a dialog turn.
pub const DEMO_KEYWORDS: &[&str] = &[
    "image",
    "gif",
    "audio",
    "video",
    "file",
    "button",
    "generic",
    "receipt",
    "quick reply",
    "read receipt",
    "typing on",
    "typing off",
    "account linking",
];

pub fn render_text(text: impl Into<String>) -> MessageBody {
    MessageBody::text(text)
}

fn record_str(record: &OfferRecord, field: &str) -> String {
    record
        .get(field)
        .and_then(|value| value.as_str())
        .unwrap_or_default()
        .to_string()
}

fn non_empty(value: String) -> Option<String> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Generic template card for one catalog product.
pub fn render_offer(record: &OfferRecord) -> MessageBody {
    let brand = record_str(record, "brand");
    let website = record_str(record, "product_website");
    let call = format!("Call {}", brand);

    let element = Element {
        title: record_str(record, "name"),
        subtitle: non_empty(record_str(record, "description")),
        item_url: non_empty(website.clone()),
        image_url: non_empty(record_str(record, "img_url")),
        default_action: None,
        buttons: vec![
            Button::WebUrl {
                url: website,
                title: format!("Open {}'s website", brand),
            },
            Button::Postback {
                title: call.clone(),
                payload: call,
            },
        ],
    };

    MessageBody::Template {
        template: Template::Generic {
            elements: vec![element],
        },
    }
}

fn balance_element(
    title: &str,
    subtitle: &str,
    image_url: String,
    url: &str,
    fallback_url: &str,
    button_title: Option<&str>,
) -> Element {
    Element {
        title: title.to_string(),
        subtitle: Some(subtitle.to_string()),
        item_url: None,
        image_url: Some(image_url),
        default_action: Some(DefaultAction::web_url(url, fallback_url)),
        buttons: button_title
            .map(|title| {
                vec![Button::WebUrl {
                    url: url.to_string(),
                    title: title.to_string(),
                }]
            })
            .unwrap_or_default(),
    }
}

/// Fixed example balances across three banks. Not computed.
pub fn render_balance_summary(server_url: &str) -> MessageBody {
    let asset = |path: &str| format!("{}/assets/{}", server_url.trim_end_matches('/'), path);

    let elements = vec![
        balance_element(
            "All your accounts: HSBC, NatWest, Lloyds",
            "Your total balance is £5210.44",
            asset("watson.png"),
            "https://facebook.com/chattybank",
            "https://hsbc.com",
            None,
        ),
        balance_element(
            "HSBC Current Account",
            "Your HSBC balance is £1902.89",
            asset("banks/hsbc.jpg"),
            "https://hsbc.com",
            "https://hsbc.com",
            Some("Go to HSBC's website"),
        ),
        balance_element(
            "NatWest Savings Account",
            "Your NatWest balance is £1348.89",
            asset("banks/natwest.png"),
            "https://natwest.com",
            "https://natwest.com",
            Some("Go to NatWest's website"),
        ),
        // Subtitle bank name matches the deployed copy.
        balance_element(
            "Lloyds Joint Current Account",
            "Your NatWest balance is £1958.66",
            asset("banks/lloyds.jpg"),
            "https://www.lloydsbank.com/",
            "https://www.lloydsbank.com/",
            Some("Go to Lloyds' website"),
        ),
    ];

    MessageBody::Template {
        template: Template::List {
            top_element_style: Some("large".to_string()),
            elements,
        },
    }
}

/// Canned reply for a demo keyword, or `None` when `keyword` is not one.
pub fn render_demo(keyword: &str, server_url: &str) -> Option<MessageBody> {
    let base = server_url.trim_end_matches('/');
    let media = |media: MediaKind, path: &str| MessageBody::Media {
        media,
        url: format!("{}/assets/{}", base, path),
    };
    let sender_action = |action: SenderAction| MessageBody::SenderAction { action };

    let body = match keyword {
        "image" => media(MediaKind::Image, "rift.png"),
        "gif" => media(MediaKind::Image, "instagram_logo.gif"),
        "audio" => media(MediaKind::Audio, "sample.mp3"),
        "video" => media(MediaKind::Video, "allofus480.mov"),
        "file" => media(MediaKind::File, "test.txt"),
        "button" => demo_button_template(),
        "generic" => demo_generic_template(base),
        "receipt" => demo_receipt(base),
        "quick reply" => MessageBody::Text {
            text: "What's your favorite movie genre?".to_string(),
            quick_replies: ["Action", "Comedy", "Drama"]
                .iter()
                .map(|genre| QuickReply {
                    title: genre.to_string(),
                    payload: format!(
                        "DEVELOPER_DEFINED_PAYLOAD_FOR_PICKING_{}",
                        genre.to_uppercase()
                    ),
                })
                .collect(),
        },
        "read receipt" => sender_action(SenderAction::MarkSeen),
        "typing on" => sender_action(SenderAction::TypingOn),
        "typing off" => sender_action(SenderAction::TypingOff),
        "account linking" => MessageBody::Template {
            template: Template::Button {
                text: "Welcome. Link your account.".to_string(),
                buttons: vec![Button::AccountLink {
                    url: format!("{}/authorize", base),
                }],
            },
        },
        _ => return None,
    };
    Some(body)
}

fn demo_button_template() -> MessageBody {
    MessageBody::Template {
        template: Template::Button {
            text: "This is test text".to_string(),
            buttons: vec![
                Button::WebUrl {
                    url: "https://www.oculus.com/en-us/rift/".to_string(),
                    title: "Open Web URL".to_string(),
                },
                Button::Postback {
                    title: "Trigger Postback".to_string(),
                    payload: "DEVELOPER_DEFINED_PAYLOAD".to_string(),
                },
                Button::PhoneNumber {
                    title: "Call Phone Number".to_string(),
                    payload: "+16505551234".to_string(),
                },
            ],
        },
    }
}

fn demo_generic_template(base: &str) -> MessageBody {
    let card = |title: &str, subtitle: &str, url: &str, image: &str, payload: &str| Element {
        title: title.to_string(),
        subtitle: Some(subtitle.to_string()),
        item_url: Some(url.to_string()),
        image_url: Some(format!("{}/assets/{}", base, image)),
        default_action: None,
        buttons: vec![
            Button::WebUrl {
                url: url.to_string(),
                title: "Open Web URL".to_string(),
            },
            Button::Postback {
                title: "Call Postback".to_string(),
                payload: payload.to_string(),
            },
        ],
    };

    MessageBody::Template {
        template: Template::Generic {
            elements: vec![
                card(
                    "rift",
                    "Next-generation virtual reality",
                    "https://www.oculus.com/en-us/rift/",
                    "rift.png",
                    "Payload for first bubble",
                ),
                card(
                    "touch",
                    "Your Hands, Now in VR",
                    "https://www.oculus.com/en-us/touch/",
                    "touch.png",
                    "Payload for second bubble",
                ),
            ],
        },
    }
}

fn demo_receipt(base: &str) -> MessageBody {
    let item = |title: &str, subtitle: &str, quantity: u32, price: f64, image: &str| ReceiptItem {
        title: title.to_string(),
        subtitle: subtitle.to_string(),
        quantity,
        price,
        currency: "USD".to_string(),
        image_url: format!("{}/assets/{}", base, image),
    };

    MessageBody::Template {
        template: Template::Receipt(Receipt {
            recipient_name: "Peter Chang".to_string(),
            order_number: "order1234".to_string(),
            currency: "USD".to_string(),
            payment_method: "Visa 1234".to_string(),
            timestamp: "1428444852".to_string(),
            elements: vec![
                item("Oculus Rift", "Includes: headset, sensor, remote", 1, 599.00, "riftsq.png"),
                item("Samsung Gear VR", "Frost White", 1, 99.99, "gearvrsq.png"),
            ],
            address: ReceiptAddress {
                street_1: "1 Hacker Way".to_string(),
                street_2: String::new(),
                city: "Menlo Park".to_string(),
                postal_code: "94025".to_string(),
                state: "CA".to_string(),
                country: "US".to_string(),
            },
            summary: ReceiptSummary {
                subtotal: 698.99,
                shipping_cost: 20.00,
                total_tax: 57.67,
                total_cost: 626.66,
            },
            adjustments: vec![
                ReceiptAdjustment {
                    name: "New Customer Discount".to_string(),
                    amount: -50.0,
                },
                ReceiptAdjustment {
                    name: "$100 Off Coupon".to_string(),
                    amount: -100.0,
                },
            ],
        }),
    }
}
