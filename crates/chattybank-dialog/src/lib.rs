//! ChattyBank Dialog Oracle
//!
//! Client for the hosted conversation service that interprets user text and
//! returns reply lines, an optional action tag and the context token to replay
//! on the next turn.

use chattybank_config::DialogConfig;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_DIALOG_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct OracleTurnResult {
    pub detected_intent: Option<String>,
    pub output_text: Vec<String>,
    pub action_tag: Option<String>,
    pub next_context: Value,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Dialog service unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Dialog service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Dialog service sent a malformed response: {0}")]
    Malformed(String),
}

#[async_trait::async_trait]
pub trait DialogOracle: Send + Sync {
    async fn converse(
        &self,
        text: &str,
        prior_context: Option<&Value>,
    ) -> Result<OracleTurnResult, OracleError>;
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    #[serde(default)]
    intents: Vec<Intent>,
    #[serde(default)]
    output: Output,
    context: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct Intent {
    intent: String,
}

#[derive(Debug, Default, Deserialize)]
struct Output {
    #[serde(default)]
    text: Option<OutputText>,
    #[serde(default)]
    action: Option<String>,
}

// The service returns either one line or a list of lines.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OutputText {
    One(String),
    Many(Vec<String>),
}

impl OutputText {
    fn into_lines(self) -> Vec<String> {
        match self {
            Self::One(line) => vec![line],
            Self::Many(lines) => lines,
        }
    }
}

pub struct WatsonConversation {
    client: Client,
    message_url: String,
    version: String,
    username: String,
    password: String,
}

impl WatsonConversation {
    pub fn new(config: &DialogConfig) -> anyhow::Result<Self> {
        let timeout = config
            .request_timeout_secs
            .unwrap_or(DEFAULT_DIALOG_TIMEOUT_SECS);
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            message_url: format!(
                "{}/v1/workspaces/{}/message",
                config.url.trim_end_matches('/'),
                config.workspace_id
            ),
            version: config.version.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait::async_trait]
impl DialogOracle for WatsonConversation {
    async fn converse(
        &self,
        text: &str,
        prior_context: Option<&Value>,
    ) -> Result<OracleTurnResult, OracleError> {
        let mut body = json!({ "input": { "text": text } });
        if let Some(context) = prior_context {
            body["context"] = context.clone();
        }

        let response = self
            .client
            .post(&self.message_url)
            .query(&[("version", self.version.as_str())])
            .basic_auth(&self.username, Some(&self.password))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let raw = response.text().await?;
        if !status.is_success() {
            return Err(OracleError::Status {
                status: status.as_u16(),
                body: raw,
            });
        }

        let result = parse_message_response(&raw)?;
        debug!(
            intent = ?result.detected_intent,
            action = ?result.action_tag,
            lines = result.output_text.len(),
            "Dialog turn completed"
        );
        Ok(result)
    }
}

pub fn parse_message_response(raw: &str) -> Result<OracleTurnResult, OracleError> {
    let parsed: MessageResponse =
        serde_json::from_str(raw).map_err(|e| OracleError::Malformed(e.to_string()))?;

    let next_context = parsed
        .context
        .filter(|context| !context.is_null())
        .ok_or_else(|| OracleError::Malformed("response has no context".to_string()))?;

    Ok(OracleTurnResult {
        detected_intent: parsed.intents.into_iter().next().map(|i| i.intent),
        output_text: parsed
            .output
            .text
            .map(OutputText::into_lines)
            .unwrap_or_default(),
        action_tag: parsed.output.action.filter(|tag| !tag.is_empty()),
        next_context,
    })
}

#[cfg(test)]
mod tests {
    use super::{parse_message_response, DialogOracle, OracleError, WatsonConversation};
    use chattybank_config::DialogConfig;
    use httpmock::prelude::*;
    use serde_json::json;

    fn oracle(base_url: String) -> WatsonConversation {
        let config = DialogConfig {
            url: base_url,
            username: "user".to_string(),
            password: "pass".to_string(),
            workspace_id: "ws-1".to_string(),
            ..DialogConfig::default()
        };
        WatsonConversation::new(&config).expect("oracle")
    }

    #[test]
    fn parses_intent_lines_action_and_context() {
        let result = parse_message_response(
            &json!({
                "intents": [{ "intent": "balance", "confidence": 0.9 }, { "intent": "other" }],
                "output": { "text": ["Here you go", "second line"], "action": "check_balance" },
                "context": { "conversation_id": "c-1" }
            })
            .to_string(),
        )
        .expect("parse");

        assert_eq!(result.detected_intent.as_deref(), Some("balance"));
        assert_eq!(result.output_text, vec!["Here you go", "second line"]);
        assert_eq!(result.action_tag.as_deref(), Some("check_balance"));
        assert_eq!(result.next_context, json!({ "conversation_id": "c-1" }));
    }

    #[test]
    fn single_string_output_becomes_one_line() {
        let result = parse_message_response(
            &json!({ "output": { "text": "Hi there" }, "context": { "c": 1 } }).to_string(),
        )
        .expect("parse");
        assert_eq!(result.output_text, vec!["Hi there"]);
        assert!(result.detected_intent.is_none());
        assert!(result.action_tag.is_none());
    }

    #[test]
    fn missing_output_yields_no_lines() {
        let result =
            parse_message_response(&json!({ "context": { "c": 3 } }).to_string()).expect("parse");
        assert!(result.output_text.is_empty());
    }

    #[test]
    fn missing_context_is_malformed() {
        let err = parse_message_response(&json!({ "output": { "text": [] } }).to_string())
            .expect_err("should fail");
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[test]
    fn invalid_json_is_malformed() {
        let err = parse_message_response("<html>").expect_err("should fail");
        assert!(matches!(err, OracleError::Malformed(_)));
    }

    #[tokio::test]
    async fn fresh_turn_omits_context_and_uses_basic_auth() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/workspaces/ws-1/message")
                    .query_param("version", "2016-07-11")
                    .header("authorization", "Basic dXNlcjpwYXNz")
                    .json_body(json!({ "input": { "text": "hello" } }));
                then.status(200).json_body(json!({
                    "output": { "text": ["Hi there"] },
                    "context": { "c": 1 }
                }));
            })
            .await;

        let result = oracle(server.base_url())
            .converse("hello", None)
            .await
            .expect("converse");
        mock.assert_async().await;
        assert_eq!(result.output_text, vec!["Hi there"]);
        assert_eq!(result.next_context, json!({ "c": 1 }));
    }

    #[tokio::test]
    async fn prior_context_is_replayed() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/workspaces/ws-1/message")
                    .json_body(json!({ "input": { "text": "more" }, "context": { "c": 1 } }));
                then.status(200)
                    .json_body(json!({ "output": { "text": [] }, "context": { "c": 2 } }));
            })
            .await;

        let prior = json!({ "c": 1 });
        let result = oracle(server.base_url())
            .converse("more", Some(&prior))
            .await
            .expect("converse");
        mock.assert_async().await;
        assert_eq!(result.next_context, json!({ "c": 2 }));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/v1/workspaces/ws-1/message");
                then.status(401).body("Not Authorized");
            })
            .await;

        let err = oracle(server.base_url())
            .converse("hello", None)
            .await
            .expect_err("should fail");
        match err {
            OracleError::Status { status, body } => {
                assert_eq!(status, 401);
                assert_eq!(body, "Not Authorized");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
