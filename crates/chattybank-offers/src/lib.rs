//! ChattyBank Offer Lookup
//!
//! Product catalog queries used to back offer-style dialog actions.

use chattybank_config::OffersConfig;
use reqwest::{Client, ClientBuilder, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 30;

const CLIENT_ID_HEADER: &str = "X-IBM-Client-ID";
const CLIENT_SECRET_HEADER: &str = "X-IBM-Client-Secret";

/// First product returned by a catalog query.
pub type OfferRecord = Value;

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("catalog request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("catalog returned HTTP {status}: {body}")]
    Status { status: u16, body: String },
    #[error("catalog response is not a product list: {0}")]
    Decode(String),
    #[error("catalog returned no matching products")]
    Empty,
    #[error("invalid catalog query '{query}': {reason}")]
    InvalidQuery { query: String, reason: String },
}

#[async_trait::async_trait]
pub trait OfferLookup: Send + Sync {
    async fn lookup(&self, query: &str) -> Result<OfferRecord, LookupError>;
}

pub struct ProductCatalog {
    client: Client,
    base_url: String,
    client_id: String,
    client_secret: String,
}

impl ProductCatalog {
    pub fn new(config: &OffersConfig) -> anyhow::Result<Self> {
        let timeout = config
            .request_timeout_secs
            .unwrap_or(DEFAULT_LOOKUP_TIMEOUT_SECS);
        let client = ClientBuilder::new()
            .timeout(Duration::from_secs(timeout))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    // Queries carry their own `?` and loopback-style filter syntax, so they are
    // appended verbatim rather than re-encoded.
    fn request_url(&self, query: &str) -> Result<Url, LookupError> {
        let raw = format!("{}{}", self.base_url, query);
        Url::parse(&raw).map_err(|e| LookupError::InvalidQuery {
            query: query.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait::async_trait]
impl OfferLookup for ProductCatalog {
    async fn lookup(&self, query: &str) -> Result<OfferRecord, LookupError> {
        let url = self.request_url(query)?;
        let response = self
            .client
            .get(url)
            .header(CLIENT_ID_HEADER, &self.client_id)
            .header(CLIENT_SECRET_HEADER, &self.client_secret)
            .header("accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(LookupError::Status {
                status: status.as_u16(),
                body,
            });
        }

        first_record(&body)
    }
}

pub fn first_record(body: &str) -> Result<OfferRecord, LookupError> {
    let parsed: Value = serde_json::from_str(body).map_err(|e| LookupError::Decode(e.to_string()))?;
    let Value::Array(records) = parsed else {
        return Err(LookupError::Decode("expected a JSON array".to_string()));
    };
    debug!(count = records.len(), "Catalog lookup returned products");
    records.into_iter().next().ok_or(LookupError::Empty)
}
