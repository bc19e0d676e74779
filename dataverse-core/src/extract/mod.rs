//! Source extractors.
//!
//! A `SourceApi` knows how to address one upstream API and how to unpack its
//! response into candidate records. The `Extractor` composes it with the
//! retrying `HttpClient` and the schema validator:
//!
//! build request -> fetch -> decode candidates -> validate -> `Batch`.
//!
//! Extractors hold no shared mutable state; one failing never affects another.

pub mod crypto;
pub mod forex;
pub mod stock;

pub use crypto::CryptoApi;
pub use forex::ForexApi;
pub use stock::StockApi;

use crate::domain::{Batch, BatchError, Source};
use crate::http::{FetchError, HttpClient};
use crate::validate::{partition, SourceSchema};
use chrono::{DateTime, SubsecRound, Utc};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("no valid records among {total} candidate(s): {first}")]
    NoValidRecords { total: usize, first: String },

    #[error("missing configuration: {0}")]
    MissingConfig(String),

    #[error(transparent)]
    Batch(#[from] BatchError),
}

/// A fully resolved GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    pub url: String,
    pub params: Vec<(String, String)>,
}

/// Addressing and response shape of one upstream API.
pub trait SourceApi: Send + Sync {
    fn source(&self) -> Source;

    fn schema(&self) -> &'static SourceSchema {
        SourceSchema::for_source(self.source())
    }

    /// Resolve the endpoint template and query parameters.
    fn request(&self) -> Result<ApiRequest, ExtractionError>;

    /// Unpack a decoded body into one JSON object per candidate record.
    fn candidates(&self, body: Value) -> Result<Vec<Value>, ExtractionError>;
}

/// Fill `{name}` placeholders in an endpoint template.
///
/// Every placeholder must be bound; an unbound one is a configuration error.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, ExtractionError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            ExtractionError::MissingConfig(format!("unterminated placeholder in '{template}'"))
        })?;
        let name = &after[..close];
        let value = vars
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| *v)
            .ok_or_else(|| {
                ExtractionError::MissingConfig(format!(
                    "unbound placeholder {{{name}}} in '{template}'"
                ))
            })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

pub(crate) fn trim_base_url(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// One source's extractor.
pub struct Extractor {
    api: Box<dyn SourceApi>,
    client: HttpClient,
}

impl Extractor {
    pub fn new(api: impl SourceApi + 'static, client: HttpClient) -> Self {
        Self {
            api: Box::new(api),
            client,
        }
    }

    pub fn from_boxed(api: Box<dyn SourceApi>, client: HttpClient) -> Self {
        Self { api, client }
    }

    pub fn source(&self) -> Source {
        self.api.source()
    }

    /// Call the API and decode the candidate records.
    pub fn fetch(&self) -> Result<Vec<Value>, ExtractionError> {
        let req = self.api.request()?;
        let resp = self.client.fetch(&req.url, &req.params)?;
        let body = resp
            .json()
            .map_err(|e| ExtractionError::Decode(format!("body is not JSON: {e}")))?;
        let candidates = self.api.candidates(body)?;
        tracing::debug!(
            source = %self.source(),
            candidates = candidates.len(),
            attempts = resp.attempts,
            "decoded response"
        );
        Ok(candidates)
    }

    /// Validate candidates into a batch stamped `extracted_at`.
    ///
    /// Fails when nothing survives.
    pub fn validate(
        &self,
        candidates: &[Value],
        extracted_at: DateTime<Utc>,
    ) -> Result<Batch, ExtractionError> {
        let source = self.source();
        let (records, dropped) = partition(candidates, self.api.schema(), extracted_at);

        if records.is_empty() {
            let first = dropped
                .first()
                .map(|d| d.error.to_string())
                .unwrap_or_else(|| "response contained no records".to_string());
            return Err(ExtractionError::NoValidRecords {
                total: candidates.len(),
                first,
            });
        }

        if !dropped.is_empty() {
            tracing::warn!(
                %source,
                kept = records.len(),
                dropped = dropped.len(),
                "partial batch"
            );
        }

        Ok(Batch::new(source, extracted_at, records, dropped)?)
    }

    pub fn extract(&self) -> Result<Batch, ExtractionError> {
        let extracted_at = Utc::now().trunc_subsecs(3);
        let candidates = self.fetch()?;
        self.validate(&candidates, extracted_at)
    }
}
