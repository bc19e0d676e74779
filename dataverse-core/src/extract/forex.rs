//! Exchange rates, Frankfurter `/latest` shape.
//!
//! The response is a single rates table keyed by quote currency; each entry is
//! flattened into one candidate with a `BASE/QUOTE` pair symbol.

use super::{render_template, trim_base_url, ApiRequest, ExtractionError, SourceApi};
use crate::domain::Source;
use serde_json::{json, Value};

pub const DEFAULT_BASE_URL: &str = "https://api.frankfurter.app";
pub const DEFAULT_ENDPOINT: &str = "{base_url}/latest";

#[derive(Debug, Clone)]
pub struct ForexApi {
    base_url: String,
    endpoint: String,
    base_currency: String,
    symbols: Vec<String>,
    api_key: Option<String>,
}

impl ForexApi {
    pub fn new(
        base_url: impl Into<String>,
        base_currency: impl Into<String>,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            base_currency: base_currency.into().trim().to_ascii_uppercase(),
            symbols: symbols
                .into_iter()
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect(),
            api_key: None,
        }
    }

    pub fn with_endpoint(mut self, template: impl Into<String>) -> Self {
        self.endpoint = template.into();
        self
    }

    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }
}

impl SourceApi for ForexApi {
    fn source(&self) -> Source {
        Source::Forex
    }

    fn request(&self) -> Result<ApiRequest, ExtractionError> {
        if self.base_currency.is_empty() {
            return Err(ExtractionError::MissingConfig("forex base currency is empty".into()));
        }
        if self.symbols.is_empty() {
            return Err(ExtractionError::MissingConfig("no forex symbols configured".into()));
        }
        let url = render_template(&self.endpoint, &[("base_url", trim_base_url(&self.base_url))])?;
        let mut params = vec![
            ("from".to_string(), self.base_currency.clone()),
            ("to".to_string(), self.symbols.join(",")),
        ];
        if let Some(key) = &self.api_key {
            params.push(("access_key".to_string(), key.clone()));
        }
        Ok(ApiRequest { url, params })
    }

    fn candidates(&self, body: Value) -> Result<Vec<Value>, ExtractionError> {
        let obj = body
            .as_object()
            .ok_or_else(|| ExtractionError::Decode(format!("expected rates object, got {body}")))?;
        let rates = obj
            .get("rates")
            .and_then(Value::as_object)
            .ok_or_else(|| ExtractionError::Decode("response has no 'rates' table".into()))?;
        let base = obj
            .get("base")
            .and_then(Value::as_str)
            .unwrap_or(&self.base_currency)
            .to_ascii_uppercase();
        let date = obj.get("date").cloned().unwrap_or(Value::Null);

        Ok(rates
            .iter()
            .map(|(quote, rate)| {
                let quote = quote.to_ascii_uppercase();
                json!({
                    "pair": format!("{base}/{quote}"),
                    "base": base,
                    "quote": quote,
                    "rate": rate,
                    "date": date,
                })
            })
            .collect())
    }
}
