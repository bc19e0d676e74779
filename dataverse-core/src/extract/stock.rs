//! Equity quotes, Financial Modeling Prep `/quote/{symbols}` shape.

use super::{render_template, trim_base_url, ApiRequest, ExtractionError, SourceApi};
use crate::domain::Source;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://financialmodelingprep.com";
pub const DEFAULT_ENDPOINT: &str = "{base_url}/api/v3/quote/{symbols}";

#[derive(Debug, Clone)]
pub struct StockApi {
    base_url: String,
    endpoint: String,
    symbols: Vec<String>,
    api_key: Option<String>,
}

impl StockApi {
    pub fn new(base_url: impl Into<String>, symbols: Vec<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
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

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }
}

impl SourceApi for StockApi {
    fn source(&self) -> Source {
        Source::Stock
    }

    fn request(&self) -> Result<ApiRequest, ExtractionError> {
        let key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ExtractionError::MissingConfig("STOCK_API_KEY is not set".into()))?;
        if self.symbols.is_empty() {
            return Err(ExtractionError::MissingConfig("no stock symbols configured".into()));
        }
        let symbols = self.symbols.join(",");
        let url = render_template(
            &self.endpoint,
            &[
                ("base_url", trim_base_url(&self.base_url)),
                ("symbols", symbols.as_str()),
            ],
        )?;
        Ok(ApiRequest {
            url,
            params: vec![("apikey".to_string(), key.clone())],
        })
    }

    fn candidates(&self, body: Value) -> Result<Vec<Value>, ExtractionError> {
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(obj) => {
                let msg = obj
                    .get("Error Message")
                    .and_then(Value::as_str)
                    .unwrap_or("unexpected object");
                Err(ExtractionError::Decode(format!("quote endpoint: {msg}")))
            }
            other => Err(ExtractionError::Decode(format!(
                "expected array of quotes, got {other}"
            ))),
        }
    }
}
