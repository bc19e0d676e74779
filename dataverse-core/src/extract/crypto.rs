//! CoinGecko `/coins/markets`.

use super::{render_template, trim_base_url, ApiRequest, ExtractionError, SourceApi};
use crate::domain::Source;
use serde_json::Value;

pub const DEFAULT_BASE_URL: &str = "https://api.coingecko.com";
pub const DEFAULT_ENDPOINT: &str = "{base_url}/api/v3/coins/markets";

/// Top coins by market cap, one page.
#[derive(Debug, Clone)]
pub struct CryptoApi {
    base_url: String,
    endpoint: String,
    vs_currency: String,
    per_page: u32,
    api_key: Option<String>,
}

impl Default for CryptoApi {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

impl CryptoApi {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            vs_currency: "usd".to_string(),
            per_page: 10,
            api_key: None,
        }
    }

    pub fn with_endpoint(mut self, template: impl Into<String>) -> Self {
        self.endpoint = template.into();
        self
    }

    pub fn with_vs_currency(mut self, currency: impl Into<String>) -> Self {
        self.vs_currency = currency.into().to_ascii_lowercase();
        self
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page;
        self
    }

    /// Demo-plan key; the public endpoint also works without one.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_key = key.filter(|k| !k.trim().is_empty());
        self
    }
}

impl SourceApi for CryptoApi {
    fn source(&self) -> Source {
        Source::Crypto
    }

    fn request(&self) -> Result<ApiRequest, ExtractionError> {
        if self.per_page == 0 {
            return Err(ExtractionError::MissingConfig(
                "crypto per_page must be at least 1".into(),
            ));
        }
        let url = render_template(&self.endpoint, &[("base_url", trim_base_url(&self.base_url))])?;
        let mut params = vec![
            ("vs_currency".to_string(), self.vs_currency.clone()),
            ("order".to_string(), "market_cap_desc".to_string()),
            ("per_page".to_string(), self.per_page.to_string()),
            ("page".to_string(), "1".to_string()),
            ("sparkline".to_string(), "false".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("x_cg_demo_api_key".to_string(), key.clone()));
        }
        Ok(ApiRequest { url, params })
    }

    fn candidates(&self, body: Value) -> Result<Vec<Value>, ExtractionError> {
        match body {
            Value::Array(items) => Ok(items),
            Value::Object(obj) => {
                let msg = obj
                    .get("error")
                    .or_else(|| obj.get("status"))
                    .map(Value::to_string)
                    .unwrap_or_else(|| "object".to_string());
                Err(ExtractionError::Decode(format!("expected array of coins, got {msg}")))
            }
            other => Err(ExtractionError::Decode(format!(
                "expected array of coins, got {other}"
            ))),
        }
    }
}
