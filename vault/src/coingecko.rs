//! CoinGecko contract-price source.
//!
//! `GET {base}/coins/{platform}/contract/{address}` and read
//! `market_data.current_price.{vs_currency}`, scaled to 18 decimals.
//! The caller decides how to retry; this client makes exactly one request
//! per [`PriceSource::price`] call.

use std::time::Duration;

use detf::U256;
use log::debug;
use reqwest::blocking::Client;

use crate::PriceSource;
use crate::error::{Result, VaultError};

const DEFAULT_BASE_URL: &str = "https://api.coingecko.com/api/v3";

/// Blocking CoinGecko client.
pub struct CoinGeckoClient {
    client: Client,
    base_url: String,
    platform: String,
    vs_currency: String,
    api_key: Option<String>,
}

impl CoinGeckoClient {
    /// Create a client for one asset platform (e.g. `binance-smart-chain`),
    /// quoting in `vs_currency` (e.g. `bnb`).
    pub fn new(platform: &str, vs_currency: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VaultError::Connection(format!("http client: {e}")))?;
        Ok(Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
            platform: platform.to_string(),
            vs_currency: vs_currency.to_lowercase(),
            api_key: None,
        })
    }

    pub fn with_api_key(mut self, key: &str) -> Self {
        self.api_key = Some(key.to_string());
        self
    }

    pub fn with_base_url(mut self, url: &str) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }
}

impl PriceSource for CoinGeckoClient {
    fn price(&self, id: &str) -> Result<U256> {
        let url = format!(
            "{}/coins/{}/contract/{id}",
            self.base_url, self.platform
        );
        debug!("CoinGecko price request: {url}");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("x-cg-demo-api-key", key);
        }
        let resp = request
            .send()
            .map_err(|e| VaultError::Connection(format!("price request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(VaultError::Read(format!("price for {id} returned {status}: {body}")));
        }

        let body = resp
            .text()
            .map_err(|e| VaultError::Read(format!("price body for {id}: {e}")))?;
        parse_price(&body, &self.vs_currency)
    }
}

/// Extract `market_data.current_price.{vs}` from a contract response and
/// scale it to an 18-decimal fixed-point integer.
pub fn parse_price(body: &str, vs_currency: &str) -> Result<U256> {
    let json: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| VaultError::Read(format!("failed to parse price response: {e}")))?;
    let price = json
        .pointer(&format!("/market_data/current_price/{vs_currency}"))
        .and_then(serde_json::Value::as_f64)
        .ok_or_else(|| VaultError::Read(format!("no {vs_currency} price in response")))?;
    to_fixed18(price)
}

fn to_fixed18(price: f64) -> Result<U256> {
    if !price.is_finite() || price < 0.0 {
        return Err(VaultError::Read(format!("invalid price {price}")));
    }
    let scaled = price * 1e18;
    if scaled >= u128::MAX as f64 {
        return Err(VaultError::Read(format!("price {price} out of range")));
    }
    Ok(U256::from(scaled as u128))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_current_price() {
        let body = r#"{"id":"pancakeswap-token","market_data":{"current_price":{"bnb":0.5,"usd":1.7}}}"#;
        assert_eq!(
            parse_price(body, "bnb").unwrap(),
            U256::from(500_000_000_000_000_000u128)
        );
    }

    #[test]
    fn missing_currency_is_error() {
        let body = r#"{"market_data":{"current_price":{"usd":1.7}}}"#;
        assert!(parse_price(body, "bnb").is_err());
    }

    #[test]
    fn error_payload_is_error() {
        assert!(parse_price(r#"{"error":"coin not found"}"#, "bnb").is_err());
        assert!(parse_price("not json", "bnb").is_err());
    }

    #[test]
    fn rejects_negative_and_nan() {
        assert!(to_fixed18(-1.0).is_err());
        assert!(to_fixed18(f64::NAN).is_err());
        assert_eq!(to_fixed18(0.0).unwrap(), U256::ZERO);
    }
}
