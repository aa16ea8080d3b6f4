use std::collections::HashMap;

use crate::error::{Result, UpstreamError};

/// Fiat price client. One call per pass; prices are never cached.
pub struct CoingeckoClient {
    http: reqwest::Client,
    base_url: String,
}

impl CoingeckoClient {
    pub fn new(http: reqwest::Client, base_url: String) -> Self {
        Self { http, base_url }
    }

    /// Current price of the chain's native coin in the given fiat
    /// currency (coingecko currency id, e.g. "usd").
    pub async fn native_coin_price(&self, currency_id: &str) -> Result<f64> {
        let url = format!("{}/api/v3/simple/price", self.base_url);

        let response = self
            .http
            .get(&url)
            .query(&[("ids", "ethereum"), ("vs_currencies", currency_id)])
            .send()
            .await?
            .error_for_status()?;

        // Shape: { "ethereum": { "<currency>": 1234.56 } }
        let prices: HashMap<String, HashMap<String, f64>> = response.json().await?;

        prices
            .get("ethereum")
            .and_then(|by_currency| by_currency.get(currency_id))
            .copied()
            .ok_or_else(|| UpstreamError::BadResponse {
                service: "coingecko",
                detail: format!("no ethereum price for currency {currency_id}"),
            })
    }
}
