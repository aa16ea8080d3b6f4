use std::future::Future;
use std::sync::Arc;

use alloy_primitives::{utils::format_ether, U256};

use crate::api::{CoingeckoClient, MoralisClient};
use crate::chain::ChainSource;
use crate::error::Result;

/// Time-sensitive prices for one reconciliation pass. Computed fresh per
/// pass and never cached across passes.
#[derive(Debug, Clone)]
pub struct PriceContext {
    /// Native coin price in the client's selected fiat currency.
    pub native_fiat_price: f64,
    /// Gas cost of one rental transaction, in ether.
    pub gas_cost_eth: f64,
    /// Yield-token price in fiat. Absent while the token has no price
    /// source; profit projection is unavailable then, nothing more.
    pub aux_fiat_price: Option<f64>,
}

pub trait PriceSource: Send + Sync {
    fn fetch_price_context(
        &self,
        currency_id: &str,
    ) -> impl Future<Output = Result<PriceContext>> + Send;
}

/// Composes the gas, fiat and token price reads into one context.
pub struct PriceFetcher<C: ChainSource> {
    coingecko: CoingeckoClient,
    moralis: MoralisClient,
    chain: Arc<C>,
    aux_token_address: String,
}

impl<C: ChainSource> PriceFetcher<C> {
    pub fn new(
        coingecko: CoingeckoClient,
        moralis: MoralisClient,
        chain: Arc<C>,
        aux_token_address: String,
    ) -> Self {
        Self {
            coingecko,
            moralis,
            chain,
            aux_token_address,
        }
    }
}

impl<C: ChainSource> PriceSource for PriceFetcher<C> {
    async fn fetch_price_context(&self, currency_id: &str) -> Result<PriceContext> {
        let gas_cost_eth = self.chain.gas_cost_eth().await?;
        let native_fiat_price = self.coingecko.native_coin_price(currency_id).await?;

        let aux_fiat_price = self
            .moralis
            .token_price_wei(&self.aux_token_address)
            .await?
            .map(|wei| wei_to_eth(wei) * native_fiat_price);

        Ok(PriceContext {
            native_fiat_price,
            gas_cost_eth,
            aux_fiat_price,
        })
    }
}

/// Convert a wei amount to ether as a display float.
pub fn wei_to_eth(wei: U256) -> f64 {
    format_ether(wei).parse().unwrap_or(0.0)
}
