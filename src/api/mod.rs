mod coingecko;
mod moralis;
mod opensea;

pub use coingecko::CoingeckoClient;
pub use moralis::MoralisClient;
pub use opensea::OpenseaClient;

use std::future::Future;

use alloy_primitives::U256;

use crate::error::Result;
use crate::events::{EventWindow, MarketplaceEvent};

/// An active sell order on the marketplace for a single asset.
#[derive(Debug, Clone)]
pub struct SellListing {
    pub price_wei: U256,
    pub seller: String,
}

/// Marketplace event window reads. Duplicates across successive calls are
/// possible; callers must correlate idempotently.
pub trait EventSource: Send + Sync {
    fn fetch_events(
        &self,
        window: EventWindow,
    ) -> impl Future<Output = Result<Vec<MarketplaceEvent>>> + Send;
}

/// Single-asset marketplace reads.
pub trait AssetSource: Send + Sync {
    fn sell_listing(
        &self,
        token_id: u64,
    ) -> impl Future<Output = Result<Option<SellListing>>> + Send;
}

/// Token transfer history reads.
pub trait TransferSource: Send + Sync {
    /// The address the token was last minted/staked to, if any.
    fn staked_owner(
        &self,
        token_id: u64,
    ) -> impl Future<Output = Result<Option<String>>> + Send;
}
