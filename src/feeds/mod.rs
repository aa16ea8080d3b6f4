mod gateway;
mod marketplace;

pub use gateway::GatewayFeed;
pub use marketplace::MarketplaceFeed;
