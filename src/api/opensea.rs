use alloy_primitives::U256;
use chrono::NaiveDateTime;
use serde::Deserialize;

use super::{EventSource, SellListing};
use crate::error::{Result, UpstreamError};
use crate::events::{EventKind, EventWindow, MarketplaceEvent};

/// Pagination safety stop. A 24h window for one collection fits in far
/// fewer pages than this.
const MAX_PAGES: usize = 50;

/// Raw marketplace event row. Upstream is loosely typed, so every field
/// is optional here; `validate` decides what survives.
#[derive(Debug, Deserialize)]
pub struct RawAssetEvent {
    pub event_type: Option<String>,
    pub quantity: Option<serde_json::Value>,
    pub starting_price: Option<String>,
    pub total_price: Option<String>,
    pub listing_time: Option<String>,
    pub created_date: Option<String>,
    pub seller: Option<RawAccount>,
    pub asset: Option<RawAsset>,
}

#[derive(Debug, Deserialize)]
pub struct RawAccount {
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RawAsset {
    pub id: Option<serde_json::Value>,
    pub token_id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventsPage {
    next: Option<String>,
    #[serde(default)]
    asset_events: Vec<RawAssetEvent>,
}

#[derive(Debug, Deserialize)]
struct RawOrder {
    side: Option<i64>,
    base_price: Option<String>,
    maker: Option<RawAccount>,
}

#[derive(Debug, Deserialize)]
struct RawSingleAsset {
    #[serde(default)]
    orders: Option<Vec<RawOrder>>,
}

/// Marketplace API client for the tracked contract.
#[derive(Clone)]
pub struct OpenseaClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    contract: String,
}

impl OpenseaClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        contract: String,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            contract,
        }
    }

    /// Fetch one kind of event at or after `occurred_after`, following
    /// pagination cursors.
    async fn events_of_kind(
        &self,
        kind: EventKind,
        occurred_after: i64,
    ) -> Result<Vec<MarketplaceEvent>> {
        let url = format!("{}/api/v1/events", self.base_url);
        let mut events = Vec::new();
        let mut cursor: Option<String> = None;

        for page in 0..MAX_PAGES {
            let mut request = self
                .http
                .get(&url)
                .query(&[
                    ("asset_contract_address", self.contract.as_str()),
                    ("event_type", kind.api_name()),
                ])
                .query(&[("occurred_after", occurred_after)]);

            if let Some(key) = &self.api_key {
                request = request.header("X-API-KEY", key);
            }
            if let Some(cursor) = &cursor {
                request = request.query(&[("cursor", cursor.as_str())]);
            }

            let response = request.send().await?.error_for_status()?;
            let body: EventsPage = response.json().await?;

            events.extend(body.asset_events.into_iter().filter_map(validate_event));

            match body.next {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => return Ok(events),
            }

            if page == MAX_PAGES - 1 {
                tracing::warn!(
                    kind = kind.api_name(),
                    "event window truncated at {} pages",
                    MAX_PAGES
                );
            }
        }

        Ok(events)
    }
}

impl EventSource for OpenseaClient {
    async fn fetch_events(&self, window: EventWindow) -> Result<Vec<MarketplaceEvent>> {
        match window {
            EventWindow::Trailing { hours } => {
                let since = chrono::Utc::now().timestamp() - hours * 3600;
                let mut events = self.events_of_kind(EventKind::Listed, since).await?;
                events.extend(self.events_of_kind(EventKind::Sold, since).await?);
                Ok(events)
            }
            EventWindow::Since { kind, cursor } => self.events_of_kind(kind, cursor).await,
        }
    }
}

impl super::AssetSource for OpenseaClient {
    async fn sell_listing(&self, token_id: u64) -> Result<Option<SellListing>> {
        let url = format!(
            "{}/api/v1/asset/{}/{}/",
            self.base_url, self.contract, token_id
        );

        let mut request = self.http.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-KEY", key);
        }

        let response = request.send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let asset: RawSingleAsset = response.error_for_status()?.json().await?;

        // Side 1 is a sell order; the first one is the marketplace's
        // current listing.
        let order = asset
            .orders
            .unwrap_or_default()
            .into_iter()
            .find(|order| order.side == Some(1));

        let Some(order) = order else {
            return Ok(None);
        };

        let price_wei = order
            .base_price
            .as_deref()
            .and_then(|price| price.parse::<U256>().ok())
            .ok_or_else(|| UpstreamError::BadResponse {
                service: "opensea",
                detail: "sell order without a parseable base_price".to_string(),
            })?;
        let seller = order
            .maker
            .and_then(|maker| maker.address)
            .ok_or_else(|| UpstreamError::BadResponse {
                service: "opensea",
                detail: "sell order without a maker address".to_string(),
            })?;

        Ok(Some(SellListing { price_wei, seller }))
    }
}

/// Ingestion boundary: turn a raw upstream row into a tagged event, or
/// drop it. Rows that match neither known shape never propagate.
pub(crate) fn validate_event(raw: RawAssetEvent) -> Option<MarketplaceEvent> {
    let kind = match raw.event_type.as_deref() {
        Some("created") => EventKind::Listed,
        Some("successful") => EventKind::Sold,
        other => {
            tracing::debug!(event_type = ?other, "dropping unknown event kind");
            return None;
        }
    };

    let asset = raw.asset?;
    let asset_id = match asset.id? {
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::String(s) => s,
        _ => return None,
    };
    let token_id = asset.token_id?;
    let seller = raw.seller.and_then(|seller| seller.address)?;
    let quantity = parse_quantity(raw.quantity.as_ref())?;

    // Listings are priced by starting_price, sales by total_price. A
    // listing without a price can't be projected, so it is dropped.
    let price_wei = match kind {
        EventKind::Listed => raw.starting_price.as_deref()?.parse::<U256>().ok()?,
        EventKind::Sold => raw
            .total_price
            .as_deref()
            .and_then(|price| price.parse::<U256>().ok())
            .unwrap_or(U256::ZERO),
    };

    // Listings are stamped by their listing time, sales by the time the
    // sale row was created.
    let timestamp = match kind {
        EventKind::Listed => raw
            .listing_time
            .as_deref()
            .or(raw.created_date.as_deref())
            .and_then(parse_utc)?,
        EventKind::Sold => raw.created_date.as_deref().and_then(parse_utc)?,
    };

    Some(MarketplaceEvent {
        kind,
        asset_id,
        token_id,
        name: asset.name,
        seller,
        quantity,
        price_wei,
        timestamp,
    })
}

fn parse_quantity(value: Option<&serde_json::Value>) -> Option<u64> {
    match value? {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

/// Upstream timestamps are naive ISO-8601 in UTC.
fn parse_utc(s: &str) -> Option<i64> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp())
}
