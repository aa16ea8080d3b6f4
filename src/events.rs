use alloy_primitives::U256;
use serde::Deserialize;

/// What happened to an asset on the marketplace.
///
/// Upstream rows that match neither shape are dropped at the ingestion
/// boundary, never propagated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Listed,
    Sold,
}

impl EventKind {
    /// Marketplace API name for this event kind.
    pub fn api_name(&self) -> &'static str {
        match self {
            EventKind::Listed => "created",
            EventKind::Sold => "successful",
        }
    }
}

/// Identity used to match a listing with its sale.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssetKey {
    pub seller: String,
    pub token_id: String,
}

/// One validated marketplace event. Immutable once observed.
#[derive(Debug, Clone)]
pub struct MarketplaceEvent {
    pub kind: EventKind,
    /// Marketplace-global asset id, used as the derived record's id.
    pub asset_id: String,
    pub token_id: String,
    pub name: Option<String>,
    pub seller: String,
    pub quantity: u64,
    /// Price in base units (wei).
    pub price_wei: U256,
    /// Unix seconds.
    pub timestamp: i64,
}

impl MarketplaceEvent {
    pub fn key(&self) -> AssetKey {
        AssetKey {
            seller: self.seller.clone(),
            token_id: self.token_id.clone(),
        }
    }
}

/// Window selector for the event fetcher.
#[derive(Debug, Clone, Copy)]
pub enum EventWindow {
    /// All events of interest within the last N hours.
    Trailing { hours: i64 },
    /// Events of one kind at or after a unix-seconds cursor.
    Since { kind: EventKind, cursor: i64 },
}

/// Currency the client selected for fiat display.
#[derive(Debug, Clone, Deserialize)]
pub struct Currency {
    pub id: String,
    pub symbol: String,
}

impl Default for Currency {
    fn default() -> Self {
        Currency {
            id: "usd".to_string(),
            symbol: "$".to_string(),
        }
    }
}

/// Rental-market parameter form, user editable.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketParams {
    pub play_hours: Option<f64>,
    pub owned_count: Option<f64>,
}

/// Rental-checker parameter form. The token id arrives as whatever the
/// form widget produced, so it is parsed leniently.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalCheckParams {
    pub token_id: Option<serde_json::Value>,
}

impl RentalCheckParams {
    pub fn token_id(&self) -> Option<u64> {
        match self.token_id.as_ref()? {
            serde_json::Value::Number(n) => n.as_u64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientForms {
    pub market_params: Option<MarketParams>,
    pub rental_check: Option<RentalCheckParams>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub path: Option<String>,
    pub selected_currency: Option<Currency>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClientState {
    #[serde(default)]
    pub client: ClientInfo,
    #[serde(default)]
    pub forms: ClientForms,
}

/// A client-session state change, received from the gateway.
/// Read-only input to the core.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStateEvent {
    pub client_id: String,
    /// Unix seconds the gateway received the state change. Used as the
    /// pass start timestamp for retirement cutoffs.
    pub received: i64,
    #[serde(default)]
    pub state: ClientState,
}

impl ClientStateEvent {
    pub fn path(&self) -> Option<&str> {
        self.state.client.path.as_deref()
    }

    pub fn currency(&self) -> Currency {
        self.state.client.selected_currency.clone().unwrap_or_default()
    }

    pub fn market_params(&self) -> Option<&MarketParams> {
        self.state.forms.market_params.as_ref()
    }

    pub fn rental_check(&self) -> Option<&RentalCheckParams> {
        self.state.forms.rental_check.as_ref()
    }
}

/// Everything the main loop reacts to.
#[derive(Debug)]
pub enum Trigger {
    /// A client session changed state (navigation, currency, form edit).
    ClientState(ClientStateEvent),
    /// Newly observed marketplace events for the tracked contract.
    MarketEvents(Vec<MarketplaceEvent>),
    /// Ctrl+C or kill signal.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_state_event_parse() {
        let json = r#"{
            "clientId": "client-1",
            "received": 1650000000,
            "state": {
                "client": {
                    "path": "/plugin/critterz/rental-market",
                    "selectedCurrency": { "id": "eur", "symbol": "€" }
                },
                "forms": {
                    "marketParams": { "playHours": 5, "ownedCount": 2 },
                    "rentalCheck": { "tokenId": "1234" }
                }
            }
        }"#;

        let event: ClientStateEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.client_id, "client-1");
        assert_eq!(event.received, 1650000000);
        assert_eq!(event.path(), Some("/plugin/critterz/rental-market"));
        assert_eq!(event.currency().id, "eur");
        assert_eq!(event.market_params().unwrap().play_hours, Some(5.0));
        assert_eq!(event.rental_check().unwrap().token_id(), Some(1234));
    }

    #[test]
    fn test_client_state_event_defaults() {
        // A minimal event with no state at all still parses.
        let json = r#"{ "clientId": "client-2", "received": 1650000000 }"#;

        let event: ClientStateEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.path(), None);
        assert_eq!(event.currency().id, "usd");
        assert!(event.market_params().is_none());
    }

    #[test]
    fn test_rental_check_token_id_forms() {
        let numeric: RentalCheckParams =
            serde_json::from_str(r#"{ "tokenId": 42 }"#).unwrap();
        assert_eq!(numeric.token_id(), Some(42));

        let string: RentalCheckParams =
            serde_json::from_str(r#"{ "tokenId": " 42 " }"#).unwrap();
        assert_eq!(string.token_id(), Some(42));

        let garbage: RentalCheckParams =
            serde_json::from_str(r#"{ "tokenId": "not a number" }"#).unwrap();
        assert_eq!(garbage.token_id(), None);
    }
}
