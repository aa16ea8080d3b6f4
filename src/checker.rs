use std::sync::Arc;

use serde::Serialize;

use crate::api::{AssetSource, TransferSource};
use crate::chain::ChainSource;
use crate::error::Result;
use crate::events::ClientStateEvent;
use crate::prices::wei_to_eth;
use crate::sink::{self, ClientSink, Layer};

/// Collection the single rental-check record lives in.
pub const RENTAL_CHECKS_COLLECTION: &str = "rentalChecks";

/// Derived record for one user-entered token id. Fixed id: each check
/// replaces the previous one wholesale.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalCheck {
    pub id: String,
    pub token_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_expiration: Option<i64>,
    pub gas_cost: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eth_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost_total: Option<f64>,
    pub not_for_sale: bool,
    pub seller_address: String,
    pub seller_address_masked: String,
    pub seller_is_owner: bool,
}

/// Answers "what would renting this exact token cost, and is the listing
/// legitimate" for the token id typed into the checker form.
pub struct Checker<C, A, T, S> {
    chain: Arc<C>,
    assets: A,
    transfers: T,
    sink: S,
}

impl<C, A, T, S> Checker<C, A, T, S>
where
    C: ChainSource,
    A: AssetSource,
    T: TransferSource,
    S: ClientSink,
{
    pub fn new(chain: Arc<C>, assets: A, transfers: T, sink: S) -> Self {
        Self {
            chain,
            assets,
            transfers,
            sink,
        }
    }

    /// Run one check pass for a client state change. Without a usable
    /// token id the record layer is removed instead of emitted, so stale
    /// results never outlive the form they came from.
    pub async fn handle(&self, event: &ClientStateEvent) -> Result<()> {
        let client_id = &event.client_id;
        sink::emit_busy(&self.sink, client_id, RENTAL_CHECKS_COLLECTION).await?;

        let token_id = event.rental_check().and_then(|form| form.token_id());
        let Some(token_id) = token_id else {
            sink::remove_layer(&self.sink, client_id, RENTAL_CHECKS_COLLECTION).await?;
            return sink::emit_done(&self.sink, client_id, RENTAL_CHECKS_COLLECTION).await;
        };

        let record = self.check(token_id).await?;
        let value =
            serde_json::to_value(&record).map_err(|e| crate::error::UpstreamError::BadResponse {
                service: "sink",
                detail: e.to_string(),
            })?;

        self.sink
            .add_layers(
                client_id,
                vec![Layer {
                    id: RENTAL_CHECKS_COLLECTION.to_string(),
                    collection_name: RENTAL_CHECKS_COLLECTION.to_string(),
                    set: vec![value],
                    tags: None,
                    timestamp: None,
                }],
            )
            .await?;

        sink::emit_done(&self.sink, client_id, RENTAL_CHECKS_COLLECTION).await
    }

    async fn check(&self, token_id: u64) -> Result<RentalCheck> {
        let token_id_str = token_id.to_string();

        // Lock expiration and gas cost are independent chain reads.
        let (lock_expiration, gas_cost) = futures_util::join!(
            self.chain.lock_expiration(&token_id_str),
            self.chain.gas_cost_eth(),
        );
        let gas_cost = gas_cost?;
        let lock_expiration = match lock_expiration {
            Ok(expiration) => Some(expiration),
            Err(error) => {
                tracing::debug!(token_id, %error, "lock expiration unresolved");
                None
            }
        };

        let listing = self.assets.sell_listing(token_id).await?;
        let not_for_sale = listing.is_none();

        let mut seller_address = "Unknown".to_string();
        let mut eth_cost = None;
        let mut estimated_cost_total = None;

        if let Some(listing) = &listing {
            let cost = wei_to_eth(listing.price_wei);
            eth_cost = Some(cost);
            estimated_cost_total = Some(cost + gas_cost);
            seller_address = listing.seller.to_lowercase();
        }

        // A listing is only trustworthy when the seller is the address
        // the token was staked to.
        let staked_owner = self.transfers.staked_owner(token_id).await?;
        let seller_is_owner =
            !not_for_sale && staked_owner.as_deref() == Some(seller_address.as_str());

        let seller_address_masked = if not_for_sale {
            seller_address.clone()
        } else {
            mask_address(&seller_address)
        };

        Ok(RentalCheck {
            id: "0".to_string(),
            token_id,
            lock_expiration,
            gas_cost,
            eth_cost,
            estimated_cost_total,
            not_for_sale,
            seller_address_masked,
            seller_address,
            seller_is_owner,
        })
    }
}

/// Short display form: the last six characters, uppercased.
fn mask_address(address: &str) -> String {
    if address.len() < 6 {
        return address.to_uppercase();
    }
    address[address.len() - 6..].to_uppercase()
}
