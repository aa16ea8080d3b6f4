use serde::Serialize;

use crate::correlate::ListingPair;
use crate::events::MarketParams;
use crate::prices::{wei_to_eth, PriceContext};

/// The derived record pushed to clients, one per correlated listing.
///
/// Superseded by a newer record with the same id on the next pass;
/// retired when a full pass completes without re-emitting it. Absent
/// optionals are omitted from the JSON, never zeroed.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RentalListing {
    pub id: String,
    pub token_id: String,
    pub token_id_link: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub seller: String,
    /// Unix seconds the asset was listed.
    pub listed: i64,
    pub sold: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sold_time: Option<i64>,
    /// Rental lock expiration, resolved on-chain or a 7-day fallback.
    pub expires_at: i64,
    pub fiat_symbol: String,
    pub eth_cost: f64,
    pub eth_gas_cost: f64,
    pub total_cost: f64,
    /// Estimated marginal yield of renting one additional unit.
    pub est_block: f64,
    /// Requires a yield-token price; absent when there is none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub est_profit: Option<f64>,
    /// Freshness timestamp, assigned at emission time.
    pub updated: i64,
}

/// User play parameters from the market form, with the form's defaults
/// applied.
#[derive(Debug, Clone, Copy)]
pub struct PlayParams {
    pub play_hours: f64,
    pub owned_count: f64,
}

impl Default for PlayParams {
    fn default() -> Self {
        PlayParams {
            play_hours: 3.0,
            owned_count: 0.0,
        }
    }
}

impl PlayParams {
    pub fn from_form(form: Option<&MarketParams>) -> Self {
        let defaults = PlayParams::default();
        match form {
            Some(form) => PlayParams {
                play_hours: form.play_hours.unwrap_or(defaults.play_hours),
                owned_count: form.owned_count.unwrap_or(defaults.owned_count),
            },
            None => defaults,
        }
    }
}

/// Yield-token output of a holding of `owned` units over the remaining
/// lock window. Discrete: the marginal yield of one more unit is the
/// difference of two evaluations, not a closed-form rate.
fn marginal_value(owned: f64, play_hours: f64, hours_left: f64) -> f64 {
    (24.0 * owned + (owned * play_hours).sqrt() * 100.0) * 0.66 * hours_left / 24.0
}

/// Whole hours from `now` to `expires_at`, clamped at zero once the lock
/// has already lapsed.
fn hours_left(expires_at: i64, now: i64) -> f64 {
    ((expires_at - now) / 3600).max(0) as f64
}

/// Compute the derived record for one correlated pair.
pub fn project(
    pair: &ListingPair,
    expires_at: i64,
    ctx: &PriceContext,
    params: PlayParams,
    fiat_symbol: &str,
    contract: &str,
    now: i64,
) -> RentalListing {
    let listing = &pair.listing;

    let hours_left = hours_left(expires_at, now);
    let value_with = marginal_value(params.owned_count + 1.0, params.play_hours, hours_left);
    let value_without = marginal_value(params.owned_count, params.play_hours, hours_left);
    let est_block = value_with - value_without;

    let eth_cost = wei_to_eth(listing.price_wei);
    let total_cost = (eth_cost + ctx.gas_cost_eth) * ctx.native_fiat_price;

    RentalListing {
        id: listing.asset_id.clone(),
        token_id: listing.token_id.clone(),
        token_id_link: format!(
            "https://opensea.io/assets/{}/{}",
            contract, listing.token_id
        ),
        name: listing.name.clone(),
        seller: listing.seller.clone(),
        listed: listing.timestamp,
        sold: pair.sale.is_some(),
        sold_time: pair.sale.as_ref().map(|sale| sale.timestamp),
        expires_at,
        fiat_symbol: fiat_symbol.to_string(),
        eth_cost,
        eth_gas_cost: ctx.gas_cost_eth,
        total_cost,
        est_block,
        est_profit: ctx
            .aux_fiat_price
            .map(|aux| est_block * aux - total_cost),
        updated: now,
    }
}
