use std::collections::hash_map::Entry;
use std::collections::HashMap;

use crate::events::{AssetKey, EventKind, MarketplaceEvent};

/// A listing correlated with its sale, if one was observed.
#[derive(Debug, Clone)]
pub struct ListingPair {
    pub listing: MarketplaceEvent,
    pub sale: Option<MarketplaceEvent>,
}

/// One representative event per asset key.
///
/// The earliest timestamp wins; equal timestamps fall back to input
/// order. This keeps the choice deterministic even though upstream gives
/// no ordering guarantee. Quantity ≠ 1 events (bundles) are excluded.
fn representatives(
    events: &[MarketplaceEvent],
    kind: EventKind,
) -> (HashMap<AssetKey, &MarketplaceEvent>, Vec<AssetKey>) {
    let mut by_key: HashMap<AssetKey, &MarketplaceEvent> = HashMap::new();
    let mut first_seen = Vec::new();

    for event in events {
        if event.kind != kind || event.quantity != 1 {
            continue;
        }
        match by_key.entry(event.key()) {
            Entry::Vacant(slot) => {
                first_seen.push(slot.key().clone());
                slot.insert(event);
            }
            Entry::Occupied(mut slot) => {
                if event.timestamp < slot.get().timestamp {
                    slot.insert(event);
                }
            }
        }
    }

    (by_key, first_seen)
}

/// Correlate a full event window into (listing, sale?) pairs.
///
/// Keys present only among sales are dropped; a sale cannot be displayed
/// without its listing. Grouping is idempotent under duplicated input.
pub fn correlate(events: &[MarketplaceEvent]) -> Vec<ListingPair> {
    let (listings, listing_order) = representatives(events, EventKind::Listed);
    let (sales, _) = representatives(events, EventKind::Sold);

    listing_order
        .into_iter()
        .map(|key| ListingPair {
            listing: listings[&key].clone(),
            sale: sales.get(&key).map(|&sale| sale.clone()),
        })
        .collect()
}

/// Correlate an incremental batch against the full current window.
///
/// A new listing pairs with a sale from the same batch; a new sale pairs
/// with its listing anywhere in the window. New sales whose listing is
/// not in the window are dropped.
pub fn correlate_incremental(
    batch: &[MarketplaceEvent],
    window: &[MarketplaceEvent],
) -> Vec<ListingPair> {
    let (new_sales, _) = representatives(batch, EventKind::Sold);
    let (all_listings, _) = representatives(window, EventKind::Listed);

    batch
        .iter()
        .filter(|event| event.quantity == 1)
        .filter_map(|event| match event.kind {
            EventKind::Listed => Some(ListingPair {
                listing: event.clone(),
                sale: new_sales.get(&event.key()).map(|&sale| sale.clone()),
            }),
            EventKind::Sold => all_listings.get(&event.key()).map(|&listing| ListingPair {
                listing: listing.clone(),
                sale: Some(event.clone()),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::U256;

    fn ev(kind: EventKind, seller: &str, token_id: &str, timestamp: i64) -> MarketplaceEvent {
        MarketplaceEvent {
            kind,
            asset_id: format!("asset-{token_id}"),
            token_id: token_id.to_string(),
            name: Some(format!("Critter #{token_id}")),
            seller: seller.to_string(),
            quantity: 1,
            price_wei: U256::from(10).pow(U256::from(18)),
            timestamp,
        }
    }

    #[test]
    fn test_listing_without_sale() {
        let events = vec![ev(EventKind::Listed, "0xa", "1", 100)];

        let pairs = correlate(&events);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].listing.token_id, "1");
        assert!(pairs[0].sale.is_none());
    }

    #[test]
    fn test_listing_paired_with_sale() {
        let events = vec![
            ev(EventKind::Listed, "0xa", "1", 100),
            ev(EventKind::Sold, "0xa", "1", 200),
        ];

        let pairs = correlate(&events);
        assert_eq!(pairs.len(), 1);
        let sale = pairs[0].sale.as_ref().unwrap();
        assert_eq!(sale.timestamp, 200);
    }

    #[test]
    fn test_sale_requires_matching_seller() {
        // Same token listed by a different seller: keys differ, no pair.
        let events = vec![
            ev(EventKind::Listed, "0xa", "1", 100),
            ev(EventKind::Sold, "0xb", "1", 200),
        ];

        let pairs = correlate(&events);
        assert_eq!(pairs.len(), 1);
        assert!(pairs[0].sale.is_none());
    }

    #[test]
    fn test_sale_without_listing_dropped() {
        let events = vec![ev(EventKind::Sold, "0xa", "1", 200)];
        assert!(correlate(&events).is_empty());
    }

    #[test]
    fn test_bundles_excluded() {
        let mut bundle = ev(EventKind::Listed, "0xa", "1", 100);
        bundle.quantity = 4;

        assert!(correlate(&[bundle]).is_empty());
    }

    #[test]
    fn test_duplicate_window_is_idempotent() {
        let events = vec![
            ev(EventKind::Listed, "0xa", "1", 100),
            ev(EventKind::Listed, "0xb", "2", 150),
            ev(EventKind::Sold, "0xa", "1", 200),
        ];
        let mut duplicated = events.clone();
        duplicated.extend(events.clone());

        let once = correlate(&events);
        let twice = correlate(&duplicated);

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.listing.asset_id, b.listing.asset_id);
            assert_eq!(a.listing.timestamp, b.listing.timestamp);
            assert_eq!(a.sale.is_some(), b.sale.is_some());
        }
    }

    #[test]
    fn test_earliest_listing_wins_regardless_of_order() {
        // The later-timestamped relisting arrives first in input order.
        let events = vec![
            ev(EventKind::Listed, "0xa", "1", 300),
            ev(EventKind::Listed, "0xa", "1", 100),
        ];

        let pairs = correlate(&events);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].listing.timestamp, 100);
    }

    #[test]
    fn test_equal_timestamps_keep_first_seen() {
        let mut first = ev(EventKind::Listed, "0xa", "1", 100);
        first.asset_id = "asset-first".to_string();
        let mut second = ev(EventKind::Listed, "0xa", "1", 100);
        second.asset_id = "asset-second".to_string();

        let pairs = correlate(&[first, second]);
        assert_eq!(pairs[0].listing.asset_id, "asset-first");
    }

    #[test]
    fn test_incremental_listing_pairs_with_batch_sale() {
        let batch = vec![
            ev(EventKind::Listed, "0xa", "1", 100),
            ev(EventKind::Sold, "0xa", "1", 200),
        ];

        // The sold event alone is dropped (no window listing); the
        // listed event pairs with the sale from the same batch.
        let pairs = correlate_incremental(&batch, &[]);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].listing.timestamp, 100);
        assert_eq!(pairs[0].sale.as_ref().unwrap().timestamp, 200);
    }

    #[test]
    fn test_incremental_sale_pairs_with_window_listing() {
        let window = vec![ev(EventKind::Listed, "0xa", "1", 100)];
        let batch = vec![ev(EventKind::Sold, "0xa", "1", 200)];

        let pairs = correlate_incremental(&batch, &window);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].listing.timestamp, 100);
        assert_eq!(pairs[0].sale.as_ref().unwrap().timestamp, 200);
    }

    #[test]
    fn test_incremental_sale_without_listing_dropped() {
        let batch = vec![ev(EventKind::Sold, "0xa", "1", 200)];
        assert!(correlate_incremental(&batch, &[]).is_empty());
    }
}
