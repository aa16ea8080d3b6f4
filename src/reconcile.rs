use std::sync::Arc;

use futures_util::future::join_all;

use crate::api::EventSource;
use crate::chain::ChainSource;
use crate::correlate::{self, ListingPair};
use crate::error::Result;
use crate::events::{ClientStateEvent, EventWindow, MarketplaceEvent};
use crate::prices::{PriceContext, PriceSource};
use crate::projection::{self, PlayParams};
use crate::sink::{self, ClientSink};

/// Collection the rental-market records live in.
pub const RENTAL_LISTINGS_COLLECTION: &str = "rentalListings";

/// Expiry assumed when the on-chain lock cannot be resolved.
const FALLBACK_LOCK_SECS: i64 = 7 * 86_400;

/// Drives the busy/emit/retire/done protocol for client sessions.
///
/// Two trigger sources invoke it: a full refresh when a session lands on
/// the rental-market route, and an incremental push when the poller
/// observes new marketplace events. Passes for different sessions may
/// interleave freely; within one pass every upsert is issued before the
/// retirement sweep.
pub struct Reconciler<E, P, C, S> {
    events: E,
    prices: P,
    chain: Arc<C>,
    sink: S,
    /// Tracked contract address, for marketplace links.
    contract: String,
    /// Client route that subscribes to this collection.
    market_path: String,
    window_hours: i64,
}

impl<E, P, C, S> Reconciler<E, P, C, S>
where
    E: EventSource,
    P: PriceSource,
    C: ChainSource,
    S: ClientSink,
{
    pub fn new(
        events: E,
        prices: P,
        chain: Arc<C>,
        sink: S,
        contract: String,
        market_path: String,
        window_hours: i64,
    ) -> Self {
        Self {
            events,
            prices,
            chain,
            sink,
            contract,
            market_path,
            window_hours,
        }
    }

    /// Whether a client session is subscribed to the rental market.
    pub fn matches_route(&self, event: &ClientStateEvent) -> bool {
        event.path() == Some(self.market_path.as_str())
    }

    /// Full-refresh pass for one session.
    ///
    /// Busy → fetch window and prices → correlate → emit one record per
    /// listing → retire everything older than this pass → done. Any
    /// collaborator failure aborts the pass and leaves the busy marker
    /// set; the next successful pass clears it.
    pub async fn handle_client_state(&self, event: &ClientStateEvent) -> Result<()> {
        let client_id = &event.client_id;
        sink::emit_busy(&self.sink, client_id, RENTAL_LISTINGS_COLLECTION).await?;

        let window = self
            .events
            .fetch_events(EventWindow::Trailing {
                hours: self.window_hours,
            })
            .await?;
        let ctx = self.prices.fetch_price_context(&event.currency().id).await?;

        let pairs = correlate::correlate(&window);
        tracing::debug!(
            client_id = %client_id,
            listings = pairs.len(),
            window = window.len(),
            "full refresh pass"
        );

        self.emit_pairs(event, &pairs, &ctx).await?;

        sink::remove_stale(
            &self.sink,
            client_id,
            RENTAL_LISTINGS_COLLECTION,
            event.received,
        )
        .await?;
        sink::emit_done(&self.sink, client_id, RENTAL_LISTINGS_COLLECTION).await
    }

    /// Incremental pass: push newly observed events to every subscribed
    /// session.
    ///
    /// The batch is additions-only, so there is no retirement sweep here;
    /// a sweep keyed on this pass's start would wipe every record the
    /// batch didn't touch. The periodic full refresh owns retirement.
    pub async fn handle_market_events(
        &self,
        sessions: &[ClientStateEvent],
        batch: &[MarketplaceEvent],
    ) -> Result<()> {
        if sessions.is_empty() || batch.is_empty() {
            return Ok(());
        }

        // One window fetch shared by all sessions; prices are per
        // session (currency selection differs).
        let window = self
            .events
            .fetch_events(EventWindow::Trailing {
                hours: self.window_hours,
            })
            .await?;
        let pairs = correlate::correlate_incremental(batch, &window);
        tracing::debug!(
            sessions = sessions.len(),
            batch = batch.len(),
            pairs = pairs.len(),
            "incremental pass"
        );

        let pairs = &pairs;
        let results = join_all(sessions.iter().map(|session| async move {
            let client_id = &session.client_id;
            sink::emit_busy(&self.sink, client_id, RENTAL_LISTINGS_COLLECTION).await?;

            let ctx = self
                .prices
                .fetch_price_context(&session.currency().id)
                .await?;
            self.emit_pairs(session, pairs, &ctx).await?;

            sink::emit_done(&self.sink, client_id, RENTAL_LISTINGS_COLLECTION).await
        }))
        .await;

        // Sessions fail independently; surface the first failure once
        // every session pass has run to completion.
        results.into_iter().collect()
    }

    /// Resolve, project and upsert every pair, fanning the on-chain lock
    /// reads out concurrently. A failed read falls back to a 7-day
    /// expiry and never disturbs sibling pairs.
    async fn emit_pairs(
        &self,
        event: &ClientStateEvent,
        pairs: &[ListingPair],
        ctx: &PriceContext,
    ) -> Result<()> {
        let params = PlayParams::from_form(event.market_params());
        let fiat_symbol = event.currency().symbol;
        let fiat_symbol = fiat_symbol.as_str();

        let results = join_all(pairs.iter().map(|pair| async move {
            let expires_at = match self.chain.lock_expiration(&pair.listing.token_id).await {
                Ok(expires_at) => expires_at,
                Err(error) => {
                    tracing::debug!(
                        token_id = %pair.listing.token_id,
                        %error,
                        "lock expiration unresolved, using fallback"
                    );
                    event.received + FALLBACK_LOCK_SECS
                }
            };

            let record = projection::project(
                pair,
                expires_at,
                ctx,
                params,
                fiat_symbol,
                &self.contract,
                event.received,
            );

            sink::emit_documents(
                &self.sink,
                &event.client_id,
                RENTAL_LISTINGS_COLLECTION,
                &[record],
                chrono::Utc::now().timestamp(),
            )
            .await
        }))
        .await;

        results.into_iter().collect()
    }
}
