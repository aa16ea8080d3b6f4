mod api;
mod chain;
mod checker;
mod config;
mod correlate;
mod error;
mod events;
mod feeds;
mod prices;
mod projection;
mod reconcile;
mod sink;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::Address;
use tokio::sync::mpsc;

use api::{CoingeckoClient, MoralisClient, OpenseaClient};
use chain::ChainClient;
use checker::Checker;
use config::Config;
use events::{ClientStateEvent, Trigger};
use feeds::{GatewayFeed, MarketplaceFeed};
use prices::PriceFetcher;
use reconcile::Reconciler;
use sink::{ChannelSink, LayerOp};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load("config.toml")?;
    init_tracing(&cfg.general.log_level);

    let contract: Address = cfg.collection.contract_address.parse()?;
    let http = reqwest::Client::new();

    let opensea = OpenseaClient::new(
        http.clone(),
        cfg.opensea.base_url.clone(),
        cfg.opensea.api_key.clone(),
        cfg.collection.contract_address.clone(),
    );
    let coingecko = CoingeckoClient::new(http.clone(), cfg.coingecko.base_url.clone());
    let moralis = MoralisClient::new(
        http,
        cfg.moralis.base_url.clone(),
        cfg.moralis.api_key.clone(),
        cfg.collection.contract_address.clone(),
    );
    let chain = Arc::new(ChainClient::new(&cfg.rpc.eth_url, contract)?);

    // Triggers in, layer ops out.
    let (trigger_tx, mut trigger_rx) = mpsc::channel::<Trigger>(100);
    let (layer_tx, layer_rx) = mpsc::channel::<LayerOp>(256);
    let sink = ChannelSink::new(layer_tx);

    GatewayFeed::new(cfg.gateway.ws_url.clone()).spawn(trigger_tx.clone(), layer_rx);
    MarketplaceFeed::new(
        opensea.clone(),
        Duration::from_secs(cfg.opensea.poll_interval_secs),
    )
    .spawn(trigger_tx.clone());

    {
        let tx = trigger_tx.clone();
        tokio::spawn(async move {
            let _ = tokio::signal::ctrl_c().await;
            let _ = tx.send(Trigger::Shutdown).await;
        });
    }

    let prices = PriceFetcher::new(
        coingecko,
        moralis.clone(),
        chain.clone(),
        cfg.collection.aux_token_address.clone(),
    );
    let reconciler = Arc::new(Reconciler::new(
        opensea.clone(),
        prices,
        chain.clone(),
        sink.clone(),
        cfg.collection.contract_address.clone(),
        cfg.collection.market_path.clone(),
        cfg.opensea.window_hours,
    ));
    let rental_checker = Arc::new(Checker::new(chain, opensea, moralis, sink));

    // Last-known state per client session, fed by trigger A and read by
    // incremental passes.
    let mut sessions: HashMap<String, ClientStateEvent> = HashMap::new();

    tracing::info!("rental market worker started");

    while let Some(trigger) = trigger_rx.recv().await {
        match trigger {
            Trigger::ClientState(event) => {
                sessions.insert(event.client_id.clone(), event.clone());

                {
                    let rental_checker = rental_checker.clone();
                    let event = event.clone();
                    tokio::spawn(async move {
                        if let Err(error) = rental_checker.handle(&event).await {
                            tracing::error!(
                                client_id = %event.client_id,
                                %error,
                                "rental check pass failed"
                            );
                        }
                    });
                }

                if reconciler.matches_route(&event) {
                    let reconciler = reconciler.clone();
                    tokio::spawn(async move {
                        if let Err(error) = reconciler.handle_client_state(&event).await {
                            tracing::error!(
                                client_id = %event.client_id,
                                %error,
                                "full refresh pass failed"
                            );
                        }
                    });
                }
            }
            Trigger::MarketEvents(batch) => {
                let subscribed: Vec<ClientStateEvent> = sessions
                    .values()
                    .filter(|session| reconciler.matches_route(session))
                    .cloned()
                    .collect();
                if subscribed.is_empty() {
                    continue;
                }

                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    if let Err(error) = reconciler.handle_market_events(&subscribed, &batch).await {
                        tracing::error!(%error, "incremental pass failed");
                    }
                });
            }
            Trigger::Shutdown => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    Ok(())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt().with_env_filter(filter).init();
}
