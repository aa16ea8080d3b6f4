use std::time::Duration;

use tokio::sync::mpsc;

use crate::api::{EventSource, OpenseaClient};
use crate::events::{EventKind, EventWindow, Trigger};

/// Polls the marketplace for newly observed events of the tracked
/// contract and pushes them as incremental triggers.
pub struct MarketplaceFeed {
    client: OpenseaClient,
    poll_interval: Duration,
}

impl MarketplaceFeed {
    pub fn new(client: OpenseaClient, poll_interval: Duration) -> Self {
        Self {
            client,
            poll_interval,
        }
    }

    /// Spawns the polling task. The cursor advances to the newest
    /// observed timestamp; re-reading a boundary second produces
    /// duplicates, which the correlator tolerates by design of its
    /// grouping.
    pub fn spawn(self, tx: mpsc::Sender<Trigger>) {
        tokio::spawn(async move {
            let mut cursor = chrono::Utc::now().timestamp();

            loop {
                tokio::time::sleep(self.poll_interval).await;

                let mut batch = Vec::new();
                for kind in [EventKind::Listed, EventKind::Sold] {
                    match self
                        .client
                        .fetch_events(EventWindow::Since { kind, cursor })
                        .await
                    {
                        Ok(events) => batch.extend(events),
                        Err(e) => {
                            tracing::warn!(kind = kind.api_name(), "event poll failed: {}", e);
                        }
                    }
                }

                if batch.is_empty() {
                    continue;
                }

                if let Some(newest) = batch.iter().map(|event| event.timestamp).max() {
                    cursor = cursor.max(newest);
                }

                tracing::debug!(events = batch.len(), "observed new marketplace events");
                if tx.send(Trigger::MarketEvents(batch)).await.is_err() {
                    // Main loop is gone: the worker is shutting down.
                    return;
                }
            }
        });
    }
}
