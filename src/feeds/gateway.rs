use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;

use crate::events::{ClientStateEvent, Trigger};
use crate::sink::LayerOp;

/// Bidirectional gateway connection: client-session state changes come
/// in, layer operations go out.
pub struct GatewayFeed {
    url: String,
}

impl GatewayFeed {
    pub fn new(url: String) -> Self {
        Self { url }
    }

    /// Spawns a task that stays connected to the gateway, forwarding
    /// inbound state changes as triggers and draining the layer-op
    /// channel onto the socket. Ops sent while disconnected are dropped;
    /// the next full refresh rebuilds the client's view anyway.
    pub fn spawn(self, tx: mpsc::Sender<Trigger>, mut ops: mpsc::Receiver<LayerOp>) {
        tokio::spawn(async move {
            loop {
                tracing::info!(url = %self.url, "connecting to gateway");

                match connect_async(self.url.as_str()).await {
                    Ok((ws_stream, _)) => {
                        tracing::info!("gateway connected");
                        let (mut write, mut read) = ws_stream.split();

                        loop {
                            tokio::select! {
                                message = read.next() => match message {
                                    Some(Ok(tungstenite::Message::Text(text))) => {
                                        let mut bytes = text.into_bytes();
                                        match simd_json::from_slice::<ClientStateEvent>(&mut bytes) {
                                            Ok(event) => {
                                                let _ = tx.send(Trigger::ClientState(event)).await;
                                            }
                                            Err(e) => {
                                                tracing::debug!("dropping unparseable gateway message: {}", e);
                                            }
                                        }
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        tracing::warn!("gateway error: {}", e);
                                        break;
                                    }
                                    None => {
                                        tracing::warn!("gateway closed the connection");
                                        break;
                                    }
                                },
                                op = ops.recv() => match op {
                                    Some(op) => {
                                        let json = serde_json::to_string(&op).unwrap();
                                        if let Err(e) = write.send(tungstenite::Message::Text(json)).await {
                                            tracing::warn!("failed to send layer op: {}", e);
                                            break;
                                        }
                                    }
                                    // Sink dropped: the worker is shutting down.
                                    None => return,
                                },
                            }
                        }
                    }
                    Err(e) => {
                        tracing::warn!("failed to connect to gateway: {}", e);
                    }
                }

                tracing::info!("reconnecting to gateway in 5 seconds");
                tokio::time::sleep(tokio::time::Duration::from_secs(5)).await;
            }
        });
    }
}
