use std::future::Future;

use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Result, UpstreamError};

/// Collection holding the per-collection busy markers.
const BUSY_COLLECTION: &str = "busy";

/// One tagged batch of records for a client's view.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Layer {
    pub id: String,
    pub collection_name: String,
    pub set: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Predicate for layer removal: by id, or by tag and age. The record set
/// is never read back; retirement is entirely predicate-driven.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<TimestampQuery>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TimestampQuery {
    pub lt: i64,
}

/// Outbound operation against the client-facing record store.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum LayerOp {
    #[serde(rename_all = "camelCase")]
    AddLayers {
        client_id: String,
        layers: Vec<Layer>,
    },
    #[serde(rename_all = "camelCase")]
    RemoveLayers {
        client_id: String,
        query: RemoveQuery,
    },
}

/// The only operations the core performs against the client-facing sink.
pub trait ClientSink: Send + Sync {
    fn add_layers(
        &self,
        client_id: &str,
        layers: Vec<Layer>,
    ) -> impl Future<Output = Result<()>> + Send;

    fn remove_layers(
        &self,
        client_id: &str,
        query: RemoveQuery,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Sink handing operations to the gateway writer task.
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<LayerOp>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<LayerOp>) -> Self {
        Self { tx }
    }
}

impl ClientSink for ChannelSink {
    async fn add_layers(&self, client_id: &str, layers: Vec<Layer>) -> Result<()> {
        self.tx
            .send(LayerOp::AddLayers {
                client_id: client_id.to_string(),
                layers,
            })
            .await
            .map_err(|_| UpstreamError::SinkClosed)
    }

    async fn remove_layers(&self, client_id: &str, query: RemoveQuery) -> Result<()> {
        self.tx
            .send(LayerOp::RemoveLayers {
                client_id: client_id.to_string(),
                query,
            })
            .await
            .map_err(|_| UpstreamError::SinkClosed)
    }
}

/// Publish the busy marker for a collection.
pub async fn emit_busy<S: ClientSink>(sink: &S, client_id: &str, collection: &str) -> Result<()> {
    sink.add_layers(
        client_id,
        vec![Layer {
            id: format!("busy-{collection}"),
            collection_name: BUSY_COLLECTION.to_string(),
            set: vec![serde_json::json!({ "id": collection })],
            tags: None,
            timestamp: None,
        }],
    )
    .await
}

/// Clear the busy marker for a collection.
pub async fn emit_done<S: ClientSink>(sink: &S, client_id: &str, collection: &str) -> Result<()> {
    sink.remove_layers(
        client_id,
        RemoveQuery {
            id: Some(format!("busy-{collection}")),
            ..Default::default()
        },
    )
    .await
}

/// Upsert a batch of records, tagged with the collection and stamped with
/// the emission timestamp.
pub async fn emit_documents<S: ClientSink, D: Serialize>(
    sink: &S,
    client_id: &str,
    collection: &str,
    documents: &[D],
    timestamp: i64,
) -> Result<()> {
    let set = documents
        .iter()
        .map(serde_json::to_value)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| UpstreamError::BadResponse {
            service: "sink",
            detail: e.to_string(),
        })?;

    sink.add_layers(
        client_id,
        vec![Layer {
            id: Uuid::new_v4().to_string(),
            collection_name: collection.to_string(),
            set,
            tags: Some(vec![collection.to_string()]),
            timestamp: Some(timestamp),
        }],
    )
    .await
}

/// Retire every record in the collection emitted before `cutoff`.
pub async fn remove_stale<S: ClientSink>(
    sink: &S,
    client_id: &str,
    collection: &str,
    cutoff: i64,
) -> Result<()> {
    sink.remove_layers(
        client_id,
        RemoveQuery {
            tags: Some(vec![collection.to_string()]),
            timestamp: Some(TimestampQuery { lt: cutoff }),
            ..Default::default()
        },
    )
    .await
}

/// Remove a single fixed-id layer.
pub async fn remove_layer<S: ClientSink>(sink: &S, client_id: &str, layer_id: &str) -> Result<()> {
    sink.remove_layers(
        client_id,
        RemoveQuery {
            id: Some(layer_id.to_string()),
            ..Default::default()
        },
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_busy_layer_shape() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = ChannelSink::new(tx);

        emit_busy(&sink, "client-1", "rentalListings").await.unwrap();

        let op = rx.recv().await.unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "addLayers");
        assert_eq!(json["clientId"], "client-1");
        assert_eq!(json["layers"][0]["id"], "busy-rentalListings");
        assert_eq!(json["layers"][0]["collectionName"], "busy");
        assert_eq!(json["layers"][0]["set"][0]["id"], "rentalListings");
    }

    #[tokio::test]
    async fn test_remove_stale_query_shape() {
        let (tx, mut rx) = mpsc::channel(8);
        let sink = ChannelSink::new(tx);

        remove_stale(&sink, "client-1", "rentalListings", 1650000000)
            .await
            .unwrap();

        let op = rx.recv().await.unwrap();
        let json = serde_json::to_value(&op).unwrap();
        assert_eq!(json["op"], "removeLayers");
        assert_eq!(json["query"]["tags"][0], "rentalListings");
        assert_eq!(json["query"]["timestamp"]["lt"], 1650000000);
        assert!(json["query"].get("id").is_none());
    }

    #[tokio::test]
    async fn test_closed_channel_is_sink_closed() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sink = ChannelSink::new(tx);

        let err = emit_done(&sink, "client-1", "rentalListings")
            .await
            .unwrap_err();
        assert!(matches!(err, UpstreamError::SinkClosed));
    }
}
