/// Errors from the external collaborators a pass depends on.
///
/// Any of these aborts the current pass; the busy marker stays set until
/// the next successful pass for the session clears it. Retry belongs to
/// the outer trigger cadence, not to the component that failed.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rpc call failed: {0}")]
    Rpc(String),

    #[error("unexpected response from {service}: {detail}")]
    BadResponse {
        service: &'static str,
        detail: String,
    },

    #[error("client sink closed")]
    SinkClosed,
}

/// Errors while resolving one asset's on-chain lock expiration.
///
/// Recovered locally with a fallback expiry; never aborts the pass or
/// sibling assets.
#[derive(Debug, thiserror::Error)]
pub enum MetadataError {
    #[error("rpc call failed: {0}")]
    Rpc(String),

    #[error("token metadata is not base64 json: {0}")]
    Decode(String),

    #[error("no lock expiration attribute in token metadata")]
    MissingAttribute,
}

pub type Result<T> = std::result::Result<T, UpstreamError>;
