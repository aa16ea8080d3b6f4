use std::future::Future;

use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy_primitives::{utils::format_ether, Address, U256};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;

use crate::error::{MetadataError, Result, UpstreamError};

/// Gas spent by one rental purchase transaction, used to estimate the gas
/// cost shown next to each listing.
const RENT_TX_GAS_UNITS: u64 = 204_764;

const TOKEN_URI_PREFIX: &str = "data:application/json;base64,";
const LOCK_EXPIRATION_TRAIT: &str = "Lock Expiration";

alloy::sol! {
    #[sol(rpc)]
    interface IStakedToken {
        function tokenURI(uint256 tokenId) external view returns (string memory);
    }
}

/// On-chain reads: current gas cost and per-token lock expiration.
pub trait ChainSource: Send + Sync {
    /// Cost in ether of one rental transaction at the current gas price.
    fn gas_cost_eth(&self) -> impl Future<Output = Result<f64>> + Send;

    /// Lock-expiration timestamp from the token's on-chain metadata.
    /// Failures are recovered by the caller with a fallback expiry.
    fn lock_expiration(
        &self,
        token_id: &str,
    ) -> impl Future<Output = std::result::Result<i64, MetadataError>> + Send;
}

pub struct ChainClient {
    provider: DynProvider,
    contract: Address,
}

impl ChainClient {
    pub fn new(rpc_url: &str, contract: Address) -> anyhow::Result<Self> {
        let provider = DynProvider::new(ProviderBuilder::new().connect_http(rpc_url.parse()?));
        Ok(Self { provider, contract })
    }
}

impl ChainSource for ChainClient {
    async fn gas_cost_eth(&self) -> Result<f64> {
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| UpstreamError::Rpc(e.to_string()))?;

        let wei = U256::from(gas_price) * U256::from(RENT_TX_GAS_UNITS);
        format_ether(wei)
            .parse()
            .map_err(|_| UpstreamError::Rpc("unparseable gas cost".to_string()))
    }

    async fn lock_expiration(&self, token_id: &str) -> std::result::Result<i64, MetadataError> {
        let token_id: U256 = token_id
            .parse()
            .map_err(|_| MetadataError::Decode(format!("bad token id {token_id}")))?;

        let token = IStakedToken::new(self.contract, self.provider.clone());
        let uri = token
            .tokenURI(token_id)
            .call()
            .await
            .map_err(|e| MetadataError::Rpc(e.to_string()))?;

        parse_lock_expiration(&uri)
    }
}

#[derive(Debug, Deserialize)]
struct TokenMetadata {
    #[serde(default)]
    attributes: Vec<TokenAttribute>,
}

#[derive(Debug, Deserialize)]
struct TokenAttribute {
    trait_type: Option<String>,
    value: Option<serde_json::Value>,
}

/// Decode a base64 json data-URI and pull out the lock expiration
/// attribute.
pub(crate) fn parse_lock_expiration(uri: &str) -> std::result::Result<i64, MetadataError> {
    let encoded = uri.strip_prefix(TOKEN_URI_PREFIX).unwrap_or(uri);

    let bytes = STANDARD
        .decode(encoded.trim())
        .map_err(|e| MetadataError::Decode(e.to_string()))?;
    let metadata: TokenMetadata =
        serde_json::from_slice(&bytes).map_err(|e| MetadataError::Decode(e.to_string()))?;

    let value = metadata
        .attributes
        .iter()
        .find(|attribute| attribute.trait_type.as_deref() == Some(LOCK_EXPIRATION_TRAIT))
        .and_then(|attribute| attribute.value.as_ref())
        .ok_or(MetadataError::MissingAttribute)?;

    match value {
        serde_json::Value::Number(n) => n.as_i64().ok_or(MetadataError::MissingAttribute),
        serde_json::Value::String(s) => s
            .parse()
            .map_err(|_| MetadataError::Decode(format!("bad lock expiration {s}"))),
        _ => Err(MetadataError::MissingAttribute),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_uri(json: &str) -> String {
        format!("{TOKEN_URI_PREFIX}{}", STANDARD.encode(json))
    }

    #[test]
    fn test_parse_lock_expiration() {
        let uri = data_uri(
            r#"{
                "name": "Critter #1",
                "attributes": [
                    { "trait_type": "Body", "value": "Green" },
                    { "trait_type": "Lock Expiration", "value": 1650001234 }
                ]
            }"#,
        );
        assert_eq!(parse_lock_expiration(&uri).unwrap(), 1650001234);
    }

    #[test]
    fn test_parse_lock_expiration_string_value() {
        let uri = data_uri(
            r#"{ "attributes": [ { "trait_type": "Lock Expiration", "value": "1650001234" } ] }"#,
        );
        assert_eq!(parse_lock_expiration(&uri).unwrap(), 1650001234);
    }

    #[test]
    fn test_missing_attribute() {
        let uri = data_uri(r#"{ "attributes": [ { "trait_type": "Body", "value": "Green" } ] }"#);
        assert!(matches!(
            parse_lock_expiration(&uri),
            Err(MetadataError::MissingAttribute)
        ));
    }

    #[test]
    fn test_not_base64() {
        assert!(matches!(
            parse_lock_expiration("ipfs://QmSomewhereElse"),
            Err(MetadataError::Decode(_))
        ));
    }
}
