use alloy_primitives::U256;
use serde::Deserialize;

use super::TransferSource;
use crate::error::Result;

const NULL_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTokenPrice {
    native_price: Option<RawNativePrice>,
}

#[derive(Debug, Deserialize)]
struct RawNativePrice {
    value: String,
}

#[derive(Debug, Deserialize)]
struct TransfersPage {
    #[serde(default)]
    result: Vec<RawTransfer>,
}

#[derive(Debug, Deserialize)]
struct RawTransfer {
    from_address: Option<String>,
    to_address: Option<String>,
}

/// Indexer client: ERC-20 prices and NFT transfer history.
#[derive(Clone)]
pub struct MoralisClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    /// Tracked NFT contract, for transfer-history reads.
    nft_contract: String,
}

impl MoralisClient {
    pub fn new(
        http: reqwest::Client,
        base_url: String,
        api_key: Option<String>,
        nft_contract: String,
    ) -> Self {
        Self {
            http,
            base_url,
            api_key,
            nft_contract,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut request = self.http.get(url).query(&[("chain", "eth")]);
        if let Some(key) = &self.api_key {
            request = request.header("X-API-Key", key);
        }
        request
    }

    /// Latest price of an ERC-20 token in native-coin base units.
    ///
    /// `None` means the token has no price on the indexer yet. That is a
    /// legitimate partial result, not an error.
    pub async fn token_price_wei(&self, token_address: &str) -> Result<Option<U256>> {
        let url = format!("{}/erc20/{}/price", self.base_url, token_address);

        let response = self.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let price: RawTokenPrice = response.error_for_status()?.json().await?;

        Ok(price
            .native_price
            .and_then(|native| native.value.parse::<U256>().ok()))
    }
}

impl TransferSource for MoralisClient {
    async fn staked_owner(&self, token_id: u64) -> Result<Option<String>> {
        let url = format!(
            "{}/nft/{}/{}/transfers",
            self.base_url, self.nft_contract, token_id
        );

        let response = self.get(&url).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let page: TransfersPage = response.error_for_status()?.json().await?;

        // Transfers arrive newest first; the latest mint from the zero
        // address is the staking transfer.
        Ok(page
            .result
            .into_iter()
            .find(|transfer| transfer.from_address.as_deref() == Some(NULL_ADDRESS))
            .and_then(|transfer| transfer.to_address)
            .map(|address| address.to_lowercase()))
    }
}
