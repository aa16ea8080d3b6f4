use serde::Deserialize;
use std::fs;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub general: General,
    pub gateway: Gateway,
    pub rpc: Rpc,
    pub opensea: Opensea,
    pub coingecko: Coingecko,
    pub moralis: Moralis,
    pub collection: Collection,
}

#[derive(Debug, Deserialize)]
pub struct General {
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct Gateway {
    pub ws_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Rpc {
    pub eth_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Opensea {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Seconds between incremental event polls.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Trailing window for full-refresh passes.
    #[serde(default = "default_window_hours")]
    pub window_hours: i64,
}

#[derive(Debug, Deserialize)]
pub struct Coingecko {
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
pub struct Moralis {
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Collection {
    /// Tracked NFT contract (staked tokens, marketplace listings).
    pub contract_address: String,
    /// ERC-20 yield token priced for the profit projection.
    pub aux_token_address: String,
    /// Client route that subscribes to the rental market.
    pub market_path: String,
}

fn default_poll_interval() -> u64 {
    30
}

fn default_window_hours() -> i64 {
    24
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        // API keys can come from the environment instead of the file.
        if let Ok(key) = std::env::var("OPENSEA_API_KEY") {
            config.opensea.api_key = Some(key);
        }
        if let Ok(key) = std::env::var("MORALIS_API_KEY") {
            config.moralis.api_key = Some(key);
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            [general]
            log_level = "info"

            [gateway]
            ws_url = "ws://localhost:3001/ws"

            [rpc]
            eth_url = "https://rpc.example.com"

            [opensea]
            base_url = "https://api.opensea.io"
            api_key = "abc"

            [coingecko]
            base_url = "https://api.coingecko.com"

            [moralis]
            base_url = "https://deep-index.moralis.io/api/v2"

            [collection]
            contract_address = "0x47f75e8dd28df8d6e7c39ccda47026b0dca99043"
            aux_token_address = "0x8a6d4c8735371ebaf8874fbd518b56edd66024eb"
            market_path = "/plugin/critterz/rental-market"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.opensea.poll_interval_secs, 30);
        assert_eq!(config.opensea.window_hours, 24);
        assert_eq!(config.moralis.api_key, None);
    }
}
