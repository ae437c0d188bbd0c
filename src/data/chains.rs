use crate::data::types::ChainConfig;

/// Get a chain preset by name. Each preset pairs an RPC endpoint with the
/// matching Safe transaction service instance.
pub fn get_chain_config(name: &str) -> Option<ChainConfig> {
    match name.to_lowercase().as_str() {
        "ethereum" | "eth" | "mainnet" => Some(ChainConfig {
            name: "Ethereum".to_string(),
            chain_id: 1,
            rpc_url: "https://eth.merkle.io".to_string(),
            tx_service_url: "https://safe-transaction-mainnet.safe.global".to_string(),
            symbol: "ETH".to_string(),
        }),
        "gnosis" | "xdai" => Some(ChainConfig {
            name: "Gnosis Chain".to_string(),
            chain_id: 100,
            rpc_url: "https://rpc.gnosischain.com".to_string(),
            tx_service_url: "https://safe-transaction-gnosis-chain.safe.global".to_string(),
            symbol: "xDAI".to_string(),
        }),
        "arbitrum" | "arb" => Some(ChainConfig {
            name: "Arbitrum One".to_string(),
            chain_id: 42161,
            rpc_url: "https://arb1.arbitrum.io/rpc".to_string(),
            tx_service_url: "https://safe-transaction-arbitrum.safe.global".to_string(),
            symbol: "ETH".to_string(),
        }),
        "polygon" | "matic" => Some(ChainConfig {
            name: "Polygon".to_string(),
            chain_id: 137,
            rpc_url: "https://polygon-rpc.com".to_string(),
            tx_service_url: "https://safe-transaction-polygon.safe.global".to_string(),
            symbol: "MATIC".to_string(),
        }),
        "sepolia" => Some(ChainConfig {
            name: "Sepolia".to_string(),
            chain_id: 11155111,
            rpc_url: "https://rpc.sepolia.org".to_string(),
            tx_service_url: "https://safe-transaction-sepolia.safe.global".to_string(),
            symbol: "ETH".to_string(),
        }),
        _ => None,
    }
}

/// Return a list of all supported chain names.
pub fn supported_chains() -> Vec<&'static str> {
    vec!["ethereum", "gnosis", "arbitrum", "polygon", "sepolia"]
}
