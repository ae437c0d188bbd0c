use alloy::providers::{Provider, ProviderBuilder};
use color_eyre::eyre::Result;

/// The concrete provider type returned by `ProviderBuilder::new().on_http(url)`.
/// We use a trait-object-based wrapper to avoid spelling out the full generic type.
pub struct EthProvider {
    provider: Box<dyn Provider + Send + Sync>,
    chain_id: u64,
}

impl EthProvider {
    /// Connect to an Ethereum node via HTTP RPC.
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let url = rpc_url.parse()?;
        let provider = ProviderBuilder::new().on_http(url);
        let chain_id = provider.get_chain_id().await?;
        Ok(Self {
            provider: Box::new(provider),
            chain_id,
        })
    }

    /// Chain ID obtained at connection time.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Borrow the underlying provider for single and batched RPC calls.
    pub fn inner(&self) -> &(dyn Provider + Send + Sync) {
        self.provider.as_ref()
    }
}
