use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use alloy::primitives::{address, Address, Bytes, U256};
use alloy::providers::Provider;
use alloy::rpc::types::TransactionRequest;
use alloy::sol;
use alloy::sol_types::SolCall;
use lru::LruCache;
use tracing::debug;

use crate::data::batch::{batch_eth_call, BatchCall};
use crate::data::types::TokenInfo;
use crate::error::TokenResolutionError;

// Standard ERC-20 metadata views. Some older tokens answer the same selectors
// with different return shapes; those are hand-parsed in the fallback path.
sol! {
    #[allow(missing_docs)]
    function symbol() external view returns (string);
    #[allow(missing_docs)]
    function decimals() external view returns (uint8);
}

/// Registry of tokens known to be fungible ERC-20s.
///
/// Consulted during classification before any on-chain probe: a `transfer`
/// call to an address missing from this registry is treated as a collectible
/// transfer rather than a token transfer.
#[derive(Debug, Clone, Default)]
pub struct KnownTokens {
    by_address: HashMap<Address, TokenInfo>,
}

impl KnownTokens {
    /// Built-in registry for the given chain. Chains without a curated list
    /// get an empty registry, which pushes every token through the probe.
    pub fn defaults_for(chain_id: u64) -> Self {
        let tokens: &[(Address, &str, u8)] = match chain_id {
            1 => &[
                (address!("6b175474e89094c44da98b954eedeac495271d0f"), "DAI", 18),
                (address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"), "USDC", 6),
                (address!("dac17f958d2ee523a2206206994597c13d831ec7"), "USDT", 6),
                (address!("6810e776880c02933d47db1b9fc05908e5386b96"), "GNO", 18),
                (address!("c02aaa39b223fe8d0a0e5c4f27ead9083c756cc2"), "WETH", 18),
            ],
            100 => &[
                (address!("e91d153e0b41518a2ce8dd3d7944fa863463a97d"), "WXDAI", 18),
                (address!("ddafbb505ad214d7b80b1f830fccc89b60fb7a83"), "USDC", 6),
                (address!("9c58bacc331c9aa871afd802db6379a98e80cedb"), "GNO", 18),
            ],
            _ => &[],
        };
        tokens
            .iter()
            .map(|(address, symbol, decimals)| TokenInfo {
                address: *address,
                symbol: symbol.to_string(),
                decimals: *decimals,
            })
            .collect()
    }

    pub fn contains(&self, address: Address) -> bool {
        self.by_address.contains_key(&address)
    }

    pub fn get(&self, address: Address) -> Option<&TokenInfo> {
        self.by_address.get(&address)
    }

    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

impl FromIterator<TokenInfo> for KnownTokens {
    fn from_iter<I: IntoIterator<Item = TokenInfo>>(iter: I) -> Self {
        Self {
            by_address: iter.into_iter().map(|t| (t.address, t)).collect(),
        }
    }
}

/// Which metadata field a probe call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeField {
    Symbol,
    Decimals,
}

/// On-chain token metadata resolver with miss caching.
///
/// Probe order: one batched round trip with the standard `string`/`uint8`
/// shapes, then an independent fallback call per missing field with the
/// legacy `bytes32`/`uint256` shapes. Addresses that answer without usable
/// metadata are cached as misses so a dead address is probed at most once.
/// A lost round trip is not a miss; the next cycle probes again.
pub struct TokenResolver {
    cache: Mutex<LruCache<Address, Option<TokenInfo>>>,
}

impl TokenResolver {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(500).unwrap())),
        }
    }

    pub async fn resolve(
        &self,
        provider: &(dyn Provider + Send + Sync),
        address: Address,
    ) -> Result<TokenInfo, TokenResolutionError> {
        // 1. Check cache (both hits and recorded misses)
        {
            if let Ok(mut cache) = self.cache.lock() {
                if let Some(cached) = cache.get(&address) {
                    return match cached {
                        Some(info) => Ok(info.clone()),
                        None => Err(TokenResolutionError::CachedMiss(address.to_string())),
                    };
                }
            }
        }

        // 2. Probe the chain
        let result = self.probe(provider, address).await;

        // 3. Cache hits and semantic misses. A transport failure is neither,
        //    so the next cycle asks again.
        let entry = match &result {
            Ok(info) => Some(Some(info.clone())),
            Err(TokenResolutionError::Unresolvable(_)) => Some(None),
            Err(_) => None,
        };
        if let Some(entry) = entry {
            if let Ok(mut cache) = self.cache.lock() {
                cache.put(address, entry);
            }
        }
        result
    }

    async fn probe(
        &self,
        provider: &(dyn Provider + Send + Sync),
        address: Address,
    ) -> Result<TokenInfo, TokenResolutionError> {
        let calls = vec![
            BatchCall {
                target: address,
                calldata: Bytes::from(symbolCall {}.abi_encode()),
                context: ProbeField::Symbol,
            },
            BatchCall {
                target: address,
                calldata: Bytes::from(decimalsCall {}.abi_encode()),
                context: ProbeField::Decimals,
            },
        ];
        let mut symbol = None;
        let mut decimals = None;
        let mut transport: Option<TokenResolutionError> = None;

        // Endpoints that reject batch requests land in the Err arm; the
        // single-call fallbacks below still run for them.
        match batch_eth_call(provider, calls).await {
            Ok(outcomes) => {
                for outcome in outcomes {
                    let field = outcome.context;
                    match field {
                        ProbeField::Symbol => {
                            // an empty symbol counts as a miss
                            symbol = outcome
                                .decode_as::<symbolCall>()
                                .1
                                .ok()
                                .map(|ret| ret._0)
                                .filter(|s| !s.is_empty());
                        }
                        ProbeField::Decimals => {
                            decimals =
                                outcome.decode_as::<decimalsCall>().1.ok().map(|ret| ret._0);
                        }
                    }
                }
            }
            Err(err) => {
                debug!(token = %address, %err, "metadata batch lost, probing with single calls");
                transport = Some(TokenResolutionError::Transport(err.to_string()));
            }
        }

        // Fallback probes run per missing field, each as its own call
        if symbol.is_none() {
            debug!(token = %address, "trying bytes32 symbol fallback");
            match self
                .call_single(provider, address, symbolCall {}.abi_encode())
                .await
            {
                Ok(data) => symbol = data.and_then(|d| parse_bytes32_symbol(&d)),
                Err(err) => transport = Some(err),
            }
        }
        if decimals.is_none() {
            debug!(token = %address, "trying uint256 decimals fallback");
            match self
                .call_single(provider, address, decimalsCall {}.abi_encode())
                .await
            {
                Ok(data) => decimals = data.and_then(|d| parse_uint_decimals(&d)),
                Err(err) => transport = Some(err),
            }
        }

        match (symbol, decimals) {
            (Some(symbol), Some(decimals)) => Ok(TokenInfo {
                address,
                symbol,
                decimals,
            }),
            // a field lost in transport was never answered, so this is only
            // a miss when every probe got a reply
            _ => Err(transport
                .unwrap_or_else(|| TokenResolutionError::Unresolvable(address.to_string()))),
        }
    }

    /// One `eth_call` outside the batch. `Ok(None)` means the node answered
    /// with an error response (a revert, or no such method); a request that
    /// never reached the node is `Err`.
    async fn call_single(
        &self,
        provider: &(dyn Provider + Send + Sync),
        address: Address,
        calldata: Vec<u8>,
    ) -> Result<Option<Bytes>, TokenResolutionError> {
        let tx = TransactionRequest::default()
            .to(address)
            .input(Bytes::from(calldata).into());
        match provider.call(tx).await {
            Ok(data) => Ok(Some(data)),
            Err(err) if err.is_error_resp() => Ok(None),
            Err(err) => Err(TokenResolutionError::Transport(err.to_string())),
        }
    }
}

impl Default for TokenResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// Interpret the first return word as a `bytes32` symbol: UTF-8 bytes padded
/// with trailing zeros.
fn parse_bytes32_symbol(data: &Bytes) -> Option<String> {
    if data.len() < 32 {
        return None;
    }
    let word = &data[..32];
    let end = word.iter().position(|b| *b == 0).unwrap_or(32);
    if end == 0 {
        return None;
    }
    let symbol = std::str::from_utf8(&word[..end]).ok()?;
    Some(symbol.to_string())
}

/// Interpret the first return word as a `uint256` decimal count. Values that
/// do not fit a `u8` are rejected.
fn parse_uint_decimals(data: &Bytes) -> Option<u8> {
    if data.len() < 32 {
        return None;
    }
    let value = U256::from_be_slice(&data[..32]);
    if value > U256::from(u8::MAX) {
        return None;
    }
    Some(value.to::<u64>() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::providers::ProviderBuilder;

    #[test]
    fn test_probe_selectors_are_the_erc20_ones() {
        assert_eq!(symbolCall::SELECTOR, [0x95, 0xd8, 0x9b, 0x41]);
        assert_eq!(decimalsCall::SELECTOR, [0x31, 0x3c, 0xe5, 0x67]);
    }

    #[test]
    fn test_parse_bytes32_symbol() {
        let mut word = [0u8; 32];
        word[..3].copy_from_slice(b"MKR");
        assert_eq!(
            parse_bytes32_symbol(&Bytes::from(word.to_vec())),
            Some("MKR".to_string())
        );

        assert_eq!(parse_bytes32_symbol(&Bytes::from(vec![0u8; 32])), None);
        assert_eq!(parse_bytes32_symbol(&Bytes::from(vec![0u8; 10])), None);

        let mut bad = [0u8; 32];
        bad[..2].copy_from_slice(&[0xff, 0xfe]);
        assert_eq!(parse_bytes32_symbol(&Bytes::from(bad.to_vec())), None);
    }

    #[test]
    fn test_parse_uint_decimals_range() {
        let word = U256::from(6u64).to_be_bytes::<32>();
        assert_eq!(parse_uint_decimals(&Bytes::from(word.to_vec())), Some(6));

        let too_big = U256::from(300u64).to_be_bytes::<32>();
        assert_eq!(parse_uint_decimals(&Bytes::from(too_big.to_vec())), None);
        assert_eq!(parse_uint_decimals(&Bytes::from(vec![0u8; 4])), None);
    }

    #[test]
    fn test_known_tokens_defaults() {
        let mainnet = KnownTokens::defaults_for(1);
        assert!(!mainnet.is_empty());
        let dai = address!("6b175474e89094c44da98b954eedeac495271d0f");
        assert!(mainnet.contains(dai));
        assert_eq!(mainnet.get(dai).unwrap().symbol, "DAI");

        assert!(KnownTokens::defaults_for(424242).is_empty());
    }

    #[test]
    fn test_known_tokens_from_iter() {
        let addr = Address::from_slice(&[0x42; 20]);
        let known = KnownTokens::from_iter([TokenInfo {
            address: addr,
            symbol: "TST".to_string(),
            decimals: 8,
        }]);
        assert_eq!(known.len(), 1);
        assert!(known.contains(addr));
        assert!(!known.contains(Address::ZERO));
    }

    #[tokio::test]
    async fn test_resolve_serves_cached_entries_without_probing() {
        let resolver = TokenResolver::new();
        // nothing listens here; a probe would fail instead of hitting the cache
        let provider = ProviderBuilder::new().on_http("http://127.0.0.1:1".parse().unwrap());
        let addr = Address::from_slice(&[0x42; 20]);

        resolver.cache.lock().unwrap().put(
            addr,
            Some(TokenInfo {
                address: addr,
                symbol: "TST".to_string(),
                decimals: 8,
            }),
        );
        let info = resolver.resolve(&provider, addr).await.unwrap();
        assert_eq!(info.symbol, "TST");
        assert_eq!(info.decimals, 8);

        resolver.cache.lock().unwrap().put(addr, None);
        let err = resolver.resolve(&provider, addr).await.unwrap_err();
        assert!(matches!(err, TokenResolutionError::CachedMiss(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_not_cached_as_miss() {
        let resolver = TokenResolver::new();
        // every request dies before reaching a node
        let provider = ProviderBuilder::new().on_http("http://127.0.0.1:1".parse().unwrap());
        let addr = Address::from_slice(&[0x42; 20]);

        let err = resolver.resolve(&provider, addr).await.unwrap_err();
        assert!(matches!(err, TokenResolutionError::Transport(_)));

        // no miss was recorded, and a retry still reports transport
        assert!(resolver.cache.lock().unwrap().get(&addr).is_none());
        let again = resolver.resolve(&provider, addr).await.unwrap_err();
        assert!(matches!(again, TokenResolutionError::Transport(_)));
    }
}
