pub mod batch;
pub mod cache;
pub mod chains;
pub mod classify;
pub mod export;
pub mod history;
pub mod normalize;
pub mod provider;
pub mod tokens;
pub mod types;

use std::sync::Arc;

use alloy::primitives::{Address, Bytes};
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::data::batch::batch_get_code;
use crate::data::cache::EtagCache;
use crate::data::normalize::{normalize_record, partition_by_cancellation, NormalizeContext};
use crate::data::provider::EthProvider;
use crate::data::tokens::{KnownTokens, TokenResolver};
use crate::data::types::{HistoryPage, OutgoingHistory, RawTransactionRecord, TokenInfo};
use crate::error::{BatchCallError, HistoryError, TokenResolutionError};

/// Remote transaction-history endpoint.
#[async_trait]
pub trait HistorySource: Send + Sync {
    /// Endpoint URL for one wallet; also its ETag cache key.
    fn history_url(&self, safe: Address) -> String;

    async fn fetch_history(
        &self,
        safe: Address,
        etag: Option<&str>,
    ) -> Result<HistoryPage, HistoryError>;
}

/// Deployed-bytecode lookup, batched per fetch cycle.
#[async_trait]
pub trait CodeSource: Send + Sync {
    /// One round trip for all targets. The outer error means the whole batch
    /// was lost; inner errors are per-item, in input order.
    async fn fetch_codes(
        &self,
        targets: Vec<Address>,
    ) -> Result<Vec<Result<Bytes, BatchCallError>>, BatchCallError>;
}

/// Token metadata resolution.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token_info(&self, address: Address) -> Result<TokenInfo, TokenResolutionError>;
}

/// Production code source: batched `eth_getCode` over the shared provider.
pub struct ChainCodeSource {
    provider: Arc<EthProvider>,
}

impl ChainCodeSource {
    pub fn new(provider: Arc<EthProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl CodeSource for ChainCodeSource {
    async fn fetch_codes(
        &self,
        targets: Vec<Address>,
    ) -> Result<Vec<Result<Bytes, BatchCallError>>, BatchCallError> {
        let targets = targets.into_iter().map(|t| (t, ())).collect();
        let outcomes = batch_get_code(self.provider.inner(), targets).await?;
        Ok(outcomes.into_iter().map(|o| o.result).collect())
    }
}

/// Production token source: the on-chain prober bound to the shared provider.
pub struct ChainTokenSource {
    provider: Arc<EthProvider>,
    resolver: TokenResolver,
}

impl ChainTokenSource {
    pub fn new(provider: Arc<EthProvider>) -> Self {
        Self {
            provider,
            resolver: TokenResolver::new(),
        }
    }
}

#[async_trait]
impl TokenSource for ChainTokenSource {
    async fn token_info(&self, address: Address) -> Result<TokenInfo, TokenResolutionError> {
        self.resolver.resolve(self.provider.inner(), address).await
    }
}

/// The reconciliation pipeline: conditional fetch, bytecode batch,
/// concurrent normalization, cancellation partition.
pub struct HistoryService<H, C, T> {
    history: H,
    code: C,
    tokens: T,
    native_symbol: String,
}

impl<H, C, T> HistoryService<H, C, T>
where
    H: HistorySource,
    C: CodeSource,
    T: TokenSource,
{
    pub fn new(history: H, code: C, tokens: T, native_symbol: impl Into<String>) -> Self {
        Self {
            history,
            code,
            tokens,
            native_symbol: native_symbol.into(),
        }
    }

    /// Run one fetch cycle for one wallet.
    ///
    /// `None` means the remote history is unchanged since the stored ETag and
    /// the caller should keep its previous result. Network failures never
    /// surface here: the cycle degrades to a history holding only the
    /// synthetic creation record.
    pub async fn load_outgoing(
        &self,
        safe: Address,
        etags: &mut EtagCache,
        known_tokens: &KnownTokens,
    ) -> Option<OutgoingHistory> {
        let url = self.history.history_url(safe);
        let previous = etags.get(&url).map(|etag| etag.to_string());

        // Every cycle starts from the wallet's deployment marker
        let mut results = vec![RawTransactionRecord::creation()];

        match self.history.fetch_history(safe, previous.as_deref()).await {
            Ok(HistoryPage::NotModified) => return None,
            Ok(HistoryPage::Page { etag, results: fetched }) => {
                // Some proxies answer 200 with an unchanged validator
                if let (Some(new), Some(old)) = (&etag, &previous) {
                    if new == old {
                        return None;
                    }
                }
                if let Some(etag) = etag {
                    etags.put(url.clone(), etag);
                }
                results.extend(fetched);
            }
            Err(err) => {
                warn!(%safe, %err, "history fetch failed, degrading to creation-only history");
                // a degraded cycle holds no validator; the next fetch is full
                etags.invalidate(&url);
            }
        }

        let targets: Vec<Address> = results.iter().map(|r| r.to).collect();
        let codes: Vec<Option<Bytes>> = match self.code.fetch_codes(targets).await {
            Ok(outcomes) => outcomes
                .into_iter()
                .map(|outcome| match outcome {
                    Ok(code) if !code.is_empty() => Some(code),
                    Ok(_) => None,
                    Err(err) => {
                        warn!(%safe, %err, "bytecode lookup failed for one destination");
                        None
                    }
                })
                .collect(),
            Err(err) => {
                warn!(%safe, %err, "bytecode batch failed, degrading to creation-only history");
                etags.invalidate(&url);
                results.truncate(1);
                vec![None]
            }
        };

        let ctx = NormalizeContext {
            safe,
            native_symbol: &self.native_symbol,
            known_tokens,
            tokens: &self.tokens,
        };
        let pending: Vec<_> = results
            .into_iter()
            .zip(codes)
            .map(|(record, code)| normalize_record(record, code, &ctx))
            .collect();

        let mut txs = Vec::with_capacity(pending.len());
        for (index, outcome) in join_all(pending).await.into_iter().enumerate() {
            match outcome {
                Ok(tx) => txs.push(tx),
                Err(err) => {
                    warn!(%safe, index, %err, "skipping record that failed to normalize");
                }
            }
        }

        let history = partition_by_cancellation(safe, txs);
        info!(
            %safe,
            outgoing = history.outgoing_for(safe).len(),
            cancel = history.cancel_for(safe).len(),
            "reconciled outgoing history"
        );
        Some(history)
    }
}
